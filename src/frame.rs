//! Captured frames.
//!
//! - `Frame`: immutable RGB pixel grid plus capture time. Cloning shares the buffer.
//! - Encoders for the alert attachment (PNG) and for snapshots/preview (JPEG).
//! - `GeoCoordinate`: fixed camera location rendered into alerts.
//!
//! Frames are produced by a `FrameSource`, read by the change gate and the detection
//! engine, and never persisted except through `save_snapshot`.

use anyhow::{anyhow, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{ImageFormat, Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Color channels per pixel.
pub const CHANNELS: usize = 3;

/// JPEG quality used for snapshots and preview output.
pub const SNAPSHOT_JPEG_QUALITY: u8 = 90;

// ----------------------------------------------------------------------------
// Frame
// ----------------------------------------------------------------------------

/// One captured image: `height x width x 3` channels, 8 bits per channel.
///
/// There is no mutable access to the pixels. The gate keeps a clone of the last
/// admitted frame and the preview renderer may hold another; both share the same
/// allocation.
#[derive(Clone, Debug)]
pub struct Frame {
    pixels: Arc<RgbImage>,
    captured_at: SystemTime,
}

impl Frame {
    /// Wrap an RGB image captured now.
    pub fn new(image: RgbImage) -> Self {
        Self::with_capture_time(image, SystemTime::now())
    }

    pub fn with_capture_time(image: RgbImage, captured_at: SystemTime) -> Self {
        Self {
            pixels: Arc::new(image),
            captured_at,
        }
    }

    /// Build a frame from packed RGB24 bytes.
    pub fn from_rgb(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(CHANNELS))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if data.len() != expected {
            return Err(anyhow!(
                "expected {} RGB bytes for {}x{}, received {}",
                expected,
                width,
                height,
                data.len()
            ));
        }
        let image = RgbImage::from_raw(width, height, data)
            .ok_or_else(|| anyhow!("RGB buffer does not fit {}x{}", width, height))?;
        Ok(Self::new(image))
    }

    /// Uniform frame of a single color.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        Self::new(RgbImage::from_pixel(width, height, Rgb(rgb)))
    }

    /// All-zero frame.
    pub fn black(width: u32, height: u32) -> Self {
        Self::filled(width, height, [0, 0, 0])
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    pub fn image(&self) -> &RgbImage {
        &self.pixels
    }

    /// Packed RGB24 bytes, row-major.
    pub fn as_raw(&self) -> &[u8] {
        self.pixels.as_raw()
    }

    /// Number of channel samples (`width * height * 3`).
    pub fn element_count(&self) -> usize {
        self.pixels.as_raw().len()
    }

    /// True when both frames point at the same pixel allocation.
    pub fn shares_pixels_with(&self, other: &Frame) -> bool {
        Arc::ptr_eq(&self.pixels, &other.pixels)
    }

    // ------------------------------------------------------------------------
    // Encoding
    // ------------------------------------------------------------------------

    /// Lossless PNG encoding, used as the alert attachment.
    pub fn encode_png(&self) -> Result<Vec<u8>> {
        let mut buf = Cursor::new(Vec::new());
        self.pixels
            .write_to(&mut buf, ImageFormat::Png)
            .context("encode frame as PNG")?;
        Ok(buf.into_inner())
    }

    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        JpegEncoder::new_with_quality(&mut buf, quality)
            .encode_image(&*self.pixels)
            .context("encode frame as JPEG")?;
        Ok(buf)
    }

    /// `frame_<unix_timestamp>.jpg`, keyed on capture time.
    pub fn snapshot_name(&self) -> String {
        let secs = self
            .captured_at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        format!("frame_{}.jpg", secs)
    }

    /// Write the frame as a JPEG into `dir` and return the file path.
    pub fn save_snapshot(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("create snapshot directory {}", dir.display()))?;
        let path = dir.join(self.snapshot_name());
        let bytes = self.encode_jpeg(SNAPSHOT_JPEG_QUALITY)?;
        std::fs::write(&path, bytes)
            .with_context(|| format!("write snapshot {}", path.display()))?;
        Ok(path)
    }
}

// ----------------------------------------------------------------------------
// GeoCoordinate
// ----------------------------------------------------------------------------

/// Camera location in decimal degrees. Constant for the lifetime of a process.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoCoordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoCoordinate {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        let coordinate = Self {
            latitude,
            longitude,
        };
        coordinate.validate()?;
        Ok(coordinate)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(anyhow!("latitude {} out of range [-90, 90]", self.latitude));
        }
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(anyhow!(
                "longitude {} out of range [-180, 180]",
                self.longitude
            ));
        }
        Ok(())
    }

    /// Map search link with the coordinate as query string.
    pub fn map_link(&self) -> String {
        format!(
            "https://www.google.com/maps/search/?api=1&query={},{}",
            self.latitude, self.longitude
        )
    }
}

impl fmt::Display for GeoCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}", self.latitude, self.longitude)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
