//! V4L2 frame source.
//!
//! Captures frames from a local device node (e.g. `/dev/video0`) through
//! memory-mapped buffers. RGB24 is requested; YUYV and MJPEG fallbacks are
//! converted in-process.

use anyhow::{anyhow, Context, Result};
use ouroboros::self_referencing;
use std::time::Instant;

use super::normalize::{normalize_to_rgb, PixelFormat};
use super::{FrameSource, SourceStats};
use crate::error::WatchError;
use crate::frame::Frame;

/// Camera node and the capture mode to request from it.
#[derive(Clone, Debug)]
pub struct V4l2Config {
    /// Video node, `/dev/videoN`.
    pub device: String,
    pub target_fps: u32,
    /// Requested width; the driver may pick another.
    pub width: u32,
    /// Requested height.
    pub height: u32,
}

impl Default for V4l2Config {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_string(),
            target_fps: 10,
            width: 640,
            height: 480,
        }
    }
}

pub struct V4l2Source {
    config: V4l2Config,
    state: Option<DeviceState>,
    format: PixelFormat,
    frame_count: u64,
    last_frame_at: Option<Instant>,
    last_error: Option<String>,
    active_width: u32,
    active_height: u32,
}

#[self_referencing]
struct DeviceState {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

impl V4l2Source {
    pub fn new(config: V4l2Config) -> Self {
        Self {
            active_width: config.width,
            active_height: config.height,
            config,
            state: None,
            format: PixelFormat::Rgb24,
            frame_count: 0,
            last_frame_at: None,
            last_error: None,
        }
    }

    fn connect(&mut self) -> Result<()> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let mut device = v4l::Device::with_path(&self.config.device)
            .with_context(|| format!("open v4l2 device {}", self.config.device))?;
        let mut format = device.format().context("read v4l2 format")?;
        format.width = self.config.width;
        format.height = self.config.height;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!(
                    "camera {}: RGB3 not accepted ({}), using the current format",
                    self.config.device,
                    err
                );
                device
                    .format()
                    .context("read v4l2 format after set failure")?
            }
        };
        let pixel_format = PixelFormat::from_fourcc(&format.fourcc.repr).ok_or_else(|| {
            anyhow!(
                "device {} negotiated unsupported pixel format {}",
                self.config.device,
                format.fourcc
            )
        })?;

        if self.config.target_fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(self.config.target_fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!(
                    "camera {}: frame rate not applied: {}",
                    self.config.device,
                    err
                );
            }
        }

        self.active_width = format.width;
        self.active_height = format.height;
        self.format = pixel_format;
        self.last_error = None;

        let state = DeviceStateBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()?;
        self.state = Some(state);

        log::info!(
            "V4l2Source: connected to {} ({}x{}, {:?})",
            self.config.device,
            self.active_width,
            self.active_height,
            self.format
        );
        Ok(())
    }

    fn capture(&mut self) -> Result<Frame> {
        use v4l::io::traits::CaptureStream;

        let state = self.state.as_mut().context("v4l2 device not connected")?;
        let (width, height, format) = (self.active_width, self.active_height, self.format);
        let rgb = state.with_mut(|fields| -> Result<Vec<u8>> {
            let (buf, _meta) = fields.stream.next().context("capture v4l2 frame")?;
            normalize_to_rgb(buf, width, height, format)
        })?;
        Frame::from_rgb(width, height, rgb)
    }

    /// Open, with a frame delivered within the last few frame periods.
    pub fn is_healthy(&self) -> bool {
        if self.state.is_none() || self.last_error.is_some() {
            return false;
        }
        let grace_ms = if self.config.target_fps == 0 {
            2_000
        } else {
            (1000 / self.config.target_fps).saturating_mul(6).max(2_000)
        };
        self.last_frame_at
            .map(|at| at.elapsed().as_millis() <= grace_ms as u128)
            .unwrap_or(true)
    }
}

impl FrameSource for V4l2Source {
    fn uri(&self) -> &str {
        &self.config.device
    }

    fn open(&mut self) -> Result<(), WatchError> {
        self.connect().map_err(|err| {
            self.last_error = Some(err.to_string());
            WatchError::source_unavailable(&self.config.device, format!("{:#}", err))
        })
    }

    fn read_frame(&mut self) -> Result<Frame, WatchError> {
        match self.capture() {
            Ok(frame) => {
                self.frame_count += 1;
                self.last_frame_at = Some(Instant::now());
                self.last_error = None;
                Ok(frame)
            }
            Err(err) => {
                // Log on the transition only; repeated failures are counted by the caller.
                if self.last_error.is_none() {
                    log::warn!("V4l2Source: {} capture failing: {:#}", self.config.device, err);
                }
                self.last_error = Some(err.to_string());
                Err(WatchError::FrameUnavailable(format!("{:#}", err)))
            }
        }
    }

    /// A device stays active until closed; capture errors are per-read.
    fn is_active(&self) -> bool {
        self.state.is_some()
    }

    fn close(&mut self) {
        if self.state.take().is_some() {
            log::info!("V4l2Source: released {}", self.config.device);
        }
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            uri: self.config.device.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_device_is_unavailable() {
        let mut source = V4l2Source::new(V4l2Config {
            device: "/dev/video-does-not-exist".to_string(),
            ..V4l2Config::default()
        });
        let err = source.open().unwrap_err();
        assert!(matches!(err, WatchError::SourceUnavailable { .. }));
        assert!(!source.is_active());
        assert!(!source.is_healthy());
    }

    #[test]
    fn reads_before_open_are_unavailable() {
        let mut source = V4l2Source::new(V4l2Config::default());
        assert!(matches!(
            source.read_frame(),
            Err(WatchError::FrameUnavailable(_))
        ));
    }
}
