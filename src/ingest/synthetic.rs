//! Synthetic frame source (`stub://`).
//!
//! Produces a static forest-colored scene that changes every `SCENE_PERIOD`
//! frames. Odd scene states paint a flame-colored patch in the middle of the
//! frame, so a running pipeline sees alternating suppressed, negative and
//! positive frames without a camera.

use image::{Rgb, RgbImage};

use super::{FrameSource, SourceStats};
use crate::error::WatchError;
use crate::frame::Frame;

/// Frames between scene changes.
pub const SCENE_PERIOD: u64 = 50;

const BACKGROUND: [u8; 3] = [60, 90, 50];
const FLAME: [u8; 3] = [220, 151, 117];

pub struct SyntheticSource {
    uri: String,
    width: u32,
    height: u32,
    open: bool,
    frame_count: u64,
    /// Simulated scene state; odd states contain a flame patch.
    scene_state: u8,
}

impl SyntheticSource {
    pub fn new(uri: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            uri: uri.into(),
            width,
            height,
            open: false,
            frame_count: 0,
            scene_state: 0,
        }
    }

    fn generate(&mut self) -> RgbImage {
        if self.frame_count > 1 && (self.frame_count - 1).is_multiple_of(SCENE_PERIOD) {
            self.scene_state = self.scene_state.wrapping_add(1);
        }

        let mut image = RgbImage::from_pixel(self.width, self.height, Rgb(BACKGROUND));
        if self.scene_state % 2 == 1 {
            // Quarter of the frame, centered.
            let (pw, ph) = (self.width / 2, self.height / 2);
            let (x0, y0) = ((self.width - pw) / 2, (self.height - ph) / 2);
            for y in y0..y0 + ph {
                for x in x0..x0 + pw {
                    image.put_pixel(x, y, Rgb(FLAME));
                }
            }
        }
        image
    }
}

impl FrameSource for SyntheticSource {
    fn uri(&self) -> &str {
        &self.uri
    }

    /// Synthetic sources are always available.
    fn open(&mut self) -> Result<(), WatchError> {
        if self.width == 0 || self.height == 0 {
            return Err(WatchError::source_unavailable(
                &self.uri,
                "frame dimensions must be non-zero",
            ));
        }
        self.open = true;
        log::info!(
            "SyntheticSource: connected to {} ({}x{})",
            self.uri,
            self.width,
            self.height
        );
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Frame, WatchError> {
        if !self.open {
            return Err(WatchError::FrameUnavailable(format!(
                "{} is not open",
                self.uri
            )));
        }
        self.frame_count += 1;
        Ok(Frame::new(self.generate()))
    }

    fn is_active(&self) -> bool {
        self.open
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            uri: self.uri.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::ChangeGate;

    #[test]
    fn reads_fail_until_opened() -> anyhow::Result<()> {
        let mut source = SyntheticSource::new("stub://test", 32, 24);
        assert!(matches!(
            source.read_frame(),
            Err(WatchError::FrameUnavailable(_))
        ));
        source.open()?;
        let frame = source.read_frame()?;
        assert_eq!(frame.dimensions(), (32, 24));
        assert_eq!(source.stats().frames_captured, 1);
        Ok(())
    }

    #[test]
    fn zero_sized_source_fails_to_open() {
        let mut source = SyntheticSource::new("stub://empty", 0, 24);
        let err = source.open().unwrap_err();
        assert!(matches!(err, WatchError::SourceUnavailable { .. }));
    }

    #[test]
    fn scene_changes_once_per_period() -> anyhow::Result<()> {
        let mut source = SyntheticSource::new("stub://test", 32, 24);
        source.open()?;
        let mut gate = ChangeGate::new();

        let mut admitted = 0;
        for _ in 0..(SCENE_PERIOD * 2) {
            if gate.admit(&source.read_frame()?) {
                admitted += 1;
            }
        }
        // Opening scene plus the flame patch appearing.
        assert_eq!(admitted, 2);
        Ok(())
    }

    #[test]
    fn close_deactivates() -> anyhow::Result<()> {
        let mut source = SyntheticSource::new("stub://test", 8, 8);
        source.open()?;
        assert!(source.is_active());
        source.close();
        assert!(!source.is_active());
        assert!(source.read_frame().is_err());
        Ok(())
    }
}
