//! Frame sources.
//!
//! Exactly one source feeds a pipeline. Available backends:
//! - `stub://...`: synthetic scene generator (tests, demos)
//! - `replay://<dir>`: still images from a directory, in file-name order
//! - `/dev/videoN`: local V4L2 camera (feature: ingest-v4l2)
//!
//! A source is constructed closed. `open()` failing is a startup error; a failed
//! `read_frame()` only costs the caller one tick.

use anyhow::Result;

use crate::error::WatchError;
use crate::frame::Frame;

#[cfg(feature = "ingest-v4l2")]
mod normalize;
pub mod replay;
pub mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

pub use replay::ReplaySource;
pub use synthetic::SyntheticSource;
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::V4l2Source;

/// Capture settings shared by every backend.
#[derive(Clone, Debug, PartialEq)]
pub struct SourceConfig {
    /// Explicit source URI. When absent the device index selects `/dev/video<N>`.
    pub uri: Option<String>,
    pub device_index: u32,
    /// Requested frame width. Devices may negotiate something else.
    pub width: u32,
    pub height: u32,
    pub target_fps: u32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            uri: None,
            device_index: 0,
            width: 640,
            height: 480,
            target_fps: 10,
        }
    }
}

impl SourceConfig {
    pub fn resolved_uri(&self) -> String {
        match &self.uri {
            Some(uri) if !uri.trim().is_empty() => uri.trim().to_string(),
            _ => format!("/dev/video{}", self.device_index),
        }
    }
}

/// Counters reported by a source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub uri: String,
}

/// A single capture device.
pub trait FrameSource: Send {
    fn uri(&self) -> &str;

    /// Acquire the device. Failure here aborts startup.
    fn open(&mut self) -> Result<(), WatchError>;

    /// Next frame, or `FrameUnavailable` if none could be read this time.
    fn read_frame(&mut self) -> Result<Frame, WatchError>;

    /// True while the source is open and still able to produce frames.
    fn is_active(&self) -> bool;

    /// Release the device. Further reads fail until reopened.
    fn close(&mut self) {}

    fn stats(&self) -> SourceStats;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn uri(&self) -> &str {
        (**self).uri()
    }

    fn open(&mut self) -> Result<(), WatchError> {
        (**self).open()
    }

    fn read_frame(&mut self) -> Result<Frame, WatchError> {
        (**self).read_frame()
    }

    fn is_active(&self) -> bool {
        (**self).is_active()
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn stats(&self) -> SourceStats {
        (**self).stats()
    }
}

/// Build the backend named by the configured URI. The returned source is not open yet.
pub fn open_source(config: &SourceConfig) -> Result<Box<dyn FrameSource>> {
    let uri = config.resolved_uri();
    if uri.starts_with("stub://") {
        return Ok(Box::new(SyntheticSource::new(
            uri,
            config.width,
            config.height,
        )));
    }
    if let Some(dir) = uri.strip_prefix("replay://") {
        return Ok(Box::new(ReplaySource::new(dir)));
    }

    #[cfg(feature = "ingest-v4l2")]
    {
        Ok(Box::new(V4l2Source::new(v4l2::V4l2Config {
            device: uri,
            target_fps: config.target_fps,
            width: config.width,
            height: config.height,
        })))
    }
    #[cfg(not(feature = "ingest-v4l2"))]
    {
        anyhow::bail!(
            "source {} needs the ingest-v4l2 feature (or use stub:// / replay://)",
            uri
        )
    }
}
