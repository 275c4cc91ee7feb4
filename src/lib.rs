//! Wildfire watch
//!
//! Watches one camera for fire and smoke and e-mails an alert, with the frame
//! and the camera's location, when it sees some.
//!
//! # Pipeline
//!
//! ```text
//! FrameSource -> ChangeGate -> DetectionEngine -> Notifier
//! ```
//!
//! 1. **Capture**: one frame per tick from the configured source.
//! 2. **Change gate**: frames that barely differ from the last admitted frame
//!    (MSE below 1200) are dropped before any detection work.
//! 3. **Detection**: a color/contour pre-filter, then a model score. Both must
//!    agree before a frame counts as fire.
//! 4. **Alert**: every subscriber gets the frame as PNG plus a map link. One
//!    recipient failing does not hold up the others.
//!
//! # Module Structure
//!
//! - `frame`: `Frame`, `GeoCoordinate`, image encoding
//! - `ingest`: frame sources (synthetic, replay, V4L2)
//! - `gate`: change detection between consecutive frames
//! - `detect`: pre-filter, letterboxing, model backends, `DetectionEngine`
//! - `notify`: recipients, SMTP session, `EmailNotifier`
//! - `pipeline`: the controller that ties it together
//! - `preview`: optional live preview
//! - `config`: daemon configuration

pub mod config;
pub mod detect;
pub mod error;
pub mod frame;
pub mod gate;
pub mod ingest;
pub mod notify;
pub mod pipeline;
pub mod preview;

pub use config::WatchConfig;
pub use detect::{DetectionEngine, DetectionReport, ModelBackend, StubBackend};
pub use error::WatchError;
pub use frame::{Frame, GeoCoordinate};
pub use gate::{ChangeGate, CHANGE_THRESHOLD};
pub use ingest::{open_source, FrameSource, SourceConfig};
pub use notify::{DispatchSummary, EmailNotifier, MailTransport, Notifier, TransportError};
pub use pipeline::{Pipeline, PipelineStats, SessionState, StopHandle, TickOutcome};
pub use preview::{JpegFileSink, PreviewHandle, PreviewRenderer, PreviewSink};
