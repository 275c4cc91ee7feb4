//! Failure taxonomy for the capture, detection and alerting path.
//!
//! Startup failures (`SourceUnavailable`, `SessionAuthFailure`) propagate and abort
//! the daemon. Everything else is absorbed where it happens and only logged.

#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// The capture device could not be opened.
    #[error("frame source {uri} unavailable: {reason}")]
    SourceUnavailable { uri: String, reason: String },

    /// No frame this tick; the controller skips to the next one.
    #[error("frame unavailable: {0}")]
    FrameUnavailable(String),

    /// The model (or the pre-filter feeding it) failed on one frame.
    #[error("classification failed: {0}")]
    ClassificationFailure(String),

    /// The outbound mail session could not be established or authenticated.
    #[error("mail session authentication failed: {0}")]
    SessionAuthFailure(String),

    /// One alert could not be delivered to one recipient.
    #[error("alert delivery to {recipient} failed: {reason}")]
    DispatchFailure { recipient: String, reason: String },

    /// The alert payload (image or message) could not be assembled.
    #[error("failed to build alert: {0}")]
    AlertBuild(String),
}

impl WatchError {
    pub(crate) fn source_unavailable(uri: &str, err: impl std::fmt::Display) -> Self {
        WatchError::SourceUnavailable {
            uri: uri.to_string(),
            reason: err.to_string(),
        }
    }
}
