//! Alert delivery.
//!
//! A `Notifier` turns one positive frame into messages for every subscriber.
//! Delivery is per recipient: a failure for one is logged and recorded in the
//! summary, the rest are still attempted.

use crate::error::WatchError;
use crate::frame::{Frame, GeoCoordinate};

mod email;
mod recipient;
pub mod template;
mod transport;

pub use email::{send_with_reconnect, EmailNotifier, DEFAULT_RECONNECT_ATTEMPTS};
pub use recipient::{validate_email, Recipient, RecipientSet};
pub use transport::{
    MailTransport, SmtpCredentials, SmtpSession, SmtpSettings, TransportError, DEFAULT_SMTP_HOST,
    DEFAULT_SMTP_PORT, SECRET_ENV, SENDER_ENV,
};

/// Result of one alert fan-out.
#[derive(Debug, Default)]
pub struct DispatchSummary {
    pub delivered: usize,
    /// One `DispatchFailure` per recipient that did not get the alert.
    pub failures: Vec<WatchError>,
}

impl DispatchSummary {
    pub fn attempted(&self) -> usize {
        self.delivered + self.failures.len()
    }
}

/// Something that can deliver a fire alert.
pub trait Notifier {
    /// Deliver `frame` and `coordinate` to every subscriber.
    ///
    /// Per-recipient failures never fail the call. `Err` means the alert itself
    /// could not be assembled and nobody was contacted.
    fn dispatch(
        &mut self,
        frame: &Frame,
        coordinate: GeoCoordinate,
    ) -> Result<DispatchSummary, WatchError>;
}

impl<N: Notifier + ?Sized> Notifier for Box<N> {
    fn dispatch(
        &mut self,
        frame: &Frame,
        coordinate: GeoCoordinate,
    ) -> Result<DispatchSummary, WatchError> {
        (**self).dispatch(frame, coordinate)
    }
}
