use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart};
use lettre::Message;

use super::recipient::{Recipient, RecipientSet};
use super::template::{render_html, render_plain, ALERT_SUBJECT, ATTACHMENT_NAME};
use super::transport::{MailTransport, SmtpCredentials, SmtpSession, SmtpSettings, TransportError};
use super::{DispatchSummary, Notifier};
use crate::error::WatchError;
use crate::frame::{Frame, GeoCoordinate};

/// Reconnects attempted per recipient after a dropped session.
pub const DEFAULT_RECONNECT_ATTEMPTS: u32 = 2;

/// E-mail alerts over one long-lived session.
pub struct EmailNotifier<T: MailTransport = SmtpSession> {
    sender: Mailbox,
    recipients: RecipientSet,
    transport: T,
    reconnect_attempts: u32,
}

impl EmailNotifier<SmtpSession> {
    /// Open and authenticate the SMTP session. Fails if the login is refused.
    pub fn connect(settings: SmtpSettings, credentials: SmtpCredentials) -> Result<Self, WatchError> {
        let sender = Recipient::parse(&credentials.address)
            .map_err(|err| WatchError::SessionAuthFailure(format!("sender address: {}", err)))?
            .mailbox();
        let session = SmtpSession::connect(settings, credentials)?;
        Ok(Self::new(sender, session))
    }
}

impl<T: MailTransport> EmailNotifier<T> {
    pub fn new(sender: Mailbox, transport: T) -> Self {
        Self {
            sender,
            recipients: RecipientSet::new(),
            transport,
            reconnect_attempts: DEFAULT_RECONNECT_ATTEMPTS,
        }
    }

    pub fn with_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.reconnect_attempts = attempts;
        self
    }

    /// Subscribe `address`. Invalid addresses are dropped and `false` returned.
    pub fn add_recipient(&mut self, address: &str) -> bool {
        self.recipients.add(address)
    }

    pub fn recipients(&self) -> &RecipientSet {
        &self.recipients
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Assemble the alert for one recipient: HTML/plain alternatives plus the PNG.
    pub fn build_message(
        &self,
        recipient: &Recipient,
        png: &[u8],
        coordinate: &GeoCoordinate,
    ) -> Result<Message, WatchError> {
        let png_type = ContentType::parse("image/png")
            .map_err(|err| WatchError::AlertBuild(format!("content type: {}", err)))?;
        let body = MultiPart::mixed()
            .multipart(MultiPart::alternative_plain_html(
                render_plain(coordinate),
                render_html(coordinate),
            ))
            .singlepart(Attachment::new(ATTACHMENT_NAME.to_string()).body(png.to_vec(), png_type));

        Message::builder()
            .from(self.sender.clone())
            .to(recipient.mailbox())
            .subject(ALERT_SUBJECT)
            .multipart(body)
            .map_err(|err| WatchError::AlertBuild(format!("message for {}: {}", recipient, err)))
    }
}

impl<T: MailTransport> Notifier for EmailNotifier<T> {
    fn dispatch(
        &mut self,
        frame: &Frame,
        coordinate: GeoCoordinate,
    ) -> Result<DispatchSummary, WatchError> {
        let png = frame
            .encode_png()
            .map_err(|err| WatchError::AlertBuild(format!("{:#}", err)))?;

        let mut summary = DispatchSummary::default();
        if self.recipients.is_empty() {
            log::warn!("fire alert at {} has no recipients", coordinate);
            return Ok(summary);
        }

        for recipient in self.recipients.iter() {
            let outcome = self
                .build_message(recipient, &png, &coordinate)
                .and_then(|message| {
                    send_with_reconnect(&mut self.transport, &message, self.reconnect_attempts)
                        .map_err(|err| WatchError::DispatchFailure {
                            recipient: recipient.to_string(),
                            reason: err.to_string(),
                        })
                });
            match outcome {
                Ok(()) => {
                    log::info!("fire alert sent to {}", recipient);
                    summary.delivered += 1;
                }
                Err(err) => {
                    log::error!("{}", err);
                    summary.failures.push(err);
                }
            }
        }
        Ok(summary)
    }
}

/// Send once, reconnecting and retrying on connection errors up to `attempts` times.
/// Rejections are returned immediately.
pub fn send_with_reconnect<T: MailTransport + ?Sized>(
    transport: &mut T,
    message: &Message,
    attempts: u32,
) -> Result<(), TransportError> {
    let mut reconnects = 0;
    loop {
        match transport.send(message) {
            Ok(()) => return Ok(()),
            Err(err) if err.is_retryable() && reconnects < attempts => {
                reconnects += 1;
                log::warn!(
                    "mail send failed ({}); reconnect {}/{}",
                    err,
                    reconnects,
                    attempts
                );
                if let Err(err) = transport.reconnect() {
                    log::warn!("mail reconnect failed: {}", err);
                }
            }
            Err(err) => return Err(err),
        }
    }
}
