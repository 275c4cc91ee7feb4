//! Outbound mail session.
//!
//! `MailTransport` is the seam between alert assembly and the wire. The only
//! production implementation is `SmtpSession` (STARTTLS relay with login);
//! tests substitute recording fakes.

use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use std::fmt;

use crate::error::WatchError;

pub const DEFAULT_SMTP_HOST: &str = "smtp.gmail.com";
pub const DEFAULT_SMTP_PORT: u16 = 587;

pub const SENDER_ENV: &str = "SYSTEM_EMAIL";
pub const SECRET_ENV: &str = "SYSTEM_EMAIL_PASSWORD";

/// Why one send did not go through.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The session dropped or the server could not be reached. Worth a reconnect.
    #[error("connection error: {0}")]
    Connection(String),
    /// The server refused this message. Retrying will not help.
    #[error("rejected: {0}")]
    Rejected(String),
}

impl TransportError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransportError::Connection(_))
    }
}

impl From<lettre::transport::smtp::Error> for TransportError {
    fn from(err: lettre::transport::smtp::Error) -> Self {
        if err.is_permanent() {
            TransportError::Rejected(err.to_string())
        } else {
            TransportError::Connection(err.to_string())
        }
    }
}

/// An authenticated, reusable outbound session. Not shared across threads.
pub trait MailTransport: Send {
    fn send(&mut self, message: &Message) -> Result<(), TransportError>;

    /// Re-establish the session after a `Connection` error.
    fn reconnect(&mut self) -> Result<(), TransportError>;
}

/// Sender identity and secret for the mail session.
#[derive(Clone, PartialEq, Eq)]
pub struct SmtpCredentials {
    pub address: String,
    pub secret: String,
}

impl SmtpCredentials {
    pub fn new(address: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            secret: secret.into(),
        }
    }

    /// Read `SYSTEM_EMAIL` / `SYSTEM_EMAIL_PASSWORD`.
    pub fn from_env() -> Result<Self, WatchError> {
        let address = read_env(SENDER_ENV)?;
        let secret = read_env(SECRET_ENV)?;
        Ok(Self { address, secret })
    }
}

fn read_env(key: &str) -> Result<String, WatchError> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(WatchError::SessionAuthFailure(format!("{} is not set", key))),
    }
}

// Never print the secret.
impl fmt::Debug for SmtpCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpCredentials")
            .field("address", &self.address)
            .field("secret", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
}

impl Default for SmtpSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_SMTP_HOST.to_string(),
            port: DEFAULT_SMTP_PORT,
        }
    }
}

/// STARTTLS SMTP session authenticated once at construction.
pub struct SmtpSession {
    settings: SmtpSettings,
    credentials: SmtpCredentials,
    transport: SmtpTransport,
}

impl SmtpSession {
    /// Build the relay and verify the login. Any failure is fatal to the caller.
    pub fn connect(
        settings: SmtpSettings,
        credentials: SmtpCredentials,
    ) -> Result<Self, WatchError> {
        let transport = build_transport(&settings, &credentials)?;
        log::info!(
            "SmtpSession: authenticated as {} via {}:{}",
            credentials.address,
            settings.host,
            settings.port
        );
        Ok(Self {
            settings,
            credentials,
            transport,
        })
    }
}

fn build_transport(
    settings: &SmtpSettings,
    credentials: &SmtpCredentials,
) -> Result<SmtpTransport, WatchError> {
    let transport = SmtpTransport::starttls_relay(&settings.host)
        .map_err(|err| {
            WatchError::SessionAuthFailure(format!("relay {}: {}", settings.host, err))
        })?
        .port(settings.port)
        .credentials(Credentials::new(
            credentials.address.clone(),
            credentials.secret.clone(),
        ))
        .build();

    match transport.test_connection() {
        Ok(true) => Ok(transport),
        Ok(false) => Err(WatchError::SessionAuthFailure(format!(
            "{}:{} did not accept the session",
            settings.host, settings.port
        ))),
        Err(err) => Err(WatchError::SessionAuthFailure(format!(
            "{}:{}: {}",
            settings.host, settings.port, err
        ))),
    }
}

impl MailTransport for SmtpSession {
    fn send(&mut self, message: &Message) -> Result<(), TransportError> {
        self.transport.send(message)?;
        Ok(())
    }

    fn reconnect(&mut self) -> Result<(), TransportError> {
        log::warn!(
            "SmtpSession: reconnecting to {}:{}",
            self.settings.host,
            self.settings.port
        );
        self.transport = build_transport(&self.settings, &self.credentials)
            .map_err(|err| TransportError::Connection(err.to_string()))?;
        Ok(())
    }
}
