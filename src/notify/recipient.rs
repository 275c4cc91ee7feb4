//! Alert recipients.

use anyhow::{anyhow, Result};
use lettre::message::Mailbox;
use lettre::Address;
use std::sync::OnceLock;

// -------------------- Address Discipline --------------------

/// Accepts `local@domain.tld` with a 2-7 letter TLD, matched over the whole
/// (trimmed) string, and only if the mail stack can also route to it.
///
/// Allowed: "user@example.com", " first.last+fire@sub.example.org "
/// Disallowed: "not-an-email", "user@localhost", "a b@example.com"
pub fn validate_email(address: &str) -> Result<Address> {
    let address = address.trim();
    // Compile once for hot paths.
    static EMAIL_RE: OnceLock<regex::Regex> = OnceLock::new();
    let re = EMAIL_RE.get_or_init(|| {
        regex::Regex::new(r"^\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,7}\b$").unwrap()
    });

    if !re.is_match(address) {
        return Err(anyhow!("{:?} is not a valid e-mail address", address));
    }
    address
        .parse::<Address>()
        .map_err(|err| anyhow!("{:?} is not a deliverable address: {}", address, err))
}

/// One validated alert subscriber.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Recipient {
    address: Address,
}

impl Recipient {
    pub fn parse(address: &str) -> Result<Self> {
        Ok(Self {
            address: validate_email(address)?,
        })
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn mailbox(&self) -> Mailbox {
        Mailbox::new(None, self.address.clone())
    }
}

impl std::fmt::Display for Recipient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.address)
    }
}

/// Ordered, append-only recipient list. Duplicates are kept.
#[derive(Clone, Debug, Default)]
pub struct RecipientSet {
    recipients: Vec<Recipient>,
}

impl RecipientSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `address` if it validates. Invalid addresses are dropped with a
    /// warning and `false` is returned.
    pub fn add(&mut self, address: &str) -> bool {
        match Recipient::parse(address) {
            Ok(recipient) => {
                self.recipients.push(recipient);
                true
            }
            Err(err) => {
                log::warn!("recipient rejected: {}", err);
                false
            }
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Recipient> {
        self.recipients.iter()
    }

    pub fn len(&self) -> usize {
        self.recipients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipients.is_empty()
    }
}

impl<'a> IntoIterator for &'a RecipientSet {
    type Item = &'a Recipient;
    type IntoIter = std::slice::Iter<'a, Recipient>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
