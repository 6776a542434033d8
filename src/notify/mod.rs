//! Operator notifications.
//!
//! [`NotificationApi`] is the seam to the push service. [`telegram`] talks to
//! the Bot API, [`registry`] works out who to notify at startup, and
//! [`notifier`] fans each alert out to that set.

use std::fmt;

use async_trait::async_trait;

pub mod notifier;
pub mod registry;
pub mod telegram;

pub use notifier::{DeliveryReport, Notifier};
pub use registry::{resolve_recipients, RecipientSet, Resolution};
pub use telegram::TelegramApi;

/// Opaque address of a notification target (a Telegram chat id).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Recipient(String);

impl Recipient {
    /// Wrap an identifier. Surrounding whitespace is trimmed.
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(id.as_ref().trim().to_owned())
    }

    /// The raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Recipient {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Errors from the notification service.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// Transport failure (connect, timeout, TLS).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("notification service returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, truncated.
        body: String,
    },

    /// The response could not be understood.
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Push notification service.
#[async_trait]
pub trait NotificationApi: Send + Sync {
    /// Deliver `text` to one recipient. One attempt, no retry.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError`] on transport failure or a non-success status.
    async fn send_message(&self, recipient: &Recipient, text: &str) -> Result<(), NotifyError>;

    /// List the distinct senders visible in the service's inbound history.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError`] on transport failure or a malformed response.
    async fn discover_recipients(&self) -> Result<Vec<Recipient>, NotifyError>;
}
