//! Alert fan-out.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{NotificationApi, NotifyError, Recipient, RecipientSet};

/// Per-recipient outcome of one fan-out.
#[derive(Debug, Default)]
pub struct DeliveryReport {
    /// Recipients the service accepted the message for.
    pub delivered: Vec<Recipient>,
    /// Recipients that failed, with the reason.
    pub failed: Vec<(Recipient, NotifyError)>,
}

impl DeliveryReport {
    /// Total recipients attempted.
    pub fn attempted(&self) -> usize {
        self.delivered.len().saturating_add(self.failed.len())
    }

    /// Whether every attempt succeeded.
    pub fn all_delivered(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Sends alert text to every registered recipient.
pub struct Notifier {
    api: Arc<dyn NotificationApi>,
    recipients: RecipientSet,
}

impl Notifier {
    /// Create a notifier over a fixed recipient set.
    pub fn new(api: Arc<dyn NotificationApi>, recipients: RecipientSet) -> Self {
        Self { api, recipients }
    }

    /// The recipients this notifier fans out to.
    pub fn recipients(&self) -> &RecipientSet {
        &self.recipients
    }

    /// Attempt delivery to each recipient independently.
    ///
    /// A failure for one recipient is logged and recorded; the remaining
    /// recipients are still attempted. Nothing is retried.
    pub async fn notify(&self, message: &str) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        if self.recipients.is_empty() {
            debug!("no recipients registered, alert not sent");
            return report;
        }

        for recipient in &self.recipients {
            match self.api.send_message(recipient, message).await {
                Ok(()) => report.delivered.push(recipient.clone()),
                Err(e) => {
                    warn!(recipient = %recipient, error = %e, "failed to send alert");
                    report.failed.push((recipient.clone(), e));
                }
            }
        }

        info!(
            delivered = report.delivered.len(),
            failed = report.failed.len(),
            "alert dispatched"
        );
        report
    }
}
