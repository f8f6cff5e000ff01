//! Messaging collaborator used by the report stage.

use tracing::info;

use crate::fleet::BoxFuture;

/// Delivers a report to a set of recipients.
pub trait Notifier: Send + Sync {
    /// Send `subject`/`body` to every recipient.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Notify` if the message cannot be handed off.
    fn send<'a>(
        &'a self,
        recipients: &'a [String],
        subject: &'a str,
        body: &'a str,
    ) -> BoxFuture<'a, ()>;
}

/// [`Notifier`] that only writes the report to the log.
///
/// Used when Slack delivery is not configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send<'a>(
        &'a self,
        recipients: &'a [String],
        subject: &'a str,
        body: &'a str,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            info!(recipients = recipients.len(), subject, body, "remediation report");
            Ok(())
        })
    }
}
