//! Final per-record report and its delivery.

use std::fmt::Write as _;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::NotificationConfig;
use crate::models::record::{DiagnosticRecord, RecordOutcome};
use crate::notify::Notifier;

/// A record flattened into labelled text fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemediationReport {
    /// One-line summary used as the message subject.
    pub subject: String,
    /// Ordered `(label, value)` pairs.
    pub fields: Vec<(String, String)>,
    /// Outcome the subject was derived from.
    pub outcome: RecordOutcome,
}

impl RemediationReport {
    /// Flatten `record`, joining multi-valued fields with `delimiter`.
    #[must_use]
    pub fn from_record(record: &DiagnosticRecord, delimiter: &str) -> Self {
        let outcome = record.outcome();
        let host = record.host_name().unwrap_or("unknown host");
        let subject = format!(
            "[vdi-remedy] {host} session {}: {}",
            record.session_id(),
            outcome.label()
        );

        let actions = record
            .action_log()
            .iter()
            .map(|action| action.as_str())
            .collect::<Vec<_>>()
            .join(delimiter);
        let machine = record.machine();

        let fields = vec![
            ("Record".to_owned(), record.id().to_owned()),
            ("Admin address".to_owned(), record.admin_address().to_owned()),
            ("Session".to_owned(), record.session_id().to_owned()),
            ("Host".to_owned(), host.to_owned()),
            (
                "Machine".to_owned(),
                machine.map_or_else(String::new, |m| m.machine_id.clone()),
            ),
            (
                "Desktop group".to_owned(),
                machine.map_or_else(String::new, |m| m.desktop_group.clone()),
            ),
            (
                "Last connection failure".to_owned(),
                machine.map_or_else(String::new, |m| m.last_connection_failure.clone()),
            ),
            ("Session state".to_owned(), format!("{:?}", record.session_state())),
            ("Looks hung".to_owned(), record.looks_hung().to_string()),
            (
                "Debugging complete".to_owned(),
                record.debugging_complete().to_string(),
            ),
            ("Restart issued".to_owned(), record.restart_issued().to_string()),
            ("Job state".to_owned(), format!("{:?}", record.job().state)),
            ("Job output received".to_owned(), record.job().received.to_string()),
            ("Actions".to_owned(), actions),
            ("Action result".to_owned(), record.action_result().join(delimiter)),
            ("Debug info".to_owned(), record.debug_info().join(delimiter)),
        ];

        Self {
            subject,
            fields,
            outcome,
        }
    }

    /// Render the fields as `label: value` lines.
    #[must_use]
    pub fn body(&self) -> String {
        let mut body = String::new();
        for (label, value) in &self.fields {
            let _ = writeln!(body, "{label}: {value}");
        }
        body
    }
}

/// Hands finished records to the messaging collaborator.
#[derive(Clone)]
pub struct Reporter {
    notifier: Arc<dyn Notifier>,
    config: NotificationConfig,
}

impl Reporter {
    /// Build a reporter delivering through `notifier`.
    #[must_use]
    pub fn new(notifier: Arc<dyn Notifier>, config: NotificationConfig) -> Self {
        Self { notifier, config }
    }

    /// Whether `record` would be reported under the current configuration.
    #[must_use]
    pub fn should_report(&self, record: &DiagnosticRecord) -> bool {
        self.config.enabled && !(self.config.skip_self_corrected && record.is_self_corrected())
    }

    /// Send the report for `record`; returns whether a report was sent.
    ///
    /// Delivery failures are logged, not propagated.
    pub async fn report(&self, record: &DiagnosticRecord) -> bool {
        if !self.should_report(record) {
            debug!(session_id = record.session_id(), "report suppressed");
            return false;
        }

        let report = RemediationReport::from_record(record, &self.config.field_delimiter);
        let body = report.body();
        match self
            .notifier
            .send(&self.config.recipients, &report.subject, &body)
            .await
        {
            Ok(()) => {
                info!(session_id = record.session_id(), subject = %report.subject, "report sent");
                true
            }
            Err(err) => {
                warn!(session_id = record.session_id(), %err, "failed to send report");
                false
            }
        }
    }
}
