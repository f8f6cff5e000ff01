//! Structured audit trail for remediation events.
//!
//! Provides the [`AuditLogger`] trait and associated types. The primary
//! implementation, [`JsonlAuditWriter`], appends JSONL records to
//! daily-rotating files in the configured audit directory.

pub mod writer;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::record::{DiagnosticRecord, RemediationAction};

/// Event type classification for audit log entries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    /// A discovery scan finished.
    ScanCompleted,
    /// An action was invoked on a record.
    ActionTaken,
    /// A power reset was requested.
    RestartIssued,
    /// A record finished debugging and left the loop.
    RecordRetired,
    /// A record ran out of budget before debugging finished.
    BudgetExpired,
    /// Shutdown interrupted a record before debugging finished.
    RecordCancelled,
}

/// A structured record of a remediation event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// ISO 8601 timestamp with timezone.
    pub timestamp: DateTime<Utc>,
    /// Event classification.
    pub event_type: AuditEventType,
    /// Diagnostic record identifier (absent for scan-level events).
    pub record_id: Option<String>,
    /// Management endpoint owning the session.
    pub admin_address: Option<String>,
    /// Tracked session identifier.
    pub session_id: Option<String>,
    /// Host backing the session, when resolved.
    pub host_name: Option<String>,
    /// Action invoked (for `action_taken` events).
    pub action: Option<RemediationAction>,
    /// Brief result description.
    pub result_summary: Option<String>,
}

impl AuditEntry {
    /// Construct a minimal audit entry for the given event type.
    #[must_use]
    pub fn new(event_type: AuditEventType) -> Self {
        Self {
            timestamp: Utc::now(),
            event_type,
            record_id: None,
            admin_address: None,
            session_id: None,
            host_name: None,
            action: None,
            result_summary: None,
        }
    }

    /// Construct an entry describing `record`.
    #[must_use]
    pub fn for_record(event_type: AuditEventType, record: &DiagnosticRecord) -> Self {
        let mut entry = Self::new(event_type);
        entry.record_id = Some(record.id().to_owned());
        entry.admin_address = Some(record.admin_address().to_owned());
        entry.session_id = Some(record.session_id().to_owned());
        entry.host_name = record.host_name().map(str::to_owned);
        entry
    }

    /// Set the action for this entry.
    #[must_use]
    pub fn with_action(mut self, action: RemediationAction) -> Self {
        self.action = Some(action);
        self
    }

    /// Set the result summary for this entry.
    #[must_use]
    pub fn with_result(mut self, summary: String) -> Self {
        self.result_summary = Some(summary);
        self
    }
}

/// Writes structured audit entries to a persistent store.
///
/// Implementations must be [`Send`] and [`Sync`] to allow sharing across
/// async task boundaries via [`std::sync::Arc`].
pub trait AuditLogger: Send + Sync {
    /// Record a single audit entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying write operation fails.
    fn log_entry(&self, entry: AuditEntry) -> crate::Result<()>;
}

pub use writer::JsonlAuditWriter;
