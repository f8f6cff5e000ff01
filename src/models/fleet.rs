//! Shapes returned by the broker and job-execution collaborators.

use serde::{Deserialize, Serialize};

/// Broker value of `last_connection_failure` meaning "no failure".
pub const NORMAL_FAILURE_REASON: &str = "None";

/// Session record as reported by a management endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SessionInfo {
    /// Broker session identifier.
    pub session_id: String,
    /// Account that owns the session, when known.
    #[serde(default)]
    pub user_name: Option<String>,
    /// Broker connection state (e.g. `Connected`, `PreparingSession`).
    #[serde(default)]
    pub connection_state: Option<String>,
    /// DNS name of the machine hosting the session.
    #[serde(default)]
    pub host_name: Option<String>,
}

/// Machine record as reported by a management endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct MachineInfo {
    /// Broker machine identifier used for power actions.
    pub machine_id: String,
    /// DNS name of the machine.
    #[serde(default)]
    pub dns_name: Option<String>,
    /// Desktop group the machine belongs to.
    #[serde(default)]
    pub desktop_group: String,
    /// Reason recorded for the last failed connection.
    #[serde(default = "default_failure_reason")]
    pub last_connection_failure: String,
    /// Whether the machine is a physical workstation.
    #[serde(default)]
    pub is_physical: bool,
    /// Whether the machine is in maintenance mode.
    #[serde(default)]
    pub in_maintenance_mode: bool,
    /// Number of established sessions on the machine.
    #[serde(default)]
    pub session_count: u32,
    /// Identifier of the single session, when exactly one exists.
    #[serde(default)]
    pub session_id: Option<String>,
}

fn default_failure_reason() -> String {
    NORMAL_FAILURE_REASON.into()
}

impl MachineInfo {
    /// Whether the machine carries the "possibly hung" signature.
    ///
    /// Requires a failure reason from `hung_reasons`, a virtual machine,
    /// no maintenance mode and exactly one established session.
    #[must_use]
    pub fn looks_hung(&self, hung_reasons: &[String]) -> bool {
        hung_reasons
            .iter()
            .any(|reason| reason.eq_ignore_ascii_case(&self.last_connection_failure))
            && !self.is_physical
            && !self.in_maintenance_mode
            && self.session_count == 1
    }

    /// Whether the last connection failure reports normal operation.
    #[must_use]
    pub fn reports_normal(&self) -> bool {
        let reason = self.last_connection_failure.trim();
        reason.is_empty() || reason.eq_ignore_ascii_case(NORMAL_FAILURE_REASON)
    }
}

/// Opaque reference to a submitted diagnostic job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct JobHandle(pub String);

/// Opaque reference to a submitted power action.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActionHandle(pub String);

/// Remote run state of a job as reported by the job service.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobRunState {
    /// Job is still executing.
    Running,
    /// Job finished normally.
    Completed,
    /// Job terminated with an error.
    Failed,
}

/// Result of polling a job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobSnapshot {
    /// Current remote run state.
    pub state: JobRunState,
    /// Whether output is available to collect.
    pub has_output: bool,
}
