//! Diagnostic record tracked for each suspected-hung session.

use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::fleet::{JobHandle, MachineInfo};
use crate::remediation::decision::{decide, DecisionInput};

/// Last observed state of the tracked session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Not refreshed yet.
    Unknown,
    /// Session and machine still carry the hung signature.
    Hung,
    /// Session no longer exists on the endpoint.
    Destroyed,
    /// Machine reports normal operation.
    Working,
    /// Session lookup failed for a reason other than absence.
    QueryFailed,
}

/// Local view of the diagnostic job run state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// No job submitted.
    NotStarted,
    /// Job submitted and still executing.
    Running,
    /// Job finished normally.
    Completed,
    /// Job failed, could not be submitted, or overran its timeout.
    Failed,
}

/// Rung of the remediation ladder.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RemediationAction {
    /// Submit the diagnostic job to the affected host.
    StartJob,
    /// Poll the outstanding diagnostic job.
    RefreshJob,
    /// Collect the diagnostic job output.
    ReceiveJob,
    /// Issue a power reset for the machine.
    Restart,
    /// Take no action.
    Ignore,
}

impl RemediationAction {
    /// Stable lowercase name used in logs and reports.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StartJob => "start_job",
            Self::RefreshJob => "refresh_job",
            Self::ReceiveJob => "receive_job",
            Self::Restart => "restart",
            Self::Ignore => "ignore",
        }
    }
}

impl Display for RemediationAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single diagnostic job a record may own.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiagnosticJob {
    /// Outstanding handle; `None` once the job is gone or collected.
    pub handle: Option<JobHandle>,
    /// Last known run state.
    pub state: JobState,
    /// Submission time, used for timeout detection.
    pub submitted_at: Option<DateTime<Utc>>,
    /// Whether the job reported collectable output on its last poll.
    pub has_output: bool,
    /// Whether output has been collected.
    pub received: bool,
    /// Whether the `Failed` state was forced by the job timeout.
    pub timed_out: bool,
}

impl Default for DiagnosticJob {
    fn default() -> Self {
        Self {
            handle: None,
            state: JobState::NotStarted,
            submitted_at: None,
            has_output: false,
            received: false,
            timed_out: false,
        }
    }
}

/// Final classification of a retired record, used in report subjects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Machine recovered before any action was needed.
    SelfCorrected,
    /// A restart was issued.
    Restarted,
    /// The session disappeared.
    Destroyed,
    /// Debugging finished without a restart.
    Resolved,
    /// The record was abandoned before debugging finished.
    Incomplete,
}

impl RecordOutcome {
    /// Short human-readable label.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::SelfCorrected => "self-corrected",
            Self::Restarted => "restart issued",
            Self::Destroyed => "session destroyed",
            Self::Resolved => "resolved",
            Self::Incomplete => "debugging incomplete",
        }
    }
}

/// One suspected-hung session and everything learned about it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiagnosticRecord {
    id: String,
    admin_address: String,
    session_id: String,
    created_at: DateTime<Utc>,
    pub(crate) host_name: Option<String>,
    pub(crate) machine: Option<MachineInfo>,
    pub(crate) session_state: SessionState,
    pub(crate) looks_hung: bool,
    pub(crate) debugging_complete: bool,
    pub(crate) restart_issued: bool,
    pub(crate) job: DiagnosticJob,
    action_log: Vec<RemediationAction>,
    suggested_action: RemediationAction,
    pub(crate) action_result: Vec<String>,
    pub(crate) debug_info: Vec<String>,
}

impl DiagnosticRecord {
    /// Start tracking a session on a management endpoint.
    #[must_use]
    pub fn new(admin_address: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            admin_address: admin_address.into(),
            session_id: session_id.into(),
            created_at: Utc::now(),
            host_name: None,
            machine: None,
            session_state: SessionState::Unknown,
            looks_hung: false,
            debugging_complete: false,
            restart_issued: false,
            job: DiagnosticJob::default(),
            action_log: Vec::new(),
            suggested_action: RemediationAction::Ignore,
            action_result: Vec::new(),
            debug_info: Vec::new(),
        }
    }

    /// Unique record identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Management endpoint owning the session.
    #[must_use]
    pub fn admin_address(&self) -> &str {
        &self.admin_address
    }

    /// Tracked session identifier.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Creation timestamp.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Cached host name of the backing machine.
    #[must_use]
    pub fn host_name(&self) -> Option<&str> {
        self.host_name.as_deref()
    }

    /// Last machine record seen for the session.
    #[must_use]
    pub fn machine(&self) -> Option<&MachineInfo> {
        self.machine.as_ref()
    }

    /// Last observed session state.
    #[must_use]
    pub fn session_state(&self) -> SessionState {
        self.session_state
    }

    /// Whether the last refresh still saw the hung signature.
    #[must_use]
    pub fn looks_hung(&self) -> bool {
        self.looks_hung
    }

    /// Whether the record is retired from the active loop.
    #[must_use]
    pub fn debugging_complete(&self) -> bool {
        self.debugging_complete
    }

    /// Whether a restart has been issued.
    #[must_use]
    pub fn restart_issued(&self) -> bool {
        self.restart_issued
    }

    /// The diagnostic job slot.
    #[must_use]
    pub fn job(&self) -> &DiagnosticJob {
        &self.job
    }

    /// Actions taken so far, in order.
    #[must_use]
    pub fn action_log(&self) -> &[RemediationAction] {
        &self.action_log
    }

    /// Most recent action taken.
    #[must_use]
    pub fn last_action(&self) -> Option<RemediationAction> {
        self.action_log.last().copied()
    }

    /// Next action the loop should take.
    #[must_use]
    pub fn suggested_action(&self) -> RemediationAction {
        self.suggested_action
    }

    /// Results of remote actions, in order.
    #[must_use]
    pub fn action_result(&self) -> &[String] {
        &self.action_result
    }

    /// Diagnostic trail, in order.
    #[must_use]
    pub fn debug_info(&self) -> &[String] {
        &self.debug_info
    }

    /// Whether the machine recovered without any action being taken.
    #[must_use]
    pub fn is_self_corrected(&self) -> bool {
        self.session_state == SessionState::Working && self.action_log.is_empty()
    }

    /// Classification used when reporting the record.
    #[must_use]
    pub fn outcome(&self) -> RecordOutcome {
        if self.restart_issued {
            RecordOutcome::Restarted
        } else if self.is_self_corrected() {
            RecordOutcome::SelfCorrected
        } else if self.session_state == SessionState::Destroyed {
            RecordOutcome::Destroyed
        } else if self.debugging_complete {
            RecordOutcome::Resolved
        } else {
            RecordOutcome::Incomplete
        }
    }

    /// Inputs of the decision table taken from the current state.
    #[must_use]
    pub fn decision_input(&self) -> DecisionInput {
        DecisionInput {
            looks_hung: self.looks_hung,
            debugging_complete: self.debugging_complete,
            last_action: self.last_action(),
            job_state: self.job.state,
            job_has_output: self.job.has_output,
        }
    }

    /// Recompute `suggested_action` from the current state.
    pub fn update_suggested_action(&mut self) -> RemediationAction {
        let decision = decide(&self.decision_input());
        if decision.completes_debugging {
            self.debugging_complete = true;
        }
        self.suggested_action = decision.action;
        decision.action
    }

    pub(crate) fn push_action(&mut self, action: RemediationAction) {
        self.action_log.push(action);
    }

    pub(crate) fn note_result(&mut self, message: impl Into<String>) {
        self.action_result.push(message.into());
    }

    pub(crate) fn note_debug(&mut self, message: impl Into<String>) {
        self.debug_info.push(message.into());
    }
}
