//! Remediation ladder decision table.
//!
//! The ladder is strictly linear: StartJob, RefreshJob until the job
//! settles, ReceiveJob when there is output, Restart, then Ignore. No rung
//! is ever revisited and a failed StartJob is never retried.

use crate::models::record::{JobState, RemediationAction};

/// Everything the decision table reads from a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecisionInput {
    /// Whether the last refresh still saw the hung signature.
    pub looks_hung: bool,
    /// Whether the record is already retired.
    pub debugging_complete: bool,
    /// Last entry of the action log.
    pub last_action: Option<RemediationAction>,
    /// Last known diagnostic job state.
    pub job_state: JobState,
    /// Whether the job reported collectable output.
    pub job_has_output: bool,
}

/// Suggested next action and whether it retires the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Action the loop should take next.
    pub action: RemediationAction,
    /// Whether `debugging_complete` must be latched.
    pub completes_debugging: bool,
}

impl Decision {
    const fn next(action: RemediationAction) -> Self {
        Self {
            action,
            completes_debugging: false,
        }
    }

    const fn finished() -> Self {
        Self {
            action: RemediationAction::Ignore,
            completes_debugging: true,
        }
    }
}

/// Pick the next rung of the ladder.
#[must_use]
pub fn decide(input: &DecisionInput) -> Decision {
    if !input.looks_hung || input.debugging_complete {
        return Decision::finished();
    }

    match input.last_action {
        None => Decision::next(RemediationAction::StartJob),
        Some(RemediationAction::StartJob) => Decision::next(RemediationAction::RefreshJob),
        Some(RemediationAction::RefreshJob) => match input.job_state {
            JobState::Running => Decision::next(RemediationAction::RefreshJob),
            JobState::Completed => Decision::next(RemediationAction::ReceiveJob),
            JobState::Failed if input.job_has_output => {
                Decision::next(RemediationAction::ReceiveJob)
            }
            JobState::Failed | JobState::NotStarted => Decision::next(RemediationAction::Restart),
        },
        Some(RemediationAction::ReceiveJob) => Decision::next(RemediationAction::Restart),
        Some(RemediationAction::Restart | RemediationAction::Ignore) => Decision::finished(),
    }
}
