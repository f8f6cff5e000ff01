//! Read-only refresh of a [`DiagnosticRecord`] from its collaborators.
//!
//! Refresh never mutates remote state. It re-reads the session, the
//! backing machine and the diagnostic job, then recomputes the suggested
//! action.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::fleet::{FleetQuery, JobRunner};
use crate::models::fleet::{JobHandle, JobRunState};
use crate::models::record::{DiagnosticRecord, JobState, RemediationAction, SessionState};

/// Collaborators and thresholds a refresh reads from.
#[derive(Clone, Copy)]
pub struct RefreshEnv<'a> {
    /// Broker queries.
    pub fleet: &'a dyn FleetQuery,
    /// Job service.
    pub jobs: &'a dyn JobRunner,
    /// Time source for job-timeout detection.
    pub clock: &'a dyn Clock,
    /// Running time after which a job is forced to `Failed`.
    pub job_timeout: Duration,
    /// Failure reasons treated as the hung signature.
    pub hung_reasons: &'a [String],
}

impl DiagnosticRecord {
    /// Re-read remote state and recompute the suggested action.
    pub async fn refresh(&mut self, env: &RefreshEnv<'_>) -> RemediationAction {
        if self.debugging_complete {
            return self.update_suggested_action();
        }

        let session_ok = self.refresh_session(env.fleet).await;
        if self.session_state != SessionState::Destroyed {
            self.refresh_machine(env.fleet, env.hung_reasons, session_ok)
                .await;
        }

        self.refresh_job(env.jobs, env.clock, env.job_timeout).await;
        let action = self.update_suggested_action();
        debug!(
            session_id = self.session_id(),
            state = ?self.session_state,
            looks_hung = self.looks_hung,
            suggested = %action,
            "record refreshed"
        );
        action
    }

    async fn refresh_session(&mut self, fleet: &dyn FleetQuery) -> bool {
        let lookup = fleet
            .get_session(self.admin_address(), self.session_id())
            .await;
        match lookup {
            Ok(session) => {
                if self.host_name.is_none() {
                    self.host_name = session.host_name.filter(|name| !name.is_empty());
                }
                true
            }
            Err(err) if err.is_not_found() => {
                info!(session_id = self.session_id(), "session no longer exists");
                self.session_state = SessionState::Destroyed;
                self.debugging_complete = true;
                self.note_debug(format!("session destroyed: {err}"));
                false
            }
            Err(err) => {
                warn!(session_id = self.session_id(), %err, "session query failed");
                self.session_state = SessionState::QueryFailed;
                self.note_debug(format!("session query failed: {err}"));
                false
            }
        }
    }

    async fn refresh_machine(
        &mut self,
        fleet: &dyn FleetQuery,
        hung_reasons: &[String],
        session_ok: bool,
    ) {
        let lookup = fleet
            .get_machine(self.admin_address(), self.session_id())
            .await;
        match lookup {
            Ok(Some(machine)) => {
                if self.host_name.is_none() {
                    self.host_name = machine.dns_name.clone().filter(|name| !name.is_empty());
                }
                self.looks_hung = machine.looks_hung(hung_reasons);
                if machine.reports_normal() {
                    info!(session_id = self.session_id(), "machine reports normal operation");
                    self.session_state = SessionState::Working;
                    self.debugging_complete = true;
                } else if session_ok && self.looks_hung {
                    self.session_state = SessionState::Hung;
                }
                self.machine = Some(machine);
            }
            Ok(None) => {
                info!(session_id = self.session_id(), "no machine record for session");
                self.looks_hung = false;
                self.debugging_complete = true;
                self.note_debug("no machine record found");
            }
            Err(err) => {
                warn!(session_id = self.session_id(), %err, "machine query failed");
                self.note_debug(format!("machine query failed: {err}"));
            }
        }
    }

    /// Re-read the diagnostic job state.
    ///
    /// A vanished job keeps its last known state and loses its handle. A
    /// job running past `job_timeout` is forced to `Failed` but left
    /// running remotely so it can still yield output.
    pub async fn refresh_job(
        &mut self,
        jobs: &dyn JobRunner,
        clock: &dyn Clock,
        job_timeout: Duration,
    ) {
        if let Some(handle) = self.job.handle.clone() {
            self.poll_job(jobs, &handle).await;
        }

        // Applies to a vanished job too, so a lost Running job cannot stall the ladder.
        if self.job.state != JobState::Running {
            return;
        }
        let Some(submitted_at) = self.job.submitted_at else {
            return;
        };
        let elapsed = clock
            .now()
            .signed_duration_since(submitted_at)
            .to_std()
            .unwrap_or_default();
        if elapsed >= job_timeout {
            warn!(
                session_id = self.session_id(),
                elapsed_secs = elapsed.as_secs(),
                "diagnostic job timed out"
            );
            self.job.state = JobState::Failed;
            self.job.timed_out = true;
            self.note_debug(format!(
                "diagnostic job exceeded {}s timeout",
                job_timeout.as_secs()
            ));
        }
    }

    async fn poll_job(&mut self, jobs: &dyn JobRunner, handle: &JobHandle) {
        match jobs.poll(handle).await {
            Ok(snapshot) => {
                self.job.has_output = snapshot.has_output;
                if !self.job.timed_out {
                    self.job.state = match snapshot.state {
                        JobRunState::Running => JobState::Running,
                        JobRunState::Completed => JobState::Completed,
                        JobRunState::Failed => JobState::Failed,
                    };
                }
            }
            Err(err) if err.is_not_found() => {
                info!(job = %handle.0, "diagnostic job no longer found");
                self.note_debug(format!(
                    "job {} no longer found; last state {:?}",
                    handle.0, self.job.state
                ));
                self.job.handle = None;
            }
            Err(err) => {
                warn!(job = %handle.0, %err, "diagnostic job poll failed");
                self.note_debug(format!("job {} poll failed: {err}", handle.0));
                self.job.state = JobState::Failed;
            }
        }
    }
}
