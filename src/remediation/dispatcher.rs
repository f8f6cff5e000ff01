//! Action dispatcher, the only component that mutates remote state.
//!
//! Every action goes through [`ActionDispatcher::act`], which appends it
//! to the record's action log before doing anything else. Remote failures
//! are written into the record's result trail and never propagated: the
//! next refresh re-evaluates and the ladder moves on.

use std::sync::Arc;

use tracing::{info, warn};

use crate::audit::{AuditEntry, AuditEventType, AuditLogger};
use crate::clock::Clock;
use crate::config::RemediationSettings;
use crate::fleet::{FleetQuery, JobRunner, PowerControl};
use crate::models::record::{DiagnosticRecord, JobState, RemediationAction};

use super::refresh::RefreshEnv;

/// Shared collaborators driving every record.
#[derive(Clone)]
pub struct ActionDispatcher {
    fleet: Arc<dyn FleetQuery>,
    power: Arc<dyn PowerControl>,
    jobs: Arc<dyn JobRunner>,
    clock: Arc<dyn Clock>,
    audit: Option<Arc<dyn AuditLogger>>,
    settings: Arc<RemediationSettings>,
}

impl ActionDispatcher {
    /// Build a dispatcher over the given collaborators.
    #[must_use]
    pub fn new(
        fleet: Arc<dyn FleetQuery>,
        power: Arc<dyn PowerControl>,
        jobs: Arc<dyn JobRunner>,
        clock: Arc<dyn Clock>,
        settings: RemediationSettings,
    ) -> Self {
        Self {
            fleet,
            power,
            jobs,
            clock,
            audit: None,
            settings: Arc::new(settings),
        }
    }

    /// Record every action in `audit`.
    #[must_use]
    pub fn with_audit(mut self, audit: Arc<dyn AuditLogger>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Remediation settings in effect.
    #[must_use]
    pub fn settings(&self) -> &RemediationSettings {
        &self.settings
    }

    /// Time source shared with the runner.
    #[must_use]
    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Collaborators a refresh reads from.
    #[must_use]
    pub fn refresh_env(&self) -> RefreshEnv<'_> {
        RefreshEnv {
            fleet: self.fleet.as_ref(),
            jobs: self.jobs.as_ref(),
            clock: self.clock.as_ref(),
            job_timeout: self.settings.job_timeout,
            hung_reasons: &self.settings.hung_failure_reasons,
        }
    }

    /// Refresh `record` and return its suggested action.
    pub async fn refresh(&self, record: &mut DiagnosticRecord) -> RemediationAction {
        record.refresh(&self.refresh_env()).await
    }

    /// Invoke the suggested action of `record`.
    pub async fn act_suggested(&self, record: &mut DiagnosticRecord) {
        let action = record.suggested_action();
        self.act(record, action).await;
    }

    /// Invoke `action` on `record`.
    ///
    /// The action is logged even when it turns out to be a no-op. A retired
    /// record only ever receives `Ignore`.
    pub async fn act(&self, record: &mut DiagnosticRecord, action: RemediationAction) {
        let action = if record.debugging_complete() && action != RemediationAction::Ignore {
            record.note_debug(format!("{action} suppressed: debugging already complete"));
            RemediationAction::Ignore
        } else {
            action
        };

        record.push_action(action);
        info!(session_id = record.session_id(), %action, "invoking action");

        match action {
            RemediationAction::StartJob => self.start_job(record).await,
            RemediationAction::RefreshJob => {
                record
                    .refresh_job(
                        self.jobs.as_ref(),
                        self.clock.as_ref(),
                        self.settings.job_timeout,
                    )
                    .await;
            }
            RemediationAction::ReceiveJob => self.receive_job(record).await,
            RemediationAction::Restart => self.restart(record).await,
            RemediationAction::Ignore => {}
        }

        let summary = record.action_result().last().cloned().unwrap_or_default();
        self.audit(
            AuditEntry::for_record(AuditEventType::ActionTaken, record)
                .with_action(action)
                .with_result(summary),
        );
    }

    async fn start_job(&self, record: &mut DiagnosticRecord) {
        let Some(host) = record.host_name().map(str::to_owned) else {
            warn!(session_id = record.session_id(), "no host name; diagnostic job not started");
            record.job.state = JobState::Failed;
            record.note_result("diagnostic job not started: host name unknown");
            return;
        };

        if record.job.handle.is_some() {
            record.note_debug("diagnostic job already outstanding");
            return;
        }
        if record.job.state == JobState::Failed {
            record.note_debug("diagnostic job previously failed; not resubmitting");
            return;
        }

        match self
            .jobs
            .submit(&host, &self.settings.diagnostic_command)
            .await
        {
            Ok(handle) => {
                info!(session_id = record.session_id(), job = %handle.0, %host, "diagnostic job submitted");
                record.note_result(format!("diagnostic job {} submitted to {host}", handle.0));
                record.job.handle = Some(handle);
                record.job.state = JobState::Running;
                record.job.submitted_at = Some(self.clock.now());
            }
            Err(err) => {
                warn!(session_id = record.session_id(), %err, "diagnostic job submission failed");
                record.job.state = JobState::Failed;
                record.note_result(format!("diagnostic job submission to {host} failed: {err}"));
            }
        }
    }

    async fn receive_job(&self, record: &mut DiagnosticRecord) {
        let Some(handle) = record.job.handle.clone() else {
            record.note_debug("no diagnostic job to receive");
            return;
        };

        // A job forced to Failed by its timeout may never finish on its own.
        let wait = !record.job.timed_out;
        let collect = self.jobs.collect_output(&handle, wait);
        match tokio::time::timeout(self.settings.receive_timeout, collect).await {
            Ok(Ok(output)) => {
                info!(session_id = record.session_id(), job = %handle.0, bytes = output.len(), "diagnostic output received");
                if output.trim().is_empty() {
                    record.note_result(format!("job {} produced no output", handle.0));
                } else {
                    record.note_result(format!("job {} output:\n{output}", handle.0));
                }
                record.job.received = true;
                record.job.handle = None;
                if record.job.state == JobState::Running {
                    record.job.state = JobState::Completed;
                }
            }
            Ok(Err(err)) => {
                warn!(session_id = record.session_id(), %err, "collecting job output failed");
                record.note_result(format!("collecting job {} output failed: {err}", handle.0));
            }
            Err(_) => {
                warn!(session_id = record.session_id(), job = %handle.0, "collecting job output timed out");
                record.note_result(format!(
                    "collecting job {} output timed out after {}s",
                    handle.0,
                    self.settings.receive_timeout.as_secs()
                ));
            }
        }
    }

    async fn restart(&self, record: &mut DiagnosticRecord) {
        if record.restart_issued {
            record.note_debug("restart already issued; not repeating");
            return;
        }
        let Some(machine_id) = record.machine().map(|machine| machine.machine_id.clone()) else {
            record.note_debug("no machine record; restart skipped");
            return;
        };

        // Latched before the call: a failed reset is never retried.
        record.restart_issued = true;

        let outcome = self.power.reset(record.admin_address(), &machine_id).await;
        let summary = match outcome {
            Ok(handle) => {
                info!(session_id = record.session_id(), %machine_id, action_id = %handle.0, "restart requested");
                format!("restart requested for {machine_id} (action {})", handle.0)
            }
            Err(err) => {
                warn!(session_id = record.session_id(), %machine_id, %err, "restart request failed");
                format!("restart of {machine_id} failed: {err}")
            }
        };
        record.note_result(summary.clone());
        self.audit(AuditEntry::for_record(AuditEventType::RestartIssued, record).with_result(summary));
    }

    /// Write `entry` to the audit trail, if one is configured.
    pub fn audit(&self, entry: AuditEntry) {
        if let Some(ref audit) = self.audit {
            if let Err(err) = audit.log_entry(entry) {
                warn!(%err, "failed to write audit entry");
            }
        }
    }
}
