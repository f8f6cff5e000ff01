//! Concurrent remediation loop.
//!
//! Each record runs on its own task: refresh, act on the suggestion, sleep
//! for the poll interval, repeat. A record leaves the loop when debugging
//! completes or its wall-clock budget runs out. Every remote step is bounded
//! by whatever budget remains, so a collaborator that never answers cannot
//! hold a record (or the pass) past it. On expiry the record gets one forced
//! final attempt so a restart still goes out when polling under-sampled a
//! fast-failing job.
//!
//! Shutdown stops the loop without that restart unless `restart_on_shutdown`
//! is set.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

use crate::audit::{AuditEntry, AuditEventType};
use crate::models::record::{DiagnosticRecord, RecordOutcome, RemediationAction};

use super::decision::decide;
use super::dispatcher::ActionDispatcher;
use super::report::Reporter;

/// Summary of one record after it left the loop.
#[derive(Debug, Clone)]
pub struct RemediationOutcome {
    /// The record in its final state.
    pub record: DiagnosticRecord,
    /// Whether the record ran out of budget, including a step that never
    /// answered.
    pub budget_expired: bool,
    /// Whether shutdown interrupted the record.
    pub cancelled: bool,
    /// Whether a report was delivered.
    pub reported: bool,
}

impl RemediationOutcome {
    /// Final classification of the record.
    #[must_use]
    pub fn outcome(&self) -> RecordOutcome {
        self.record.outcome()
    }
}

/// Why a record left the polling loop.
#[derive(Debug)]
enum LoopExit {
    Retired,
    BudgetExpired,
    /// A remote step was still pending when the budget ran out.
    Stalled(String),
    Cancelled,
}

enum Step<T> {
    Done(T),
    Stalled,
    Cancelled,
}

/// Drives many records through the remediation ladder concurrently.
#[derive(Clone)]
pub struct RemediationRunner {
    dispatcher: ActionDispatcher,
    reporter: Option<Reporter>,
    cancel: CancellationToken,
}

impl RemediationRunner {
    /// Build a runner; `reporter` may be `None` to skip reporting.
    #[must_use]
    pub fn new(
        dispatcher: ActionDispatcher,
        reporter: Option<Reporter>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            dispatcher,
            reporter,
            cancel,
        }
    }

    /// Remediate every record and return their outcomes.
    ///
    /// Outcomes are returned in completion order. A record task that panics
    /// is logged and omitted.
    pub async fn run(&self, records: Vec<DiagnosticRecord>) -> Vec<RemediationOutcome> {
        let limit = self.dispatcher.settings().max_concurrent_records.max(1);
        let permits = Arc::new(Semaphore::new(limit));
        let mut tasks = JoinSet::new();

        for record in records {
            let runner = self.clone();
            let permits = Arc::clone(&permits);
            let span = info_span!(
                "remediate",
                session_id = record.session_id(),
                endpoint = record.admin_address()
            );
            tasks.spawn(
                async move {
                    // The semaphore is never closed.
                    let _permit = permits.acquire_owned().await.ok();
                    runner.remediate(record).await
                }
                .instrument(span),
            );
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => error!(%err, "remediation task failed"),
            }
        }
        outcomes
    }

    /// Drive a single record to completion, budget expiry or shutdown, then
    /// report it.
    pub async fn remediate(&self, mut record: DiagnosticRecord) -> RemediationOutcome {
        let started = self.dispatcher.clock().now();
        let exit = self.poll_until_done(&mut record, started).await;

        let mut budget_expired = false;
        let mut cancelled = false;
        match exit {
            LoopExit::Retired => {
                info!(
                    session_id = record.session_id(),
                    outcome = record.outcome().label(),
                    "record retired"
                );
                self.dispatcher.audit(
                    AuditEntry::for_record(AuditEventType::RecordRetired, &record)
                        .with_result(record.outcome().label().to_owned()),
                );
            }
            LoopExit::BudgetExpired => {
                budget_expired = true;
                self.final_attempt(&mut record, true, "budget expired", AuditEventType::BudgetExpired)
                    .await;
            }
            LoopExit::Stalled(step) => {
                budget_expired = true;
                warn!(session_id = record.session_id(), %step, "step did not answer within budget");
                record.note_debug(format!("{step} did not answer within the record budget"));
                // The collaborator is not answering; act on what is cached.
                self.final_attempt(&mut record, false, "budget expired", AuditEventType::BudgetExpired)
                    .await;
            }
            LoopExit::Cancelled => {
                cancelled = true;
                if self.dispatcher.settings().restart_on_shutdown {
                    self.final_attempt(&mut record, true, "cancelled", AuditEventType::RecordCancelled)
                        .await;
                } else {
                    self.abandon(&mut record);
                }
            }
        }

        let reported = match self.reporter {
            Some(ref reporter) => reporter.report(&record).await,
            None => false,
        };

        RemediationOutcome {
            record,
            budget_expired,
            cancelled,
            reported,
        }
    }

    async fn poll_until_done(
        &self,
        record: &mut DiagnosticRecord,
        started: DateTime<Utc>,
    ) -> LoopExit {
        let poll_interval = self.dispatcher.settings().poll_interval;
        loop {
            match self
                .bounded(self.remaining(started), self.dispatcher.refresh(record))
                .await
            {
                Step::Done(_) => {}
                Step::Stalled => return LoopExit::Stalled("refresh".to_owned()),
                Step::Cancelled => return LoopExit::Cancelled,
            }
            if record.debugging_complete() {
                return LoopExit::Retired;
            }

            let action = record.suggested_action();
            match self
                .bounded(self.remaining(started), self.dispatcher.act_suggested(record))
                .await
            {
                Step::Done(()) => {}
                Step::Stalled => return LoopExit::Stalled(action.to_string()),
                Step::Cancelled => return LoopExit::Cancelled,
            }
            if record.debugging_complete() {
                return LoopExit::Retired;
            }

            let remaining = self.remaining(started);
            if remaining.is_zero() {
                return LoopExit::BudgetExpired;
            }

            let cancelled = tokio::select! {
                () = self.cancel.cancelled() => true,
                () = tokio::time::sleep(poll_interval.min(remaining)) => false,
            };
            if cancelled {
                return LoopExit::Cancelled;
            }
        }
    }

    /// Budget left for the record, measured on the injected clock.
    fn remaining(&self, started: DateTime<Utc>) -> Duration {
        let elapsed = self
            .dispatcher
            .clock()
            .now()
            .signed_duration_since(started)
            .to_std()
            .unwrap_or_default();
        self.dispatcher.settings().record_budget.saturating_sub(elapsed)
    }

    /// Await one remote step for at most `limit`, giving up early on shutdown.
    async fn bounded<T>(&self, limit: Duration, step: impl Future<Output = T>) -> Step<T> {
        tokio::select! {
            () = self.cancel.cancelled() => Step::Cancelled,
            done = tokio::time::timeout(limit, step) => match done {
                Ok(value) => Step::Done(value),
                Err(_) => Step::Stalled,
            },
        }
    }

    /// Optionally refresh once more, then restart unless the record is done.
    ///
    /// Both remote calls are bounded by the poll interval. The restart only
    /// needs the cached machine, so it still goes out when the refresh does
    /// not answer.
    async fn final_attempt(
        &self,
        record: &mut DiagnosticRecord,
        refresh: bool,
        cause: &str,
        event: AuditEventType,
    ) {
        warn!(session_id = record.session_id(), cause, "forcing final action");
        let grace = self.dispatcher.settings().poll_interval;

        if refresh
            && tokio::time::timeout(grace, self.dispatcher.refresh(record))
                .await
                .is_err()
        {
            record.note_debug(format!("final refresh did not answer within {grace:?}"));
        }

        let restart = !record.debugging_complete()
            && decide(&record.decision_input()).action != RemediationAction::Ignore;
        if restart
            && tokio::time::timeout(grace, self.dispatcher.act(record, RemediationAction::Restart))
                .await
                .is_err()
        {
            record.note_debug(format!("restart request did not answer within {grace:?}"));
        }

        record.note_debug(format!("{cause} after {} actions", record.action_log().len()));
        self.dispatcher.audit(
            AuditEntry::for_record(event, record).with_result(record.outcome().label().to_owned()),
        );
    }

    /// Leave a record untouched on shutdown.
    fn abandon(&self, record: &mut DiagnosticRecord) {
        info!(session_id = record.session_id(), "remediation cancelled; restart skipped");
        record.note_debug(format!(
            "cancelled after {} actions; restart skipped",
            record.action_log().len()
        ));
        self.dispatcher.audit(
            AuditEntry::for_record(AuditEventType::RecordCancelled, record)
                .with_result(record.outcome().label().to_owned()),
        );
    }
}
