//! Seams to the external collaborators the remediation core drives.
//!
//! The broker (fleet-management) API answers session and machine queries
//! and accepts power actions. A separate job-execution service runs the
//! diagnostic command on the affected host. Both are reached through the
//! traits below so the state machine can be exercised against fakes;
//! [`http`] holds the production adapters.

pub mod http;

use std::future::Future;
use std::pin::Pin;

use crate::models::fleet::{ActionHandle, JobHandle, JobSnapshot, MachineInfo, SessionInfo};
use crate::Result;

/// Boxed, sendable future returned by collaborator traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Read-only queries against a management endpoint.
pub trait FleetQuery: Send + Sync {
    /// Fetch a session by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotFound`](crate::AppError::NotFound) if the
    /// session no longer exists, any other variant for query failures.
    fn get_session<'a>(&'a self, endpoint: &'a str, session_id: &'a str)
        -> BoxFuture<'a, SessionInfo>;

    /// Fetch the machine backing a session; `None` when there is none.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint cannot be queried.
    fn get_machine<'a>(
        &'a self,
        endpoint: &'a str,
        session_id: &'a str,
    ) -> BoxFuture<'a, Option<MachineInfo>>;

    /// List machines of one endpoint matching a group pattern whose last
    /// connection failure is one of `failure_reasons`.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint cannot be queried.
    fn find_candidate_machines<'a>(
        &'a self,
        endpoint: &'a str,
        group_pattern: &'a str,
        failure_reasons: &'a [String],
    ) -> BoxFuture<'a, Vec<MachineInfo>>;
}

/// Power actions against a management endpoint.
pub trait PowerControl: Send + Sync {
    /// Request a hard reset of a machine.
    ///
    /// The action is queued and throttled by the endpoint; completion of
    /// this call does not mean the machine has restarted.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint rejects or cannot accept the action.
    fn reset<'a>(&'a self, endpoint: &'a str, machine_id: &'a str) -> BoxFuture<'a, ActionHandle>;
}

/// Asynchronous command execution on remote hosts.
pub trait JobRunner: Send + Sync {
    /// Submit `payload` for execution on `host_name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the job service refuses the submission.
    fn submit<'a>(&'a self, host_name: &'a str, payload: &'a str) -> BoxFuture<'a, JobHandle>;

    /// Poll a job's run state.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotFound`](crate::AppError::NotFound) if the job
    /// is unknown to the service.
    fn poll<'a>(&'a self, handle: &'a JobHandle) -> BoxFuture<'a, JobSnapshot>;

    /// Collect a job's output, blocking until completion when `wait` is set.
    ///
    /// # Errors
    ///
    /// Returns an error if the output cannot be retrieved.
    fn collect_output<'a>(&'a self, handle: &'a JobHandle, wait: bool) -> BoxFuture<'a, String>;
}
