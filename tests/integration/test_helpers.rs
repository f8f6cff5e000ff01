//! Shared fakes for remediation tests.
//!
//! Provides in-memory implementations of the broker, job service and
//! messaging collaborators plus a manually advanced clock, so individual
//! test modules can script remote behaviour without a network.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

use vdi_remedy::clock::Clock;
use vdi_remedy::config::RemediationSettings;
use vdi_remedy::fleet::{BoxFuture, FleetQuery, JobRunner, PowerControl};
use vdi_remedy::models::fleet::{
    ActionHandle, JobHandle, JobRunState, JobSnapshot, MachineInfo, SessionInfo,
};
use vdi_remedy::notify::Notifier;
use vdi_remedy::remediation::dispatcher::ActionDispatcher;
use vdi_remedy::AppError;

pub const ENDPOINT: &str = "broker01.test";
pub const SESSION: &str = "4711";
pub const HOST: &str = "vdi-0042.corp.test";
pub const MACHINE: &str = "machine-0042";

pub fn hung_reasons() -> Vec<String> {
    vec!["SessionPreparation".into(), "RegistrationTimeout".into()]
}

/// A single-session VM carrying the hung signature.
pub fn hung_machine(session_id: &str) -> MachineInfo {
    MachineInfo {
        machine_id: MACHINE.into(),
        dns_name: Some(HOST.into()),
        desktop_group: "VDI-Finance".into(),
        last_connection_failure: "SessionPreparation".into(),
        is_physical: false,
        in_maintenance_mode: false,
        session_count: 1,
        session_id: Some(session_id.into()),
    }
}

pub fn normal_machine(session_id: &str) -> MachineInfo {
    MachineInfo {
        last_connection_failure: "None".into(),
        ..hung_machine(session_id)
    }
}

pub fn session(session_id: &str) -> SessionInfo {
    SessionInfo {
        session_id: session_id.into(),
        user_name: Some("CORP\\jdoe".into()),
        connection_state: Some("PreparingSession".into()),
        host_name: Some(HOST.into()),
    }
}

/// Scripted session lookup result.
#[derive(Debug, Clone)]
pub enum SessionLookup {
    Present(SessionInfo),
    Missing,
    Failing,
}

#[derive(Default)]
struct FleetState {
    sessions: HashMap<(String, String), SessionLookup>,
    machines: HashMap<(String, String), Option<MachineInfo>>,
    candidates: HashMap<String, Vec<MachineInfo>>,
    failing_endpoints: HashSet<String>,
    resets: Vec<(String, String)>,
    reset_fails: bool,
}

/// In-memory broker: answers queries and records power actions.
#[derive(Default)]
pub struct FakeFleet {
    state: Mutex<FleetState>,
}

impl FakeFleet {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Script a hung session with its machine on [`ENDPOINT`].
    pub fn with_hung_session(session_id: &str) -> Arc<Self> {
        let fleet = Self::new();
        fleet.set_session(ENDPOINT, session_id, SessionLookup::Present(session(session_id)));
        fleet.set_machine(ENDPOINT, session_id, Some(hung_machine(session_id)));
        fleet
    }

    pub fn set_session(&self, endpoint: &str, session_id: &str, lookup: SessionLookup) {
        self.state
            .lock()
            .unwrap()
            .sessions
            .insert((endpoint.into(), session_id.into()), lookup);
    }

    pub fn set_machine(&self, endpoint: &str, session_id: &str, machine: Option<MachineInfo>) {
        self.state
            .lock()
            .unwrap()
            .machines
            .insert((endpoint.into(), session_id.into()), machine);
    }

    pub fn set_candidates(&self, endpoint: &str, machines: Vec<MachineInfo>) {
        self.state
            .lock()
            .unwrap()
            .candidates
            .insert(endpoint.into(), machines);
    }

    pub fn fail_endpoint(&self, endpoint: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_endpoints
            .insert(endpoint.into());
    }

    pub fn fail_resets(&self) {
        self.state.lock().unwrap().reset_fails = true;
    }

    pub fn resets(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().resets.clone()
    }
}

impl FleetQuery for FakeFleet {
    fn get_session<'a>(
        &'a self,
        endpoint: &'a str,
        session_id: &'a str,
    ) -> BoxFuture<'a, SessionInfo> {
        let lookup = self
            .state
            .lock()
            .unwrap()
            .sessions
            .get(&(endpoint.to_owned(), session_id.to_owned()))
            .cloned()
            .unwrap_or(SessionLookup::Missing);
        Box::pin(async move {
            match lookup {
                SessionLookup::Present(info) => Ok(info),
                SessionLookup::Missing => Err(AppError::NotFound(format!("session {session_id}"))),
                SessionLookup::Failing => Err(AppError::Fleet("broker unavailable".into())),
            }
        })
    }

    fn get_machine<'a>(
        &'a self,
        endpoint: &'a str,
        session_id: &'a str,
    ) -> BoxFuture<'a, Option<MachineInfo>> {
        let machine = self
            .state
            .lock()
            .unwrap()
            .machines
            .get(&(endpoint.to_owned(), session_id.to_owned()))
            .cloned()
            .flatten();
        Box::pin(async move { Ok(machine) })
    }

    fn find_candidate_machines<'a>(
        &'a self,
        endpoint: &'a str,
        _group_pattern: &'a str,
        _failure_reasons: &'a [String],
    ) -> BoxFuture<'a, Vec<MachineInfo>> {
        let state = self.state.lock().unwrap();
        let result = if state.failing_endpoints.contains(endpoint) {
            Err(AppError::Fleet(format!("{endpoint} unreachable")))
        } else {
            Ok(state.candidates.get(endpoint).cloned().unwrap_or_default())
        };
        drop(state);
        Box::pin(async move { result })
    }
}

impl PowerControl for FakeFleet {
    fn reset<'a>(&'a self, endpoint: &'a str, machine_id: &'a str) -> BoxFuture<'a, ActionHandle> {
        let mut state = self.state.lock().unwrap();
        state.resets.push((endpoint.into(), machine_id.into()));
        let result = if state.reset_fails {
            Err(AppError::Fleet("power action rejected".into()))
        } else {
            Ok(ActionHandle(format!("reset-{}", state.resets.len())))
        };
        drop(state);
        Box::pin(async move { result })
    }
}

/// Scripted poll result.
#[derive(Debug, Clone, Copy)]
pub enum PollScript {
    Snapshot(JobSnapshot),
    Missing,
    Failing,
}

pub fn running(has_output: bool) -> PollScript {
    PollScript::Snapshot(JobSnapshot {
        state: JobRunState::Running,
        has_output,
    })
}

pub fn completed() -> PollScript {
    PollScript::Snapshot(JobSnapshot {
        state: JobRunState::Completed,
        has_output: true,
    })
}

pub fn failed(has_output: bool) -> PollScript {
    PollScript::Snapshot(JobSnapshot {
        state: JobRunState::Failed,
        has_output,
    })
}

struct JobState {
    submissions: Vec<(String, String)>,
    submit_fails: bool,
    polls: VecDeque<PollScript>,
    last_poll: PollScript,
    output: String,
    collect_calls: Vec<bool>,
    collect_delay: Option<Duration>,
    hosts_by_handle: HashMap<String, String>,
    hung_hosts: HashSet<String>,
    poll_clock: Option<(Arc<ManualClock>, Duration)>,
}

/// In-memory job service following a scripted sequence of poll results.
///
/// Once the script is exhausted the last result repeats.
pub struct FakeJobs {
    state: Mutex<JobState>,
}

impl FakeJobs {
    pub fn new(polls: Vec<PollScript>, output: &str) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(JobState {
                submissions: Vec::new(),
                submit_fails: false,
                polls: polls.into(),
                last_poll: running(false),
                output: output.into(),
                collect_calls: Vec::new(),
                collect_delay: None,
                hosts_by_handle: HashMap::new(),
                hung_hosts: HashSet::new(),
                poll_clock: None,
            }),
        })
    }

    pub fn fail_submissions(&self) {
        self.state.lock().unwrap().submit_fails = true;
    }

    pub fn delay_collection(&self, delay: Duration) {
        self.state.lock().unwrap().collect_delay = Some(delay);
    }

    /// Polls of jobs submitted to `host_name` never answer.
    pub fn hang_polls_on(&self, host_name: &str) {
        self.state.lock().unwrap().hung_hosts.insert(host_name.into());
    }

    /// Every answered poll moves `clock` forward by `step`.
    pub fn advance_clock_on_poll(&self, clock: &Arc<ManualClock>, step: Duration) {
        self.state.lock().unwrap().poll_clock = Some((Arc::clone(clock), step));
    }

    pub fn submissions(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().submissions.clone()
    }

    /// The `wait` flag of every collection request, in order.
    pub fn collect_calls(&self) -> Vec<bool> {
        self.state.lock().unwrap().collect_calls.clone()
    }
}

impl JobRunner for FakeJobs {
    fn submit<'a>(&'a self, host_name: &'a str, payload: &'a str) -> BoxFuture<'a, JobHandle> {
        let mut state = self.state.lock().unwrap();
        let result = if state.submit_fails {
            Err(AppError::Job("remote execution refused".into()))
        } else {
            state.submissions.push((host_name.into(), payload.into()));
            let handle = format!("job-{}", state.submissions.len());
            state.hosts_by_handle.insert(handle.clone(), host_name.into());
            Ok(JobHandle(handle))
        };
        drop(state);
        Box::pin(async move { result })
    }

    fn poll<'a>(&'a self, handle: &'a JobHandle) -> BoxFuture<'a, JobSnapshot> {
        let mut state = self.state.lock().unwrap();
        let hangs = state
            .hosts_by_handle
            .get(&handle.0)
            .is_some_and(|host| state.hung_hosts.contains(host));
        if hangs {
            drop(state);
            return Box::pin(std::future::pending());
        }
        let script = match state.polls.pop_front() {
            Some(next) => {
                state.last_poll = next;
                next
            }
            None => state.last_poll,
        };
        if let Some((clock, step)) = &state.poll_clock {
            clock.advance(*step);
        }
        drop(state);
        Box::pin(async move {
            match script {
                PollScript::Snapshot(snapshot) => Ok(snapshot),
                PollScript::Missing => Err(AppError::NotFound(format!("job {}", handle.0))),
                PollScript::Failing => Err(AppError::Job("job service unavailable".into())),
            }
        })
    }

    fn collect_output<'a>(&'a self, _handle: &'a JobHandle, wait: bool) -> BoxFuture<'a, String> {
        let mut state = self.state.lock().unwrap();
        state.collect_calls.push(wait);
        let output = state.output.clone();
        let delay = state.collect_delay;
        drop(state);
        Box::pin(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            Ok(output)
        })
    }
}

/// Clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap()),
        })
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += chrono::Duration::from_std(by).unwrap();
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// Notifier that remembers every message.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(Vec<String>, String, String)>>,
    fails: Mutex<bool>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail(&self) {
        *self.fails.lock().unwrap() = true;
    }

    pub fn sent(&self) -> Vec<(Vec<String>, String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn send<'a>(
        &'a self,
        recipients: &'a [String],
        subject: &'a str,
        body: &'a str,
    ) -> BoxFuture<'a, ()> {
        let result = if *self.fails.lock().unwrap() {
            Err(AppError::Notify("gateway down".into()))
        } else {
            self.sent
                .lock()
                .unwrap()
                .push((recipients.to_vec(), subject.into(), body.into()));
            Ok(())
        };
        Box::pin(async move { result })
    }
}

/// Settings with short, test-friendly durations.
pub fn test_settings() -> RemediationSettings {
    RemediationSettings {
        poll_interval: Duration::from_millis(5),
        job_timeout: Duration::from_secs(300),
        receive_timeout: Duration::from_secs(2),
        record_budget: Duration::from_secs(5),
        max_concurrent_records: 4,
        restart_on_shutdown: false,
        diagnostic_command: "tasklist /v /fo csv".into(),
        hung_failure_reasons: hung_reasons(),
    }
}

pub fn dispatcher(
    fleet: &Arc<FakeFleet>,
    jobs: &Arc<FakeJobs>,
    clock: &Arc<ManualClock>,
    settings: RemediationSettings,
) -> ActionDispatcher {
    ActionDispatcher::new(
        Arc::clone(fleet) as Arc<dyn FleetQuery>,
        Arc::clone(fleet) as Arc<dyn PowerControl>,
        Arc::clone(jobs) as Arc<dyn JobRunner>,
        Arc::clone(clock) as Arc<dyn Clock>,
        settings,
    )
}
