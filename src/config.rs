//! Global configuration parsing, validation, and credential loading.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::{AppError, Result};

/// Keychain service name under which credentials are stored.
const KEYRING_SERVICE: &str = "vdi-remedy";

/// Broker (fleet-management) REST API connectivity.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct BrokerConfig {
    /// URL scheme used to reach each management endpoint.
    #[serde(default = "default_scheme")]
    pub scheme: String,
    /// Path prefix of the broker API on every endpoint.
    #[serde(default = "default_base_path")]
    pub base_path: String,
    /// Per-request timeout.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    /// Bearer token for the broker API (populated at runtime).
    #[serde(skip)]
    pub token: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            scheme: default_scheme(),
            base_path: default_base_path(),
            request_timeout_seconds: default_request_timeout(),
            token: String::new(),
        }
    }
}

/// Remote job-execution service used for on-host diagnostics.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct JobsConfig {
    /// Base URL of the job-execution service.
    pub service_url: String,
    /// Command submitted to the affected host before it is reset.
    #[serde(default = "default_diagnostic_command")]
    pub diagnostic_command: String,
    /// Timeout of job submission and status requests. Output collection
    /// is bounded by `remediation.receive_timeout_seconds` instead.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    /// Bearer token for the job service (populated at runtime).
    #[serde(skip)]
    pub token: String,
}

/// Timing and concurrency of the remediation loop.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct RemediationConfig {
    /// Delay between refresh/act cycles of a single record.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
    /// Running time after which a diagnostic job is treated as failed.
    #[serde(default = "default_job_timeout")]
    pub job_timeout_seconds: u64,
    /// Upper bound on the blocking output collection of a job.
    #[serde(default = "default_receive_timeout")]
    pub receive_timeout_seconds: u64,
    /// Wall-clock budget of a single record.
    #[serde(default = "default_record_budget")]
    pub record_budget_seconds: u64,
    /// Maximum number of records remediated at the same time.
    #[serde(default = "default_max_concurrent_records")]
    pub max_concurrent_records: usize,
    /// Still force the final restart on records interrupted by shutdown.
    #[serde(default)]
    pub restart_on_shutdown: bool,
}

impl Default for RemediationConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: default_poll_interval(),
            job_timeout_seconds: default_job_timeout(),
            receive_timeout_seconds: default_receive_timeout(),
            record_budget_seconds: default_record_budget(),
            max_concurrent_records: default_max_concurrent_records(),
            restart_on_shutdown: false,
        }
    }
}

/// Final report delivery.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct NotificationConfig {
    /// Whether reports are sent at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Skip reports for records that recovered without any action.
    #[serde(default = "default_true")]
    pub skip_self_corrected: bool,
    /// Slack channel or user IDs receiving every report.
    #[serde(default)]
    pub recipients: Vec<String>,
    /// Separator used when flattening multi-valued report fields.
    #[serde(default = "default_field_delimiter")]
    pub field_delimiter: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            skip_self_corrected: true,
            recipients: Vec::new(),
            field_delimiter: default_field_delimiter(),
        }
    }
}

/// Slack delivery settings.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SlackConfig {
    /// Deliver reports through Slack; otherwise they are only logged.
    #[serde(default)]
    pub enabled: bool,
    /// Bot user token used for posting messages (populated at runtime).
    #[serde(skip)]
    pub bot_token: String,
}

fn default_scheme() -> String {
    "https".into()
}

fn default_base_path() -> String {
    "/api/v1".into()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_diagnostic_command() -> String {
    "tasklist /v /fo csv".into()
}

fn default_poll_interval() -> u64 {
    15
}

fn default_job_timeout() -> u64 {
    300
}

fn default_receive_timeout() -> u64 {
    120
}

fn default_record_budget() -> u64 {
    900
}

fn default_max_concurrent_records() -> usize {
    16
}

fn default_rescan_interval() -> u64 {
    900
}

fn default_true() -> bool {
    true
}

fn default_field_delimiter() -> String {
    "; ".into()
}

fn default_hung_failure_reasons() -> Vec<String> {
    vec![
        "SessionPreparation".into(),
        "RegistrationTimeout".into(),
        "ConnectionRefused".into(),
    ]
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Management endpoints (admin addresses) to scan.
    pub endpoints: Vec<String>,
    /// Glob pattern matched against the desktop group name.
    #[serde(default = "default_group_pattern")]
    pub desktop_group_pattern: String,
    /// Last-connection-failure reasons that mark a machine as possibly hung.
    #[serde(default = "default_hung_failure_reasons")]
    pub hung_failure_reasons: Vec<String>,
    /// Directory for the JSONL audit trail; disabled when absent.
    #[serde(default)]
    pub audit_log_dir: Option<PathBuf>,
    /// Delay between scans in watch mode.
    #[serde(default = "default_rescan_interval")]
    pub rescan_interval_seconds: u64,
    /// Broker API settings.
    #[serde(default)]
    pub broker: BrokerConfig,
    /// Job-execution service settings.
    pub jobs: JobsConfig,
    /// Remediation loop timing.
    #[serde(default)]
    pub remediation: RemediationConfig,
    /// Report delivery.
    #[serde(default)]
    pub notifications: NotificationConfig,
    /// Slack connectivity.
    #[serde(default)]
    pub slack: SlackConfig,
}

fn default_group_pattern() -> String {
    "*".into()
}

/// Remediation loop parameters as durations, handed to the runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemediationSettings {
    /// Delay between cycles.
    pub poll_interval: Duration,
    /// Running time after which a job is forced to `Failed`.
    pub job_timeout: Duration,
    /// Bound on blocking output collection.
    pub receive_timeout: Duration,
    /// Per-record wall-clock budget.
    pub record_budget: Duration,
    /// Concurrency limit across records.
    pub max_concurrent_records: usize,
    /// Whether shutdown still forces the final restart.
    pub restart_on_shutdown: bool,
    /// Payload submitted as the diagnostic job.
    pub diagnostic_command: String,
    /// Failure reasons treated as the hung signature.
    pub hung_failure_reasons: Vec<String>,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and validate it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load API credentials from OS keychain with env-var fallback.
    ///
    /// The Slack token is only required when Slack delivery is enabled.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a required credential is missing.
    pub async fn load_credentials(&mut self) -> Result<()> {
        self.broker.token = load_credential("broker_token", "VDI_BROKER_TOKEN").await?;
        self.jobs.token = load_credential("jobs_token", "VDI_JOBS_TOKEN").await?;
        if self.slack.enabled {
            self.slack.bot_token = load_credential("slack_bot_token", "SLACK_BOT_TOKEN").await?;
        }
        Ok(())
    }

    /// Remediation parameters derived from the `[remediation]` table.
    #[must_use]
    pub fn remediation_settings(&self) -> RemediationSettings {
        RemediationSettings {
            poll_interval: Duration::from_secs(self.remediation.poll_interval_seconds),
            job_timeout: Duration::from_secs(self.remediation.job_timeout_seconds),
            receive_timeout: Duration::from_secs(self.remediation.receive_timeout_seconds),
            record_budget: Duration::from_secs(self.remediation.record_budget_seconds),
            max_concurrent_records: self.remediation.max_concurrent_records,
            restart_on_shutdown: self.remediation.restart_on_shutdown,
            diagnostic_command: self.jobs.diagnostic_command.clone(),
            hung_failure_reasons: self.hung_failure_reasons.clone(),
        }
    }

    /// Delay between scans in watch mode.
    #[must_use]
    pub fn rescan_interval(&self) -> Duration {
        Duration::from_secs(self.rescan_interval_seconds)
    }

    fn validate(&self) -> Result<()> {
        if self.endpoints.is_empty() {
            return Err(AppError::Config("endpoints must not be empty".into()));
        }

        if self.hung_failure_reasons.is_empty() {
            return Err(AppError::Config(
                "hung_failure_reasons must not be empty".into(),
            ));
        }

        glob::Pattern::new(&self.desktop_group_pattern).map_err(|err| {
            AppError::Config(format!("desktop_group_pattern invalid: {err}"))
        })?;

        if self.broker.request_timeout_seconds == 0 || self.jobs.request_timeout_seconds == 0 {
            return Err(AppError::Config(
                "request_timeout_seconds must be greater than zero".into(),
            ));
        }

        let remediation = &self.remediation;
        if remediation.poll_interval_seconds == 0 {
            return Err(AppError::Config(
                "poll_interval_seconds must be greater than zero".into(),
            ));
        }
        if remediation.record_budget_seconds == 0 {
            return Err(AppError::Config(
                "record_budget_seconds must be greater than zero".into(),
            ));
        }
        if remediation.poll_interval_seconds > remediation.record_budget_seconds {
            return Err(AppError::Config(
                "poll_interval_seconds must not exceed record_budget_seconds".into(),
            ));
        }
        if remediation.max_concurrent_records == 0 {
            return Err(AppError::Config(
                "max_concurrent_records must be greater than zero".into(),
            ));
        }

        if self.notifications.enabled && self.notifications.recipients.is_empty() {
            return Err(AppError::Config(
                "notifications.recipients must not be empty when notifications are enabled"
                    .into(),
            ));
        }

        if self.rescan_interval_seconds == 0 {
            return Err(AppError::Config(
                "rescan_interval_seconds must be greater than zero".into(),
            ));
        }

        Ok(())
    }
}

/// Load a single credential from OS keychain with env-var fallback.
async fn load_credential(keyring_key: &str, env_key: &str) -> Result<String> {
    let key = keyring_key.to_owned();

    // keyring is synchronous I/O.
    let keychain_result = tokio::task::spawn_blocking(move || {
        keyring::Entry::new(KEYRING_SERVICE, &key).and_then(|entry| entry.get_password())
    })
    .await
    .map_err(|err| AppError::Config(format!("keychain task panicked: {err}")))?;

    match keychain_result {
        Ok(value) if !value.is_empty() => return Ok(value),
        Ok(_) => {
            warn!(key = keyring_key, "keychain entry is empty, trying env var");
        }
        Err(err) => {
            warn!(
                key = keyring_key,
                ?err,
                "keychain lookup failed, trying env var"
            );
        }
    }

    match env::var(env_key) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(AppError::Config(format!(
            "credential {keyring_key} not found in keychain or {env_key} env var"
        ))),
    }
}
