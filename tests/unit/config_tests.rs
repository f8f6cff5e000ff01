use std::path::PathBuf;
use std::time::Duration;

use vdi_remedy::{config::GlobalConfig, AppError};

fn sample_toml() -> String {
    r#"
endpoints = ["broker01.corp.example", "broker02.corp.example"]
desktop_group_pattern = "VDI-*"
hung_failure_reasons = ["SessionPreparation", "RegistrationTimeout"]
audit_log_dir = "/var/log/vdi-remedy"
rescan_interval_seconds = 600

[broker]
scheme = "http"
base_path = "/broker/api"
request_timeout_seconds = 10

[jobs]
service_url = "https://jobs.corp.example"
diagnostic_command = "qwinsta"
request_timeout_seconds = 20

[remediation]
poll_interval_seconds = 10
job_timeout_seconds = 120
receive_timeout_seconds = 60
record_budget_seconds = 600
max_concurrent_records = 8
restart_on_shutdown = true

[notifications]
enabled = true
skip_self_corrected = false
recipients = ["C0VDIOPS"]
field_delimiter = " | "

[slack]
enabled = true
"#
    .to_owned()
}

fn minimal_toml() -> String {
    r#"
endpoints = ["broker01.corp.example"]

[jobs]
service_url = "https://jobs.corp.example"

[notifications]
recipients = ["C0VDIOPS"]
"#
    .to_owned()
}

fn expect_config_error(raw: &str, fragment: &str) {
    let result = GlobalConfig::from_toml_str(raw);
    match result {
        Err(AppError::Config(msg)) => assert!(
            msg.contains(fragment),
            "expected '{fragment}' in error, got '{msg}'"
        ),
        other => panic!("expected config error, got {other:?}"),
    }
}

#[test]
fn parses_full_config() {
    let config = GlobalConfig::from_toml_str(&sample_toml()).expect("config parses");

    assert_eq!(config.endpoints.len(), 2);
    assert_eq!(config.desktop_group_pattern, "VDI-*");
    assert_eq!(
        config.hung_failure_reasons,
        vec!["SessionPreparation", "RegistrationTimeout"]
    );
    assert_eq!(
        config.audit_log_dir,
        Some(PathBuf::from("/var/log/vdi-remedy"))
    );
    assert_eq!(config.broker.scheme, "http");
    assert_eq!(config.broker.base_path, "/broker/api");
    assert_eq!(config.broker.request_timeout_seconds, 10);
    assert_eq!(config.jobs.diagnostic_command, "qwinsta");
    assert_eq!(config.jobs.request_timeout_seconds, 20);
    assert_eq!(config.remediation.max_concurrent_records, 8);
    assert!(config.remediation.restart_on_shutdown);
    assert!(!config.notifications.skip_self_corrected);
    assert_eq!(config.notifications.field_delimiter, " | ");
    assert!(config.slack.enabled);
}

#[test]
fn minimal_config_applies_defaults() {
    let config = GlobalConfig::from_toml_str(&minimal_toml()).expect("config parses");

    assert_eq!(config.desktop_group_pattern, "*");
    assert_eq!(
        config.hung_failure_reasons,
        vec![
            "SessionPreparation",
            "RegistrationTimeout",
            "ConnectionRefused"
        ]
    );
    assert!(config.audit_log_dir.is_none());
    assert_eq!(config.rescan_interval_seconds, 900);
    assert_eq!(config.broker.scheme, "https");
    assert_eq!(config.broker.base_path, "/api/v1");
    assert_eq!(config.broker.request_timeout_seconds, 30);
    assert_eq!(config.jobs.diagnostic_command, "tasklist /v /fo csv");
    assert_eq!(config.jobs.request_timeout_seconds, 30);
    assert_eq!(config.remediation.poll_interval_seconds, 15);
    assert_eq!(config.remediation.job_timeout_seconds, 300);
    assert_eq!(config.remediation.receive_timeout_seconds, 120);
    assert_eq!(config.remediation.record_budget_seconds, 900);
    assert_eq!(config.remediation.max_concurrent_records, 16);
    assert!(!config.remediation.restart_on_shutdown);
    assert!(config.notifications.enabled);
    assert!(config.notifications.skip_self_corrected);
    assert_eq!(config.notifications.field_delimiter, "; ");
    assert!(!config.slack.enabled);
}

#[test]
fn tokens_are_never_read_from_file() {
    let raw = format!("{}\n[broker]\ntoken = \"leaked\"\n", minimal_toml());
    let config = GlobalConfig::from_toml_str(&raw).expect("config parses");
    assert!(config.broker.token.is_empty());
}

#[test]
fn remediation_settings_convert_to_durations() {
    let config = GlobalConfig::from_toml_str(&sample_toml()).expect("config parses");
    let settings = config.remediation_settings();

    assert_eq!(settings.poll_interval, Duration::from_secs(10));
    assert_eq!(settings.job_timeout, Duration::from_secs(120));
    assert_eq!(settings.receive_timeout, Duration::from_secs(60));
    assert_eq!(settings.record_budget, Duration::from_secs(600));
    assert_eq!(settings.max_concurrent_records, 8);
    assert!(settings.restart_on_shutdown);
    assert_eq!(settings.diagnostic_command, "qwinsta");
    assert_eq!(settings.hung_failure_reasons, config.hung_failure_reasons);
    assert_eq!(config.rescan_interval(), Duration::from_secs(600));
}

#[test]
fn load_from_path_reads_file() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("config.toml");
    std::fs::write(&path, minimal_toml()).expect("write config");

    let config = GlobalConfig::load_from_path(&path).expect("config loads");
    assert_eq!(config.endpoints, vec!["broker01.corp.example"]);
}

#[test]
fn load_from_missing_path_is_config_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    let result = GlobalConfig::load_from_path(temp.path().join("absent.toml"));
    assert!(matches!(result, Err(AppError::Config(msg)) if msg.contains("failed to read config")));
}

#[test]
fn invalid_toml_is_config_error() {
    expect_config_error("endpoints = [", "invalid config");
}

#[test]
fn missing_jobs_table_is_rejected() {
    expect_config_error(
        "endpoints = [\"b\"]\n[notifications]\nrecipients = [\"C1\"]\n",
        "invalid config",
    );
}

#[test]
fn empty_endpoints_are_rejected() {
    let raw = minimal_toml().replace("[\"broker01.corp.example\"]", "[]");
    expect_config_error(&raw, "endpoints must not be empty");
}

#[test]
fn empty_failure_reasons_are_rejected() {
    let raw = format!("hung_failure_reasons = []\n{}", minimal_toml());
    expect_config_error(&raw, "hung_failure_reasons must not be empty");
}

#[test]
fn invalid_group_pattern_is_rejected() {
    let raw = format!("desktop_group_pattern = \"VDI-[\"\n{}", minimal_toml());
    expect_config_error(&raw, "desktop_group_pattern invalid");
}

#[test]
fn zero_poll_interval_is_rejected() {
    let raw = format!("{}\n[remediation]\npoll_interval_seconds = 0\n", minimal_toml());
    expect_config_error(&raw, "poll_interval_seconds must be greater than zero");
}

#[test]
fn zero_budget_is_rejected() {
    let raw = format!("{}\n[remediation]\nrecord_budget_seconds = 0\n", minimal_toml());
    expect_config_error(&raw, "record_budget_seconds must be greater than zero");
}

#[test]
fn poll_interval_longer_than_budget_is_rejected() {
    let raw = format!(
        "{}\n[remediation]\npoll_interval_seconds = 60\nrecord_budget_seconds = 30\n",
        minimal_toml()
    );
    expect_config_error(&raw, "must not exceed record_budget_seconds");
}

#[test]
fn zero_job_request_timeout_is_rejected() {
    let raw = minimal_toml().replace(
        "service_url = \"https://jobs.corp.example\"",
        "service_url = \"https://jobs.corp.example\"\nrequest_timeout_seconds = 0",
    );
    expect_config_error(&raw, "request_timeout_seconds must be greater than zero");
}

#[test]
fn zero_concurrency_is_rejected() {
    let raw = format!("{}\n[remediation]\nmax_concurrent_records = 0\n", minimal_toml());
    expect_config_error(&raw, "max_concurrent_records must be greater than zero");
}

#[test]
fn enabled_notifications_need_recipients() {
    let raw = minimal_toml().replace("recipients = [\"C0VDIOPS\"]", "recipients = []");
    expect_config_error(&raw, "notifications.recipients must not be empty");
}

#[test]
fn disabled_notifications_need_no_recipients() {
    let raw = minimal_toml().replace("recipients = [\"C0VDIOPS\"]", "enabled = false");
    let config = GlobalConfig::from_toml_str(&raw).expect("config parses");
    assert!(!config.notifications.enabled);
    assert!(config.notifications.recipients.is_empty());
}

#[test]
fn zero_rescan_interval_is_rejected() {
    let raw = format!("rescan_interval_seconds = 0\n{}", minimal_toml());
    expect_config_error(&raw, "rescan_interval_seconds must be greater than zero");
}
