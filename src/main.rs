#![forbid(unsafe_code)]

//! `vdi-remedy`: hung and ghost VDI session remediation binary.
//!
//! Loads configuration, discovers candidate sessions across the configured
//! management endpoints, drives each through the remediation ladder and
//! reports the outcome.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use vdi_remedy::audit::{AuditEntry, AuditEventType, AuditLogger, JsonlAuditWriter};
use vdi_remedy::clock::SystemClock;
use vdi_remedy::config::GlobalConfig;
use vdi_remedy::fleet::http::{BrokerClient, JobServiceClient};
use vdi_remedy::fleet::FleetQuery;
use vdi_remedy::notify::{LogNotifier, Notifier};
use vdi_remedy::remediation::discovery::{discover, Candidate, DiscoveryQuery, DiscoveryReport};
use vdi_remedy::remediation::dispatcher::ActionDispatcher;
use vdi_remedy::remediation::report::Reporter;
use vdi_remedy::remediation::runner::RemediationRunner;
use vdi_remedy::slack::client::SlackService;
use vdi_remedy::slack::notifier::SlackNotifier;
use vdi_remedy::{AppError, Result};

/// Upper bound on draining queued Slack messages at exit.
const SLACK_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "vdi-remedy", about = "Hung VDI session remediation", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Discover candidate sessions and print them without acting.
    Scan,

    /// Discover candidates, remediate them and send reports.
    Run {
        /// Rescan every `rescan_interval_seconds` until interrupted.
        #[arg(long)]
        watch: bool,
    },
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    let mut config = GlobalConfig::load_from_path(&args.config)?;
    config.load_credentials().await?;
    info!(endpoints = config.endpoints.len(), "configuration loaded");

    let broker = Arc::new(BrokerClient::new(&config.broker)?);

    match args.command {
        Command::Scan => {
            let report = scan(broker.as_ref(), &config).await;
            let json = serde_json::to_string_pretty(&report)
                .map_err(|err| AppError::Io(format!("failed to render scan result: {err}")))?;
            println!("{json}");
            Ok(())
        }
        Command::Run { watch } => remediate(&config, broker, watch).await,
    }
}

async fn scan(fleet: &dyn FleetQuery, config: &GlobalConfig) -> DiscoveryReport {
    let query = DiscoveryQuery {
        endpoints: &config.endpoints,
        group_pattern: &config.desktop_group_pattern,
        failure_reasons: &config.hung_failure_reasons,
    };
    discover(fleet, &query).await
}

async fn remediate(config: &GlobalConfig, broker: Arc<BrokerClient>, watch: bool) -> Result<()> {
    let jobs = Arc::new(JobServiceClient::new(&config.jobs)?);

    let audit: Option<Arc<dyn AuditLogger>> = match config.audit_log_dir {
        Some(ref dir) => Some(Arc::new(JsonlAuditWriter::new(dir.clone())?) as Arc<dyn AuditLogger>),
        None => None,
    };

    let (notifier, slack_worker): (Arc<dyn Notifier>, Option<JoinHandle<()>>) =
        if config.slack.enabled {
            let (service, worker) = SlackService::start(&config.slack)?;
            (
                Arc::new(SlackNotifier::new(Arc::new(service))) as Arc<dyn Notifier>,
                Some(worker),
            )
        } else {
            info!("slack not configured; reports are logged only");
            (Arc::new(LogNotifier) as Arc<dyn Notifier>, None)
        };

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received");
        signal_cancel.cancel();
    });

    {
        let mut dispatcher = ActionDispatcher::new(
            Arc::clone(&broker) as Arc<dyn FleetQuery>,
            broker.clone(),
            jobs,
            Arc::new(SystemClock),
            config.remediation_settings(),
        );
        if let Some(ref audit) = audit {
            dispatcher = dispatcher.with_audit(Arc::clone(audit));
        }
        let reporter = Reporter::new(notifier, config.notifications.clone());
        let runner = RemediationRunner::new(dispatcher, Some(reporter), cancel.clone());

        loop {
            let discovered = scan(broker.as_ref(), config).await;
            if let Some(ref audit) = audit {
                let entry = AuditEntry::new(AuditEventType::ScanCompleted).with_result(format!(
                    "{} candidate(s), {} endpoint(s) failed",
                    discovered.candidates.len(),
                    discovered.failed_endpoints.len()
                ));
                if let Err(err) = audit.log_entry(entry) {
                    warn!(%err, "failed to write audit entry");
                }
            }

            let records = discovered
                .candidates
                .into_iter()
                .map(Candidate::into_record)
                .collect::<Vec<_>>();
            let outcomes = runner.run(records).await;
            let restarted = outcomes
                .iter()
                .filter(|outcome| outcome.record.restart_issued())
                .count();
            let expired = outcomes.iter().filter(|outcome| outcome.budget_expired).count();
            let interrupted = outcomes.iter().filter(|outcome| outcome.cancelled).count();
            info!(
                records = outcomes.len(),
                restarted,
                budget_expired = expired,
                cancelled = interrupted,
                "remediation pass complete"
            );

            if !watch || cancel.is_cancelled() {
                break;
            }
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(config.rescan_interval()) => {}
            }
        }
    }

    // The runner (and its Slack sender) is dropped; let the queue drain.
    if let Some(worker) = slack_worker {
        if tokio::time::timeout(SLACK_DRAIN_TIMEOUT, worker).await.is_err() {
            warn!("slack queue did not drain before exit");
        }
    }

    info!("vdi-remedy finished");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter).with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
