//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Broker (fleet-management) API failure other than a missing object.
    Fleet(String),
    /// Remote job-execution service failure.
    Job(String),
    /// Messaging gateway failure.
    Notify(String),
    /// Requested remote object (session, machine, job) does not exist.
    NotFound(String),
    /// A bounded wait on a remote operation elapsed.
    Timeout(String),
    /// Audit trail write failure.
    Audit(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl AppError {
    /// Whether this error reports a remote object that no longer exists.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Fleet(msg) => write!(f, "fleet: {msg}"),
            Self::Job(msg) => write!(f, "job: {msg}"),
            Self::Notify(msg) => write!(f, "notify: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::Timeout(msg) => write!(f, "timeout: {msg}"),
            Self::Audit(msg) => write!(f, "audit: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else {
            Self::Fleet(err.to_string())
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
