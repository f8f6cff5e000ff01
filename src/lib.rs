#![forbid(unsafe_code)]

//! Hung and ghost VDI session diagnosis and remediation.

pub mod audit;
pub mod clock;
pub mod config;
pub mod errors;
pub mod fleet;
pub mod models;
pub mod notify;
pub mod remediation;
pub mod slack;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
