//! Slack delivery of remediation reports.

pub mod blocks;
pub mod client;
pub mod notifier;
