//! Hung-session remediation core.
//!
//! Covers candidate discovery, the per-record refresh/decide/act cycle,
//! the concurrent remediation loop, and final reporting.

pub mod decision;
pub mod discovery;
pub mod dispatcher;
pub mod refresh;
pub mod report;
pub mod runner;
