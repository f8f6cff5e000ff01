//! Candidate discovery across management endpoints.
//!
//! Every endpoint is queried concurrently. An endpoint that cannot be
//! queried is logged and skipped so one unreachable broker never hides
//! the candidates of the others.

use std::collections::HashSet;

use futures_util::future::join_all;
use serde::Serialize;
use tracing::{info, info_span, warn, Instrument};

use crate::fleet::FleetQuery;
use crate::models::fleet::MachineInfo;
use crate::models::record::DiagnosticRecord;

/// Scan parameters.
#[derive(Debug, Clone)]
pub struct DiscoveryQuery<'a> {
    /// Management endpoints to scan.
    pub endpoints: &'a [String],
    /// Glob pattern matched against the desktop group name.
    pub group_pattern: &'a str,
    /// Failure reasons treated as the hung signature.
    pub failure_reasons: &'a [String],
}

/// A session that matched the hung signature.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Candidate {
    /// Endpoint that reported the session.
    pub admin_address: String,
    /// Session identifier.
    pub session_id: String,
    /// Machine record at discovery time.
    pub machine: MachineInfo,
}

impl Candidate {
    /// Start tracking this candidate.
    #[must_use]
    pub fn into_record(self) -> DiagnosticRecord {
        DiagnosticRecord::new(self.admin_address, self.session_id)
    }
}

/// Result of a scan: candidates plus the endpoints that could not be read.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DiscoveryReport {
    /// Sessions that matched the hung signature.
    pub candidates: Vec<Candidate>,
    /// Endpoints skipped because their query failed.
    pub failed_endpoints: Vec<String>,
}

/// Query every endpoint and return the matching sessions.
///
/// Never fails as a whole: endpoint errors are logged and recorded in
/// [`DiscoveryReport::failed_endpoints`].
pub async fn discover(fleet: &dyn FleetQuery, query: &DiscoveryQuery<'_>) -> DiscoveryReport {
    let matcher = match glob::Pattern::new(query.group_pattern) {
        Ok(pattern) => Some(pattern),
        Err(err) => {
            warn!(pattern = query.group_pattern, %err, "invalid group pattern, matching all groups");
            None
        }
    };

    let scans = query.endpoints.iter().map(|endpoint| {
        let span = info_span!("discover", endpoint = endpoint.as_str());
        async move {
            let result = fleet
                .find_candidate_machines(endpoint, query.group_pattern, query.failure_reasons)
                .await;
            (endpoint, result)
        }
        .instrument(span)
    });

    let mut report = DiscoveryReport::default();
    let mut seen: HashSet<(String, String)> = HashSet::new();

    for (endpoint, result) in join_all(scans).await {
        let machines = match result {
            Ok(machines) => machines,
            Err(err) => {
                warn!(endpoint = endpoint.as_str(), %err, "candidate query failed; skipping endpoint");
                report.failed_endpoints.push(endpoint.clone());
                continue;
            }
        };

        for machine in machines {
            if !machine.looks_hung(query.failure_reasons) {
                continue;
            }
            if matcher
                .as_ref()
                .is_some_and(|pattern| !pattern.matches(&machine.desktop_group))
            {
                continue;
            }
            let Some(session_id) = machine.session_id.clone() else {
                warn!(endpoint = endpoint.as_str(), machine_id = %machine.machine_id, "hung machine reports no session id");
                continue;
            };
            if !seen.insert((endpoint.clone(), session_id.clone())) {
                continue;
            }
            report.candidates.push(Candidate {
                admin_address: endpoint.clone(),
                session_id,
                machine,
            });
        }
    }

    info!(
        candidates = report.candidates.len(),
        failed_endpoints = report.failed_endpoints.len(),
        "discovery complete"
    );
    report
}
