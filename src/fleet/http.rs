//! `reqwest` adapters for the broker REST API and the job service.
//!
//! One pooled [`reqwest::Client`] is shared by every record; connections
//! to each management endpoint are reused across sessions.

use std::time::Duration;

use reqwest::{Client, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{BoxFuture, FleetQuery, JobRunner, PowerControl};
use crate::config::{BrokerConfig, JobsConfig};
use crate::models::fleet::{ActionHandle, JobHandle, JobSnapshot, MachineInfo, SessionInfo};
use crate::{AppError, Result};

/// Broker management API client.
#[derive(Debug, Clone)]
pub struct BrokerClient {
    http: Client,
    scheme: String,
    base_path: String,
    token: String,
}

#[derive(Debug, Serialize)]
struct PowerActionRequest<'a> {
    action: &'a str,
}

#[derive(Debug, Deserialize)]
struct PowerActionResponse {
    action_id: String,
}

#[derive(Debug, Deserialize)]
struct MachineList {
    #[serde(default)]
    machines: Vec<MachineInfo>,
}

impl BrokerClient {
    /// Build a client from the `[broker]` configuration.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the HTTP client cannot be built.
    pub fn new(config: &BrokerConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|err| AppError::Config(format!("failed to build broker client: {err}")))?;
        Ok(Self {
            http,
            scheme: config.scheme.clone(),
            base_path: config.base_path.trim_end_matches('/').to_owned(),
            token: config.token.clone(),
        })
    }

    fn url(&self, endpoint: &str, path: &str) -> Result<Url> {
        let raw = format!("{}://{}{}{}", self.scheme, endpoint, self.base_path, path);
        Url::parse(&raw).map_err(|err| AppError::Fleet(format!("invalid url {raw}: {err}")))
    }

    async fn get(&self, url: Url) -> Result<Response> {
        debug!(%url, "broker request");
        Ok(self.http.get(url).bearer_auth(&self.token).send().await?)
    }
}

/// Map a non-success status to an error, keeping 404 distinguishable.
async fn check_status(response: Response, what: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::NOT_FOUND {
        return Err(AppError::NotFound(what.to_owned()));
    }
    let body = response.text().await.unwrap_or_default();
    Err(AppError::Fleet(format!("{what}: http {status}: {body}")))
}

impl FleetQuery for BrokerClient {
    fn get_session<'a>(
        &'a self,
        endpoint: &'a str,
        session_id: &'a str,
    ) -> BoxFuture<'a, SessionInfo> {
        Box::pin(async move {
            let url = self.url(endpoint, &format!("/sessions/{session_id}"))?;
            let response = check_status(self.get(url).await?, &format!("session {session_id}"))
                .await?;
            Ok(response.json::<SessionInfo>().await?)
        })
    }

    fn get_machine<'a>(
        &'a self,
        endpoint: &'a str,
        session_id: &'a str,
    ) -> BoxFuture<'a, Option<MachineInfo>> {
        Box::pin(async move {
            let url = self.url(endpoint, &format!("/sessions/{session_id}/machine"))?;
            match check_status(self.get(url).await?, &format!("machine for {session_id}")).await {
                Ok(response) => Ok(Some(response.json::<MachineInfo>().await?)),
                Err(AppError::NotFound(_)) => Ok(None),
                Err(err) => Err(err),
            }
        })
    }

    fn find_candidate_machines<'a>(
        &'a self,
        endpoint: &'a str,
        group_pattern: &'a str,
        failure_reasons: &'a [String],
    ) -> BoxFuture<'a, Vec<MachineInfo>> {
        Box::pin(async move {
            let mut url = self.url(endpoint, "/machines")?;
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("desktop_group", group_pattern);
                query.append_pair("session_support", "single");
                for reason in failure_reasons {
                    query.append_pair("failure_reason", reason);
                }
            }
            let response = check_status(self.get(url).await?, "machine list").await?;
            Ok(response.json::<MachineList>().await?.machines)
        })
    }
}

impl PowerControl for BrokerClient {
    fn reset<'a>(&'a self, endpoint: &'a str, machine_id: &'a str) -> BoxFuture<'a, ActionHandle> {
        Box::pin(async move {
            let url = self.url(endpoint, &format!("/machines/{machine_id}/power"))?;
            debug!(%url, "broker power action");
            let response = self
                .http
                .post(url)
                .bearer_auth(&self.token)
                .json(&PowerActionRequest { action: "reset" })
                .send()
                .await?;
            let response = check_status(response, &format!("machine {machine_id}")).await?;
            let body = response.json::<PowerActionResponse>().await?;
            Ok(ActionHandle(body.action_id))
        })
    }
}

/// Remote job-execution service client.
#[derive(Debug, Clone)]
pub struct JobServiceClient {
    http: Client,
    service_url: String,
    token: String,
    request_timeout: Duration,
}

#[derive(Debug, Serialize)]
struct SubmitJobRequest<'a> {
    host: &'a str,
    command: &'a str,
}

#[derive(Debug, Deserialize)]
struct SubmitJobResponse {
    job_id: String,
}

#[derive(Debug, Deserialize)]
struct JobOutputResponse {
    #[serde(default)]
    output: String,
}

impl JobServiceClient {
    /// Build a client from the `[jobs]` configuration.
    ///
    /// Submit and poll requests carry `request_timeout_seconds`. Output
    /// collection may block on the job, so it has no request timeout here
    /// and is bounded by the caller's receive timeout.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the HTTP client cannot be built.
    pub fn new(config: &JobsConfig) -> Result<Self> {
        let http = Client::builder()
            .build()
            .map_err(|err| AppError::Config(format!("failed to build job client: {err}")))?;
        Ok(Self {
            http,
            service_url: config.service_url.trim_end_matches('/').to_owned(),
            token: config.token.clone(),
            request_timeout: Duration::from_secs(config.request_timeout_seconds),
        })
    }

    fn url(&self, path: &str) -> Result<Url> {
        let raw = format!("{}{}", self.service_url, path);
        Url::parse(&raw).map_err(|err| AppError::Job(format!("invalid url {raw}: {err}")))
    }
}

fn job_error(err: AppError) -> AppError {
    match err {
        AppError::Fleet(msg) => AppError::Job(msg),
        other => other,
    }
}

impl JobRunner for JobServiceClient {
    fn submit<'a>(&'a self, host_name: &'a str, payload: &'a str) -> BoxFuture<'a, JobHandle> {
        Box::pin(async move {
            let url = self.url("/jobs")?;
            let response = self
                .http
                .post(url)
                .bearer_auth(&self.token)
                .timeout(self.request_timeout)
                .json(&SubmitJobRequest {
                    host: host_name,
                    command: payload,
                })
                .send()
                .await
                .map_err(|err| job_error(err.into()))?;
            let response = check_status(response, &format!("job submit to {host_name}"))
                .await
                .map_err(job_error)?;
            let body = response
                .json::<SubmitJobResponse>()
                .await
                .map_err(|err| job_error(err.into()))?;
            Ok(JobHandle(body.job_id))
        })
    }

    fn poll<'a>(&'a self, handle: &'a JobHandle) -> BoxFuture<'a, JobSnapshot> {
        Box::pin(async move {
            let url = self.url(&format!("/jobs/{}", handle.0))?;
            let response = self
                .http
                .get(url)
                .bearer_auth(&self.token)
                .timeout(self.request_timeout)
                .send()
                .await
                .map_err(|err| job_error(err.into()))?;
            let response = check_status(response, &format!("job {}", handle.0))
                .await
                .map_err(job_error)?;
            response
                .json::<JobSnapshot>()
                .await
                .map_err(|err| job_error(err.into()))
        })
    }

    fn collect_output<'a>(&'a self, handle: &'a JobHandle, wait: bool) -> BoxFuture<'a, String> {
        Box::pin(async move {
            let mut url = self.url(&format!("/jobs/{}/output", handle.0))?;
            url.query_pairs_mut()
                .append_pair("wait", if wait { "true" } else { "false" });
            let response = self
                .http
                .get(url)
                .bearer_auth(&self.token)
                .send()
                .await
                .map_err(|err| job_error(err.into()))?;
            let response = check_status(response, &format!("job {} output", handle.0))
                .await
                .map_err(job_error)?;
            let body = response
                .json::<JobOutputResponse>()
                .await
                .map_err(|err| job_error(err.into()))?;
            Ok(body.output)
        })
    }
}
