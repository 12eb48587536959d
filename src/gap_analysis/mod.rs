//! Research gap analysis on the AI service.
//!
//! The AI service answers with bare JSON instead of the `{data, message}`
//! envelope and does not take a bearer token.

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::info;
use reqwest::header::ACCEPT;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

use crate::error::ApiError;
use crate::http::{check_status, read_json};
use crate::job::{Backoff, CancelHandle, Job, JobPoller, JobSource, JobStatus};

const GAP_ANALYSIS_PATH: &str = "/api/v1/gap-analysis";

/// Five minutes at five-second intervals.
pub const RUN_MAX_ATTEMPTS: u32 = 60;
pub const RUN_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_RECENT_JOBS: u32 = 20;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GapAnalysisRequest {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_papers: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_threshold: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct ValidatedGap {
    pub gap_id: String,
    pub gap_title: String,
    pub description: String,
    pub category: String,
    pub potential_impact: String,
    pub suggested_approaches: Vec<String>,
    pub confidence_score: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct ExecutiveSummary {
    pub frontier_overview: String,
    pub key_insights: Vec<String>,
    pub research_priorities: Vec<String>,
}

/// Finished analysis. Sections this client does not model stay in `extra`.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct GapAnalysisResult {
    pub request_id: String,
    pub seed_paper_url: String,
    pub validated_gaps: Vec<ValidatedGap>,
    pub executive_summary: Option<ExecutiveSummary>,
    pub next_steps: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct ServiceHealth {
    pub status: String,
    pub service: String,
    pub version: String,
    pub running_jobs: u32,
    pub max_concurrent_jobs: u32,
    pub total_jobs: u32,
    pub features: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct ServiceInfo {
    pub service_name: String,
    pub description: String,
    pub new_features: Vec<String>,
    pub workflow: Map<String, Value>,
    pub supported_domains: Vec<String>,
    pub processing_phases: Vec<String>,
}

pub struct GapAnalysisApi {
    client: Client,
    ai_api_url: String,
    backoff: Backoff,
}

impl GapAnalysisApi {
    pub fn new(client: Client, ai_api_url: &str) -> Self {
        Self {
            client,
            ai_api_url: ai_api_url.trim_end_matches('/').to_string(),
            backoff: Backoff::Fixed(RUN_INTERVAL),
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    fn url(&self, suffix: &str) -> String {
        format!("{}{}{}", self.ai_api_url, GAP_ANALYSIS_PATH, suffix)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Response> {
        request
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| ApiError::transport(&e).into())
    }

    #[tracing::instrument(skip(self))]
    pub async fn submit(&self, request: &GapAnalysisRequest) -> Result<Job> {
        let response = self
            .send(self.client.post(self.url("/submit")).json(request))
            .await?;
        read_json(response, "Failed to submit gap analysis").await
    }

    #[tracing::instrument(skip(self))]
    pub async fn status(&self, job_id: &str) -> Result<Job> {
        let response = self
            .send(self.client.get(self.url(&format!("/status/{}", job_id))))
            .await?;
        read_json(response, "Failed to get job status").await
    }

    #[tracing::instrument(skip(self))]
    pub async fn result(&self, job_id: &str) -> Result<GapAnalysisResult> {
        let response = self
            .send(self.client.get(self.url(&format!("/result/{}", job_id))))
            .await?;
        read_json(response, "Failed to get job result").await
    }

    /// Most recent jobs first, at most `limit` of them.
    #[tracing::instrument(skip(self))]
    pub async fn recent_jobs(&self, limit: u32) -> Result<Vec<Job>> {
        let response = self
            .send(
                self.client
                    .get(self.url("/jobs"))
                    .query(&[("limit", limit)]),
            )
            .await?;
        read_json(response, "Failed to list recent jobs").await
    }

    #[tracing::instrument(skip(self))]
    pub async fn health(&self) -> Result<ServiceHealth> {
        let response = self.send(self.client.get(self.url("/health"))).await?;
        read_json(response, "Failed to get health status").await
    }

    #[tracing::instrument(skip(self))]
    pub async fn info(&self) -> Result<ServiceInfo> {
        let response = self.send(self.client.get(self.url("/info"))).await?;
        read_json(response, "Failed to get service info").await
    }

    /// Asks the service to stop a job; returns its reply verbatim.
    #[tracing::instrument(skip(self))]
    pub async fn cancel(&self, job_id: &str) -> Result<String> {
        let response = self
            .send(self.client.delete(self.url(&format!("/job/{}", job_id))))
            .await?;
        check_status(response, "Failed to cancel job")
            .await?
            .text()
            .await
            .map_err(|e| ApiError::transport(&e).into())
    }

    /// Submits, waits for completion, then fetches the result.
    ///
    /// A status request that fails spends one of the attempts instead of
    /// ending the run.
    pub async fn run<F>(
        &self,
        request: &GapAnalysisRequest,
        mut on_progress: F,
        cancel: &CancelHandle,
    ) -> Result<GapAnalysisResult>
    where
        F: FnMut(u32, &JobStatus),
    {
        let job = self.submit(request).await?;
        on_progress(0, &job.status);

        let job_id = job
            .id()
            .ok_or_else(|| ApiError::InvalidResponse("submit response has no job_id".to_string()))?
            .to_string();
        info!("Gap analysis job {} submitted", job_id);

        JobPoller::new(self, self.backoff)
            .tolerating_fetch_errors()
            .poll_until_complete_with_cancel(&job_id, RUN_MAX_ATTEMPTS, on_progress, cancel)
            .await?;

        self.result(&job_id)
            .await
            .with_context(|| format!("Job {} completed but its result is unavailable", job_id))
    }
}

#[async_trait]
impl JobSource for GapAnalysisApi {
    async fn fetch_job(&self, job_id: &str) -> Result<Job> {
        self.status(job_id).await
    }
}
