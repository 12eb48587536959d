//! Web search jobs on the core API.

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::ApiError;
use crate::http::{AuthenticatedClient, read_data};
use crate::job::{Backoff, CancelHandle, Job, JobPoller, JobSource, JobStatus};

pub const WEBSEARCH_PATH: &str = "/api/v1/websearch";

/// Parameters of a new search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebSearchRequest {
    pub project_id: String,
    pub domain: String,
    pub query_terms: Vec<String>,
    pub batch_size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Initiated {
    correlation_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct Author {
    pub name: String,
    pub affiliation: Option<String>,
}

/// A paper returned by a completed search.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Paper {
    pub id: Option<String>,
    pub title: String,
    pub doi: Option<String>,
    pub publication_date: Option<String>,
    pub venue: Option<String>,
    pub authors: Vec<Author>,
    pub citation_count: Option<u64>,
    pub paper_url: Option<String>,
}

pub struct WebSearchApi {
    client: Arc<AuthenticatedClient>,
    api_url: String,
    backoff: Backoff,
}

impl WebSearchApi {
    pub fn new(client: Arc<AuthenticatedClient>, api_url: &str) -> Self {
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            backoff: Backoff::default(),
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    fn url(&self, suffix: &str) -> String {
        format!("{}{}{}", self.api_url, WEBSEARCH_PATH, suffix)
    }

    /// Starts a search and returns its correlation id.
    #[tracing::instrument(skip(self))]
    pub async fn initiate(&self, request: &WebSearchRequest) -> Result<String> {
        let response = self.client.post_json(&self.url(""), request).await?;
        let initiated: Initiated = read_data(response, "Failed to initiate web search").await?;
        debug!("Search started with correlation id {}", initiated.correlation_id);
        Ok(initiated.correlation_id)
    }

    /// Current state of a search.
    #[tracing::instrument(skip(self))]
    pub async fn poll_results(&self, correlation_id: &str) -> Result<Job> {
        let response = self
            .client
            .get(&self.url(&format!("/{}", correlation_id)))
            .await?;
        read_data(response, "Failed to get search results").await
    }

    /// Polls a search with linear backoff until it completes.
    pub async fn poll_until_complete<F>(
        &self,
        correlation_id: &str,
        max_attempts: u32,
        on_progress: F,
        cancel: &CancelHandle,
    ) -> Result<Job>
    where
        F: FnMut(u32, &JobStatus),
    {
        JobPoller::new(self, self.backoff)
            .poll_until_complete_with_cancel(correlation_id, max_attempts, on_progress, cancel)
            .await
    }

    /// All searches of the signed-in user.
    #[tracing::instrument(skip(self))]
    pub async fn history(&self) -> Result<Vec<Job>> {
        let response = self.client.get(&self.url("")).await?;
        read_data(response, "Failed to get search history").await
    }

    /// True when the search service reports itself `UP`. Never fails.
    pub async fn health(&self) -> bool {
        #[derive(Deserialize)]
        struct Health {
            status: String,
        }

        let response = match self.client.inner().get(self.url("/health")).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!("Web search health check error: {}", e);
                return false;
            }
        };
        match read_data::<Health>(response, "Health check failed").await {
            Ok(health) => health.status == "UP",
            Err(e) => {
                warn!("Web search health check error: {:#}", e);
                false
            }
        }
    }
}

#[async_trait]
impl JobSource for WebSearchApi {
    async fn fetch_job(&self, job_id: &str) -> Result<Job> {
        self.poll_results(job_id).await
    }
}

/// Papers found by a completed search; empty when the job carries none.
pub fn papers(job: &Job) -> Result<Vec<Paper>> {
    let Some(value) = job.field("papers") else {
        return Ok(Vec::new());
    };
    if value.is_null() {
        return Ok(Vec::new());
    }
    serde_json::from_value(value.clone())
        .map_err(|e| ApiError::InvalidResponse(format!("malformed papers: {}", e)))
        .context("Failed to read search results")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::find_api_error;
    use crate::session::{MemorySession, SessionStore};
    use mockito::{Matcher, Server};
    use serde_json::json;
    use std::time::Duration;

    fn api(server_url: &str) -> WebSearchApi {
        let session = Arc::new(MemorySession::new());
        session.set_token("tok").unwrap();
        let client = Arc::new(AuthenticatedClient::new(
            reqwest::Client::new(),
            session,
            server_url,
        ));
        WebSearchApi::new(client, server_url).with_backoff(Backoff::Fixed(Duration::from_millis(1)))
    }

    fn request() -> WebSearchRequest {
        WebSearchRequest {
            project_id: "p-1".to_string(),
            domain: "Computer Science".to_string(),
            query_terms: vec!["transformers".to_string(), "attention".to_string()],
            batch_size: 10,
        }
    }

    #[tokio::test]
    async fn test_initiate_returns_correlation_id() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", WEBSEARCH_PATH)
            .match_header("authorization", "Bearer tok")
            .match_body(Matcher::Json(json!({
                "projectId": "p-1",
                "domain": "Computer Science",
                "queryTerms": ["transformers", "attention"],
                "batchSize": 10
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"data": {"correlationId": "c-1", "status": "SUBMITTED"}}"#)
            .create_async()
            .await;

        let id = api(&server.url()).initiate(&request()).await.unwrap();

        mock.assert_async().await;
        assert_eq!(id, "c-1");
    }

    #[tokio::test]
    async fn test_initiate_error_message() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", WEBSEARCH_PATH)
            .with_status(400)
            .with_header("content-type", "application/json")
            .with_body(r#"{"message": "Query terms required"}"#)
            .create_async()
            .await;

        let err = api(&server.url()).initiate(&request()).await.unwrap_err();
        assert_eq!(
            find_api_error(&err),
            Some(&ApiError::Application {
                status: 400,
                message: "Query terms required".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_poll_until_complete_returns_papers() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/websearch/c-2")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "data": {
                        "correlationId": "c-2",
                        "status": "COMPLETED",
                        "papers": [
                            {"title": "Attention Is All You Need", "citationCount": 100000,
                             "authors": [{"name": "Vaswani"}]}
                        ]
                    }
                })
                .to_string(),
            )
            .expect(1)
            .create_async()
            .await;

        let mut progress = Vec::new();
        let job = api(&server.url())
            .poll_until_complete("c-2", 30, |n, s| progress.push((n, s.clone())), &CancelHandle::new())
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(progress, vec![(1, JobStatus::Completed)]);
        assert_eq!(job.id(), Some("c-2"));
        let papers = papers(&job).unwrap();
        assert_eq!(papers.len(), 1);
        assert_eq!(papers[0].title, "Attention Is All You Need");
        assert_eq!(papers[0].authors[0].name, "Vaswani");
        assert_eq!(papers[0].citation_count, Some(100000));
    }

    #[tokio::test]
    async fn test_poll_until_complete_failed_search() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/api/v1/websearch/c-3")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"data": {"status": "FAILED", "message": "Semantic Scholar down"}}"#)
            .expect(1)
            .create_async()
            .await;

        let err = api(&server.url())
            .poll_until_complete("c-3", 30, |_, _| {}, &CancelHandle::new())
            .await
            .unwrap_err();
        assert_eq!(
            find_api_error(&err),
            Some(&ApiError::JobFailed("Semantic Scholar down".to_string()))
        );
    }

    #[tokio::test]
    async fn test_poll_until_complete_times_out() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/websearch/c-4")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"data": {"status": "PROCESSING"}}"#)
            .expect(3)
            .create_async()
            .await;

        let err = api(&server.url())
            .poll_until_complete("c-4", 3, |_, _| {}, &CancelHandle::new())
            .await
            .unwrap_err();

        mock.assert_async().await;
        assert_eq!(
            find_api_error(&err),
            Some(&ApiError::Timeout { attempts: 3 })
        );
    }

    #[tokio::test]
    async fn test_history() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", WEBSEARCH_PATH)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"data": [
                    {"correlationId": "a", "status": "COMPLETED"},
                    {"correlationId": "b", "status": "PROCESSING"}
                ]}"#,
            )
            .create_async()
            .await;

        let history = api(&server.url()).history().await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].status, JobStatus::Processing);
    }

    #[tokio::test]
    async fn test_health() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/api/v1/websearch/health")
            .match_header("authorization", Matcher::Missing)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"data": {"status": "UP"}}"#)
            .create_async()
            .await;

        assert!(api(&server.url()).health().await);
    }

    #[tokio::test]
    async fn test_health_down_or_unreachable() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/api/v1/websearch/health")
            .with_status(503)
            .create_async()
            .await;

        assert!(!api(&server.url()).health().await);
        assert!(!api("http://127.0.0.1:1").health().await);
    }

    #[test]
    fn test_papers_missing_is_empty() {
        let job = Job::with_status(JobStatus::Completed);
        assert!(papers(&job).unwrap().is_empty());
    }
}
