//! Job status vocabulary and the job payload observed while polling.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// Status of a server-side job.
///
/// Parsing is case-insensitive: the search backend reports `COMPLETED`, the
/// AI service `completed`. Anything unrecognised is kept as `Other` and
/// treated as still in progress.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum JobStatus {
    Submitted,
    Pending,
    Processing,
    Running,
    Completed,
    Failed,
    Cancelled,
    Other(String),
}

impl JobStatus {
    /// True once the server will not change the status again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn is_success(&self) -> bool {
        matches!(self, JobStatus::Completed)
    }

    pub fn as_str(&self) -> &str {
        match self {
            JobStatus::Submitted => "SUBMITTED",
            JobStatus::Pending => "PENDING",
            JobStatus::Processing => "PROCESSING",
            JobStatus::Running => "RUNNING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
            JobStatus::Cancelled => "CANCELLED",
            JobStatus::Other(s) => s,
        }
    }
}

impl From<&str> for JobStatus {
    fn from(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "SUBMITTED" => JobStatus::Submitted,
            "PENDING" | "QUEUED" => JobStatus::Pending,
            "PROCESSING" => JobStatus::Processing,
            "RUNNING" | "IN_PROGRESS" => JobStatus::Running,
            "COMPLETED" => JobStatus::Completed,
            "FAILED" => JobStatus::Failed,
            "CANCELLED" | "CANCELED" => JobStatus::Cancelled,
            _ => JobStatus::Other(s.to_string()),
        }
    }
}

impl FromStr for JobStatus {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(JobStatus::from(s))
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl Serialize for JobStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for JobStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(JobStatus::from(raw.as_str()))
    }
}

/// A job as seen by the client.
///
/// The search backend identifies jobs by `correlationId`, the AI service by
/// `job_id`. Fields this struct does not name are kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    #[serde(
        rename = "correlationId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub correlation_id: Option<String>,
    #[serde(rename = "job_id", default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Job {
    /// A bare job with the given status, mostly useful in tests.
    pub fn with_status(status: JobStatus) -> Self {
        Self {
            correlation_id: None,
            job_id: None,
            status,
            message: None,
            error: None,
            data: None,
            extra: Map::new(),
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.correlation_id.as_deref().or(self.job_id.as_deref())
    }

    /// Why the job failed, in the job's own words.
    pub fn failure_message(&self) -> String {
        let non_empty = |m: &&str| !m.trim().is_empty();
        self.message
            .as_deref()
            .filter(non_empty)
            .or(self.error.as_deref().filter(non_empty))
            .unwrap_or("Unknown error")
            .to_string()
    }

    /// Looks a result field up in `data` first, then at the top level.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.data
            .as_ref()
            .and_then(|d| d.get(name))
            .or_else(|| self.extra.get(name))
    }
}
