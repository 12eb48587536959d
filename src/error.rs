//! Error taxonomy shared by the API clients.
//!
//! Operations return `anyhow::Result`; the variants below travel inside the
//! `anyhow::Error` and callers classify them with
//! `err.downcast_ref::<ApiError>()`.

use reqwest::StatusCode;

/// Message shown when the backend cannot be reached at all.
pub const CANNOT_CONNECT: &str = "Cannot connect to server. Please check if the backend is running.";

/// Errors the client utilities distinguish between.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// No HTTP response was obtained (connection refused, DNS, TLS...)
    Transport(String),
    /// HTTP 401 that survived (or could not attempt) a token refresh
    Unauthorized(String),
    /// Any other non-2xx response carrying a message
    Application { status: u16, message: String },
    /// A 2xx response whose body did not have the expected shape
    InvalidResponse(String),
    /// The job itself reported a terminal failure
    JobFailed(String),
    /// The attempt budget ran out before the job reached a terminal status
    Timeout { attempts: u32 },
    /// Polling was abandoned through a cancel handle
    Cancelled,
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::Transport(msg) => write!(f, "{} ({})", CANNOT_CONNECT, msg),
            ApiError::Unauthorized(msg) => {
                write!(f, "Authentication required: {}. Please log in again.", msg)
            }
            ApiError::Application { status, message } => {
                write!(f, "{} (HTTP {})", message, status)
            }
            ApiError::InvalidResponse(msg) => write!(f, "Unexpected response: {}", msg),
            ApiError::JobFailed(msg) => write!(f, "Job failed: {}", msg),
            ApiError::Timeout { attempts } => {
                write!(f, "Job timed out after {} attempts - taking too long", attempts)
            }
            ApiError::Cancelled => write!(f, "Polling cancelled"),
        }
    }
}

impl std::error::Error for ApiError {}

impl ApiError {
    /// Builds the error for a non-2xx status.
    pub fn from_status(status: StatusCode, message: impl Into<String>) -> Self {
        let message = message.into();
        if status == StatusCode::UNAUTHORIZED {
            ApiError::Unauthorized(message)
        } else {
            ApiError::Application {
                status: status.as_u16(),
                message,
            }
        }
    }

    /// Maps a reqwest send failure into the transport variant.
    pub fn transport(error: &reqwest::Error) -> Self {
        ApiError::Transport(error.to_string())
    }

    /// The message a user should see, without the decoration added by `Display`.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Transport(_) => CANNOT_CONNECT.to_string(),
            ApiError::Unauthorized(msg) | ApiError::InvalidResponse(msg) => msg.clone(),
            ApiError::Application { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Looks for an `ApiError` anywhere in an anyhow error chain.
pub fn find_api_error(error: &anyhow::Error) -> Option<&ApiError> {
    error.chain().find_map(|cause| cause.downcast_ref::<ApiError>())
}
