use crate::error::{ApiError, CANNOT_CONNECT, find_api_error};

mod account;
pub mod config;
mod gap;
mod profile;
mod search;
pub mod services;

pub use account::{forgot_password, login, logout, register, reset_password, whoami};
pub use gap::{gap_analysis, gap_health, gap_info, gap_jobs};
pub use profile::{delete_profile_image, show_account, update_account, upload_profile_image};
pub use search::{SearchArgs, health, history, search, search_status};

/// One line telling the user what went wrong, distinct per failure kind.
pub fn describe_error(err: &anyhow::Error) -> String {
    match find_api_error(err) {
        Some(ApiError::Transport(_)) => CANNOT_CONNECT.to_string(),
        Some(ApiError::Unauthorized(_)) => {
            "Your session has expired. Please run `scholarai login` again.".to_string()
        }
        Some(ApiError::Cancelled) => "Cancelled.".to_string(),
        Some(api_error) => api_error.to_string(),
        None => format!("{:#}", err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, anyhow};

    #[test]
    fn test_describe_error_per_kind() {
        let transport: anyhow::Error = ApiError::Transport("connection refused".to_string()).into();
        assert_eq!(describe_error(&transport), CANNOT_CONNECT);

        let unauthorized: anyhow::Error = ApiError::Unauthorized("Session expired".to_string()).into();
        assert!(describe_error(&unauthorized).contains("scholarai login"));

        let timeout: anyhow::Error = ApiError::Timeout { attempts: 30 }.into();
        assert_eq!(
            describe_error(&timeout),
            "Job timed out after 30 attempts - taking too long"
        );

        let failed = Err::<(), _>(ApiError::JobFailed("arXiv down".to_string()))
            .context("Search c-1")
            .unwrap_err();
        assert_eq!(describe_error(&failed), "Job failed: arXiv down");

        let cancelled: anyhow::Error = ApiError::Cancelled.into();
        assert_eq!(describe_error(&cancelled), "Cancelled.");

        let plain = anyhow!("Not logged in");
        assert_eq!(describe_error(&plain), "Not logged in");
    }
}
