//! Account endpoints: sign in, sign up, sign out and password reset.
//!
//! Sign-in style calls never fail with an `Err`; they return an
//! [`AuthOutcome`] whose failure message is ready to show to the user.

use anyhow::Result;
use log::{debug, warn};
use reqwest::StatusCode;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;

use crate::error::{ApiError, CANNOT_CONNECT, find_api_error};
use crate::http::{AuthenticatedClient, Envelope, read_envelope};
use crate::session::{SessionStore, UserIdentity, mask_token};

pub const LOGIN_PATH: &str = "/api/v1/auth/login";
pub const REGISTER_PATH: &str = "/api/v1/auth/register";
pub const LOGOUT_PATH: &str = "/api/v1/auth/logout";
pub const FORGOT_PASSWORD_PATH: &str = "/api/v1/auth/forgot-password";
pub const RESET_PASSWORD_PATH: &str = "/api/v1/auth/reset-password";

const INTERNAL_ERROR: &str = "Internal server error. Please try again later.";
const CANNOT_CONNECT_NETWORK: &str =
    "Cannot connect to server. Please check your internet connection.";

/// Result of a sign-in or sign-up attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    Success {
        token: Option<String>,
        user: Option<UserIdentity>,
        message: String,
    },
    Failure {
        message: String,
    },
}

impl AuthOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, AuthOutcome::Success { .. })
    }

    pub fn message(&self) -> &str {
        match self {
            AuthOutcome::Success { message, .. } | AuthOutcome::Failure { message } => message,
        }
    }
}

/// Third-party identity used for social sign-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocialLogin {
    Google { id_token: String },
    GitHub { code: String },
}

impl SocialLogin {
    fn path(&self) -> &'static str {
        match self {
            SocialLogin::Google { .. } => "/api/v1/auth/social/google-login",
            SocialLogin::GitHub { .. } => "/api/v1/auth/social/github-login",
        }
    }

    fn body(&self) -> Value {
        match self {
            SocialLogin::Google { id_token } => json!({ "idToken": id_token }),
            SocialLogin::GitHub { code } => json!({ "code": code }),
        }
    }

    fn messages(&self) -> FailureMessages {
        match self {
            SocialLogin::Google { .. } => FailureMessages {
                unauthorized: Some("Social login authentication failed"),
                bad_request: "Invalid social login data",
                conflict: None,
                fallback: "Social login failed",
                with_status: false,
            },
            SocialLogin::GitHub { .. } => FailureMessages {
                unauthorized: Some("GitHub authentication failed"),
                bad_request: "Invalid GitHub callback data",
                conflict: None,
                fallback: "GitHub callback failed at backend",
                with_status: false,
            },
        }
    }

    fn success_message(&self) -> &'static str {
        match self {
            SocialLogin::Google { .. } => "Social login successful",
            SocialLogin::GitHub { .. } => "GitHub login successful",
        }
    }
}

/// Default messages per status when the server sends none.
struct FailureMessages {
    unauthorized: Option<&'static str>,
    bad_request: &'static str,
    conflict: Option<&'static str>,
    fallback: &'static str,
    with_status: bool,
}

impl FailureMessages {
    const LOGIN: FailureMessages = FailureMessages {
        unauthorized: Some("Invalid email or password"),
        bad_request: "Invalid request data",
        conflict: None,
        fallback: "Login failed",
        with_status: true,
    };

    const REGISTER: FailureMessages = FailureMessages {
        unauthorized: None,
        bad_request: "Invalid request data",
        conflict: Some("Email already exists"),
        fallback: "Registration failed",
        with_status: true,
    };

    fn describe(&self, status: StatusCode, server_message: Option<String>) -> String {
        // A 500 never leaks the server's own text
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            return INTERNAL_ERROR.to_string();
        }
        if let Some(message) = server_message {
            return message;
        }
        let specific = match status {
            StatusCode::UNAUTHORIZED => self.unauthorized,
            StatusCode::BAD_REQUEST => Some(self.bad_request),
            StatusCode::CONFLICT => self.conflict,
            _ => None,
        };
        match specific {
            Some(message) => message.to_string(),
            None if self.with_status => format!("{} ({})", self.fallback, status.as_u16()),
            None => self.fallback.to_string(),
        }
    }
}

/// `data` of a successful sign-in.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginData {
    access_token: Option<String>,
    user_id: Option<String>,
    email: Option<String>,
    #[serde(default)]
    roles: Vec<String>,
}

impl LoginData {
    fn user(&self) -> Option<UserIdentity> {
        let id = self.user_id.clone().filter(|id| !id.is_empty())?;
        Some(UserIdentity {
            id,
            email: self.email.clone().unwrap_or_default(),
            roles: self.roles.clone(),
        })
    }
}

/// Client for the authentication endpoints.
pub struct AuthApi {
    client: Arc<AuthenticatedClient>,
    api_url: String,
}

impl AuthApi {
    pub fn new(client: Arc<AuthenticatedClient>, api_url: &str) -> Self {
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    fn session(&self) -> &Arc<dyn SessionStore> {
        self.client.session()
    }

    pub fn current_user(&self) -> Option<UserIdentity> {
        self.session().user()
    }

    pub fn is_authenticated(&self) -> bool {
        self.session().token().is_some()
    }

    /// Signs in with email and password and stores the credential.
    #[tracing::instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> AuthOutcome {
        if email.trim().is_empty() || password.trim().is_empty() {
            return AuthOutcome::Failure {
                message: "Email and password are required".to_string(),
            };
        }

        let body = json!({ "email": email.trim(), "password": password.trim() });
        let result = match self
            .exchange(&self.url(LOGIN_PATH), &body, &FailureMessages::LOGIN)
            .await
        {
            Ok(envelope) => self.store_login(envelope, "No access token received", "Login successful"),
            Err(e) => Err(e),
        };
        into_outcome(result, CANNOT_CONNECT)
    }

    /// Creates an account. Does not sign in.
    #[tracing::instrument(skip(self, password))]
    pub async fn register(&self, email: &str, password: &str) -> AuthOutcome {
        let body = json!({ "email": email, "password": password });
        let result = self
            .exchange(&self.url(REGISTER_PATH), &body, &FailureMessages::REGISTER)
            .await
            .map(|envelope| AuthOutcome::Success {
                token: None,
                user: None,
                message: envelope
                    .message
                    .unwrap_or_else(|| "Registration successful".to_string()),
            });
        into_outcome(result, CANNOT_CONNECT_NETWORK)
    }

    /// Signs in with a Google ID token or a GitHub OAuth code.
    ///
    /// A failed attempt clears whatever credential was stored.
    #[tracing::instrument(skip(self, login))]
    pub async fn social_login(&self, login: &SocialLogin) -> AuthOutcome {
        let result = match self
            .exchange(&self.url(login.path()), &login.body(), &login.messages())
            .await
        {
            Ok(envelope) => self.store_login(
                envelope,
                "No access token received from social login",
                login.success_message(),
            ),
            Err(e) => Err(e),
        };

        if result.is_err() {
            if let Err(e) = self.session().clear() {
                warn!("Failed to clear session: {}", e);
            }
        }
        into_outcome(result, CANNOT_CONNECT)
    }

    /// Tells the server to drop the refresh cookie, then clears the local
    /// session whatever the server said.
    #[tracing::instrument(skip(self))]
    pub async fn logout(&self) -> Result<()> {
        match self.client.inner().post(self.url(LOGOUT_PATH)).send().await {
            Ok(response) if !response.status().is_success() => {
                warn!("Logout returned HTTP {}", response.status())
            }
            Ok(_) => debug!("Logged out on server"),
            Err(e) => warn!("Logout API error: {}", e),
        }
        self.session().clear()
    }

    /// Asks the server to email a password reset code.
    #[tracing::instrument(skip(self))]
    pub async fn send_reset_code(&self, email: &str) -> Result<()> {
        self.post_form(
            FORGOT_PASSWORD_PATH,
            &[("email", email)],
            "Error sending code",
        )
        .await
    }

    /// Sets a new password using the emailed code.
    #[tracing::instrument(skip(self, code, new_password))]
    pub async fn submit_new_password(&self, email: &str, code: &str, new_password: &str) -> Result<()> {
        self.post_form(
            RESET_PASSWORD_PATH,
            &[("email", email), ("code", code), ("newPassword", new_password)],
            "Error resetting password",
        )
        .await
    }

    async fn post_form(&self, path: &str, form: &[(&str, &str)], fallback: &str) -> Result<()> {
        let response = self
            .client
            .inner()
            .post(self.url(path))
            .form(form)
            .send()
            .await
            .map_err(|e| ApiError::transport(&e))?;

        if response.status().is_success() {
            return Ok(());
        }
        let (status, envelope) = read_envelope(response).await?;
        let message = envelope.message.unwrap_or_else(|| fallback.to_string());
        Err(ApiError::from_status(status, message).into())
    }

    /// POSTs credentials (no bearer token) and returns the success envelope.
    async fn exchange(&self, url: &str, body: &Value, messages: &FailureMessages) -> Result<Envelope> {
        let response = self
            .client
            .inner()
            .post(url)
            .header(ACCEPT, "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| ApiError::transport(&e))?;

        let (status, envelope) = read_envelope(response).await?;
        if !status.is_success() {
            let message = messages.describe(status, envelope.message);
            return Err(ApiError::from_status(status, message).into());
        }
        Ok(envelope)
    }

    fn store_login(&self, envelope: Envelope, missing_token: &str, success: &str) -> Result<AuthOutcome> {
        let data: LoginData = envelope.data().unwrap_or_default();
        let token = data
            .access_token
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::InvalidResponse(missing_token.to_string()))?;
        let user = data.user();

        self.session().set_token(&token)?;
        if let Some(user) = &user {
            self.session().set_user(user)?;
        }
        debug!("Signed in with token {}", mask_token(&token));

        Ok(AuthOutcome::Success {
            token: Some(token),
            user,
            message: envelope.message.unwrap_or_else(|| success.to_string()),
        })
    }
}

fn into_outcome(result: Result<AuthOutcome>, cannot_connect: &str) -> AuthOutcome {
    match result {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!("Authentication request failed: {:#}", e);
            let message = match find_api_error(&e) {
                Some(ApiError::Transport(_)) => cannot_connect.to_string(),
                Some(api_error) => api_error.user_message(),
                None => e.to_string(),
            };
            AuthOutcome::Failure { message }
        }
    }
}
