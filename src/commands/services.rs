//! Service factory for building application dependencies.
//!
//! Keeps the construction of the HTTP client, session store and API clients
//! out of the command handlers.

use std::sync::Arc;

use anyhow::Result;
use log::debug;
use reqwest::Client;

use crate::{
    account::AccountApi,
    auth::AuthApi,
    gap_analysis::GapAnalysisApi,
    http::AuthenticatedClient,
    job::Backoff,
    runtime::Runtime,
    session::{FileSession, SessionCookieJar, SessionStore},
    websearch::WebSearchApi,
};

use super::config::Config;

/// Build the shared HTTP client. Cookies live in the session so the refresh
/// cookie survives between runs.
pub fn build_http_client(session: Arc<dyn SessionStore>) -> Result<Client> {
    let jar = Arc::new(SessionCookieJar::new(session));
    let client = Client::builder()
        .user_agent(concat!("scholarai-cli/", env!("SCHOLARAI_VERSION")))
        .cookie_provider(jar)
        .build()?;
    Ok(client)
}

/// Everything a command needs to talk to the backend.
pub struct Services {
    pub session: Arc<dyn SessionStore>,
    pub auth: AuthApi,
    pub account: AccountApi,
    pub websearch: WebSearchApi,
    pub gap_analysis: GapAnalysisApi,
}

impl Services {
    /// Services backed by the session file named in `config`.
    pub fn new<R: Runtime + 'static>(runtime: R, config: &Config) -> Result<Self> {
        debug!("Using session file {}", config.session_file.display());
        let session: Arc<dyn SessionStore> =
            Arc::new(FileSession::new(runtime, config.session_file.clone()));
        Self::with_session(session, config)
    }

    pub fn with_session(session: Arc<dyn SessionStore>, config: &Config) -> Result<Self> {
        let http = build_http_client(session.clone())?;
        let client = Arc::new(AuthenticatedClient::new(
            http.clone(),
            session.clone(),
            &config.api_url,
        ));

        Ok(Self {
            auth: AuthApi::new(client.clone(), &config.api_url),
            account: AccountApi::new(client.clone(), &config.api_url),
            websearch: WebSearchApi::new(client, &config.api_url)
                .with_backoff(Backoff::linear(config.poll_interval)),
            gap_analysis: GapAnalysisApi::new(http, &config.ai_api_url),
            session,
        })
    }
}
