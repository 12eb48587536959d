//! HTTP client that attaches the session's bearer token and recovers from
//! an expired token by refreshing it once.

use anyhow::{Context, Result, anyhow, bail};
use log::{debug, info, warn};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::envelope::read_envelope;
use crate::error::ApiError;
use crate::session::{SessionStore, mask_token};

/// Path of the endpoint that trades the refresh cookie for a new access token.
pub const REFRESH_PATH: &str = "/api/v1/auth/refresh";

/// Request body, kept owned so the request can be replayed after a refresh.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Json(String),
    /// One file field sent as `multipart/form-data`.
    File {
        field: String,
        file_name: String,
        bytes: Vec<u8>,
    },
}

/// Method, extra headers and body of an outgoing request.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<RequestBody>,
}

impl RequestOptions {
    pub fn get() -> Self {
        Self::default()
    }

    pub fn delete() -> Self {
        Self {
            method: Method::DELETE,
            ..Self::default()
        }
    }

    pub fn json<T: Serialize + ?Sized>(method: Method, body: &T) -> Result<Self> {
        let body = serde_json::to_string(body).context("Failed to serialize request body")?;
        Ok(Self {
            method,
            headers: HeaderMap::new(),
            body: Some(RequestBody::Json(body)),
        })
    }

    pub fn file(method: Method, field: &str, file_name: &str, bytes: Vec<u8>) -> Self {
        Self {
            method,
            headers: HeaderMap::new(),
            body: Some(RequestBody::File {
                field: field.to_string(),
                file_name: file_name.to_string(),
                bytes,
            }),
        }
    }

    fn is_multipart(&self) -> bool {
        matches!(self.body, Some(RequestBody::File { .. }))
    }
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    email: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshData {
    access_token: Option<String>,
}

/// HTTP client bound to a session.
///
/// Every request carries `Authorization: Bearer <token>` when the session has
/// a token. A 401 triggers at most one refresh and one retry per call;
/// refreshes are serialized so parallel 401s share a single refresh.
pub struct AuthenticatedClient {
    client: Client,
    session: Arc<dyn SessionStore>,
    refresh_url: String,
    refresh_lock: Mutex<()>,
}

impl AuthenticatedClient {
    /// `client` should carry the session's cookie jar so the refresh cookie is sent.
    pub fn new(client: Client, session: Arc<dyn SessionStore>, api_url: &str) -> Self {
        Self {
            client,
            session,
            refresh_url: format!("{}{}", api_url.trim_end_matches('/'), REFRESH_PATH),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Returns the underlying reqwest Client, for endpoints that take no token.
    pub fn inner(&self) -> &Client {
        &self.client
    }

    pub fn session(&self) -> &Arc<dyn SessionStore> {
        &self.session
    }

    /// Sends a request with the current token, refreshing once on 401.
    ///
    /// Returns the response whatever its status. If the refresh is not
    /// possible or fails, the session is cleared and the original 401
    /// response is returned. Only a transport failure is an `Err`.
    #[tracing::instrument(skip(self, options), fields(method = %options.method))]
    pub async fn request(&self, url: &str, options: RequestOptions) -> Result<Response> {
        let token = self.session.token();
        let response = self.send(url, &options, token.as_deref()).await?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        info!("Access token expired, refreshing...");
        match self.renew_token(token.as_deref()).await {
            Some(new_token) => {
                debug!("Retrying {} with refreshed token", url);
                self.send(url, &options, Some(&new_token)).await
            }
            None => Ok(response),
        }
    }

    pub async fn get(&self, url: &str) -> Result<Response> {
        self.request(url, RequestOptions::get()).await
    }

    pub async fn post_json<T: Serialize + ?Sized>(&self, url: &str, body: &T) -> Result<Response> {
        self.request(url, RequestOptions::json(Method::POST, body)?).await
    }

    pub async fn put_json<T: Serialize + ?Sized>(&self, url: &str, body: &T) -> Result<Response> {
        self.request(url, RequestOptions::json(Method::PUT, body)?).await
    }

    pub async fn delete(&self, url: &str) -> Result<Response> {
        self.request(url, RequestOptions::delete()).await
    }

    /// Calls the refresh endpoint and stores the new token.
    ///
    /// Any failure clears the session and yields `None`.
    #[tracing::instrument(skip(self))]
    pub async fn refresh_access_token(&self) -> Option<String> {
        match self.try_refresh().await {
            Ok(token) => {
                info!("Access token refreshed successfully");
                Some(token)
            }
            Err(e) => {
                warn!("Token refresh failed: {}", e);
                if let Err(e) = self.session.clear() {
                    warn!("Failed to clear session: {}", e);
                }
                None
            }
        }
    }

    /// Gets a token to retry with after `used` was rejected.
    async fn renew_token(&self, used: Option<&str>) -> Option<String> {
        let _guard = self.refresh_lock.lock().await;

        // Another request may have refreshed while this one waited for the lock
        if let Some(current) = self.session.token() {
            if Some(current.as_str()) != used {
                debug!("Token was already refreshed by a concurrent request");
                return Some(current);
            }
        }

        self.refresh_access_token().await
    }

    async fn try_refresh(&self) -> Result<String> {
        let email = self
            .session
            .user()
            .map(|u| u.email)
            .filter(|e| !e.is_empty())
            .ok_or_else(|| anyhow!("No user email found for refresh token request"))?;

        let response = self
            .client
            .post(&self.refresh_url)
            .header(ACCEPT, "application/json")
            .json(&RefreshRequest { email: &email })
            .send()
            .await
            .map_err(|e| ApiError::transport(&e))?;

        let (status, envelope) = read_envelope(response).await?;
        if !status.is_success() {
            bail!(
                "Refresh token invalid or expired: {}",
                envelope.message.as_deref().unwrap_or("Unknown error")
            );
        }

        let token = envelope
            .data::<RefreshData>()?
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| anyhow!("Refresh response carried no access token"))?;

        self.session.set_token(&token)?;
        debug!("Stored refreshed token {}", mask_token(&token));
        Ok(token)
    }

    async fn send(
        &self,
        url: &str,
        options: &RequestOptions,
        token: Option<&str>,
    ) -> Result<Response> {
        debug!("{} {}", options.method, url);
        let mut builder = self
            .client
            .request(options.method.clone(), url)
            .headers(build_headers(&options.headers, token, !options.is_multipart())?);
        match &options.body {
            Some(RequestBody::Json(text)) => builder = builder.body(text.clone()),
            Some(RequestBody::File {
                field,
                file_name,
                bytes,
            }) => {
                let part = Part::bytes(bytes.clone()).file_name(file_name.clone());
                builder = builder.multipart(Form::new().part(field.clone(), part));
            }
            None => {}
        }

        builder
            .send()
            .await
            .map_err(|e| ApiError::transport(&e).into())
    }
}

/// Caller headers, then the JSON defaults, then the bearer token.
///
/// Multipart bodies carry their own `Content-Type` with the boundary.
fn build_headers(extra: &HeaderMap, token: Option<&str>, json_body: bool) -> Result<HeaderMap> {
    let mut headers = extra.clone();
    if json_body {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    } else {
        headers.remove(CONTENT_TYPE);
    }
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

    if let Some(token) = token {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
            .context("Access token is not a valid header value")?;
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);
    }

    Ok(headers)
}
