//! Response envelope handling.
//!
//! Successful responses look like `{ "data": ..., "message": "..." }`, errors
//! like `{ "message": "..." }`; the HTTP status tells them apart. Error pages
//! that are not JSON are tolerated by checking `Content-Type` first.

use anyhow::Result;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::ApiError;

/// Message used when a non-JSON body is empty.
const SERVER_ERROR: &str = "Server error";

/// A response body split into its envelope parts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Envelope {
    pub data: Option<Value>,
    pub message: Option<String>,
    /// `detail` or `error` field, used by the AI service instead of `message`
    pub detail: Option<String>,
}

impl Envelope {
    fn from_value(value: Value) -> Self {
        match value {
            Value::Object(mut map) => {
                let mut text = |key: &str| {
                    map.remove(key)
                        .and_then(|m| m.as_str().map(str::to_string))
                        .filter(|m| !m.is_empty())
                };
                let message = text("message");
                let detail = text("detail").or_else(|| text("error"));
                Envelope {
                    data: map.remove("data").filter(|d| !d.is_null()),
                    message,
                    detail,
                }
            }
            other => Envelope {
                data: Some(other),
                ..Envelope::default()
            },
        }
    }

    /// Deserializes `data` into `T`.
    pub fn data<T: DeserializeOwned>(&self) -> Result<T> {
        let data = self
            .data
            .clone()
            .ok_or_else(|| ApiError::InvalidResponse("response has no data".to_string()))?;
        serde_json::from_value(data)
            .map_err(|e| ApiError::InvalidResponse(format!("malformed data: {}", e)).into())
    }
}

fn text_envelope(text: &str) -> Envelope {
    let text = text.trim();
    Envelope {
        message: Some(if text.is_empty() {
            SERVER_ERROR.to_string()
        } else {
            text.to_string()
        }),
        ..Envelope::default()
    }
}

/// Reads a response body as an envelope, whatever the content type.
///
/// An error status whose body does not parse keeps the raw text as its
/// message; only a 2xx body that fails to parse is an invalid response.
pub async fn read_envelope(response: Response) -> Result<(StatusCode, Envelope)> {
    let status = response.status();
    let is_json = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("application/json"))
        .unwrap_or(false);

    let text = response.text().await.unwrap_or_default();
    if !is_json {
        return Ok((status, text_envelope(&text)));
    }

    match serde_json::from_str::<Value>(&text) {
        Ok(value) => Ok((status, Envelope::from_value(value))),
        Err(e) if status.is_success() => {
            Err(ApiError::InvalidResponse(format!("invalid JSON body: {}", e)).into())
        }
        Err(_) => Ok((status, text_envelope(&text))),
    }
}

/// Reads an enveloped response, failing on a non-2xx status.
///
/// Non-2xx statuses become [`ApiError::Unauthorized`] or
/// [`ApiError::Application`], carrying the server message or `fallback`.
pub async fn read_success(response: Response, fallback: &str) -> Result<Envelope> {
    let (status, envelope) = read_envelope(response).await?;
    if !status.is_success() {
        let message = envelope.message.unwrap_or_else(|| fallback.to_string());
        return Err(ApiError::from_status(status, message).into());
    }
    Ok(envelope)
}

/// Reads an enveloped response and returns its `data`.
pub async fn read_data<T: DeserializeOwned>(response: Response, fallback: &str) -> Result<T> {
    read_success(response, fallback).await?.data()
}

/// Passes 2xx responses through; otherwise fails with
/// `"{fallback}: {detail}"`, the detail taken from the body when it has one.
pub async fn check_status(response: Response, fallback: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let (_, envelope) = read_envelope(response).await?;
    let detail = envelope
        .detail
        .or(envelope.message)
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown").to_string());
    Err(ApiError::from_status(status, format!("{}: {}", fallback, detail)).into())
}

/// Reads a bare JSON response (no envelope), used by the AI service.
pub async fn read_json<T: DeserializeOwned>(response: Response, fallback: &str) -> Result<T> {
    check_status(response, fallback)
        .await?
        .json::<T>()
        .await
        .map_err(|e| ApiError::InvalidResponse(format!("{}: {}", fallback, e)).into())
}
