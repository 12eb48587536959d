//! HTTP layer: the session-aware client and response envelope parsing.

mod client;
mod envelope;

pub use client::{AuthenticatedClient, REFRESH_PATH, RequestBody, RequestOptions};
pub use envelope::{Envelope, check_status, read_data, read_envelope, read_json, read_success};
