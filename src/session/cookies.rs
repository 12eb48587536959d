//! Cookie jar that lives inside the session.
//!
//! The refresh token is an HTTP-only cookie owned by the server. A plain
//! in-memory jar would lose it when the CLI exits, so cookies are stored
//! alongside the credential and replayed to the requests they apply to.

use cookie::Cookie;
use cookie::time::OffsetDateTime;
use log::{debug, warn};
use reqwest::Url;
use reqwest::cookie::CookieStore;
use reqwest::header::HeaderValue;
use std::sync::Arc;

use super::{SessionStore, StoredCookie};

pub struct SessionCookieJar {
    session: Arc<dyn SessionStore>,
}

impl SessionCookieJar {
    pub fn new(session: Arc<dyn SessionStore>) -> Self {
        Self { session }
    }
}

/// Directory of the request path, used when `Set-Cookie` names no `Path`.
fn default_path(url: &Url) -> String {
    let path = url.path();
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(end) => path[..end].to_string(),
    }
}

fn path_matches(cookie_path: &str, request_path: &str) -> bool {
    if request_path == cookie_path {
        return true;
    }
    request_path.starts_with(cookie_path)
        && (cookie_path.ends_with('/') || request_path[cookie_path.len()..].starts_with('/'))
}

fn domain_matches(domain: &str, host: &str) -> bool {
    host == domain || host.ends_with(&format!(".{}", domain))
}

impl StoredCookie {
    fn effective_path(&self) -> &str {
        self.path.as_deref().unwrap_or("/")
    }

    fn is_expired(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    /// Same name and scope, so a new value replaces this one.
    fn same_slot(&self, other: &StoredCookie) -> bool {
        self.name == other.name
            && self.effective_path() == other.effective_path()
            && match (&self.domain, &other.domain) {
                (Some(a), Some(b)) => a == b,
                (None, None) => self.host == other.host,
                _ => false,
            }
    }

    fn applies_to(&self, url: &Url, now: i64) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        let host_ok = match &self.domain {
            Some(domain) => domain_matches(domain, host),
            None => self.host == host,
        };
        host_ok
            && path_matches(self.effective_path(), url.path())
            && (!self.secure || url.scheme() == "https")
            && !self.is_expired(now)
    }
}

/// Reads one `Set-Cookie` header into the stored shape.
///
/// Returns the cookie and whether the header deletes it. `None` when the
/// header is malformed or names a domain the responding host is not part of.
fn parse_set_cookie(raw: &str, url: &Url, now: OffsetDateTime) -> Option<(StoredCookie, bool)> {
    let host = url.host_str()?;
    let parsed = match Cookie::parse(raw) {
        Ok(parsed) => parsed,
        Err(e) => {
            debug!("Ignoring malformed Set-Cookie from {}: {}", host, e);
            return None;
        }
    };

    let domain = parsed
        .domain()
        .map(|d| d.trim_start_matches('.').to_ascii_lowercase())
        .filter(|d| !d.is_empty());
    if let Some(domain) = &domain {
        if !domain_matches(domain, host) {
            warn!("Rejecting cookie {} for {} from {}", parsed.name(), domain, host);
            return None;
        }
    }

    // Max-Age wins over Expires
    let expires_at = match parsed.max_age() {
        Some(age) => now.checked_add(age).map(|at| at.unix_timestamp()),
        None => parsed.expires_datetime().map(|at| at.unix_timestamp()),
    };

    let cookie = StoredCookie {
        host: host.to_string(),
        name: parsed.name().to_string(),
        value: parsed.value().to_string(),
        domain,
        path: Some(
            parsed
                .path()
                .filter(|p| p.starts_with('/'))
                .map(str::to_string)
                .unwrap_or_else(|| default_path(url)),
        ),
        secure: parsed.secure().unwrap_or(false),
        expires_at,
    };
    let deleted = cookie.value.is_empty() || cookie.is_expired(now.unix_timestamp());
    Some((cookie, deleted))
}

impl CookieStore for SessionCookieJar {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        let now = OffsetDateTime::now_utc();
        let mut cookies = self.session.cookies();
        let mut changed = false;

        for header in cookie_headers {
            let Some((cookie, deleted)) = header
                .to_str()
                .ok()
                .and_then(|raw| parse_set_cookie(raw, url, now))
            else {
                continue;
            };
            cookies.retain(|c| !c.same_slot(&cookie));
            if deleted {
                debug!("Server expired cookie {} for {}", cookie.name, cookie.host);
            } else {
                debug!("Storing cookie {} for {}", cookie.name, cookie.host);
                cookies.push(cookie);
            }
            changed = true;
        }

        let before = cookies.len();
        cookies.retain(|c| !c.is_expired(now.unix_timestamp()));
        changed |= cookies.len() != before;

        if changed {
            if let Err(e) = self.session.set_cookies(cookies) {
                warn!("Failed to persist cookies: {}", e);
            }
        }
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let header = self
            .session
            .cookies()
            .iter()
            .filter(|c| c.applies_to(url, now))
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ");

        if header.is_empty() {
            return None;
        }
        HeaderValue::from_str(&header).ok()
    }
}
