//! Client session state: the access token, the signed-in user and the
//! server's cookies.
//!
//! Nothing in the crate reads or writes credentials except through
//! [`SessionStore`]. Pick [`MemorySession`] for embedding and tests, or
//! [`FileSession`] to keep the session between CLI runs.

mod cookies;
mod file;
mod memory;

use anyhow::Result;
use serde::{Deserialize, Serialize};

pub use cookies::SessionCookieJar;
pub use file::FileSession;
pub use memory::MemorySession;

/// Identity of the signed-in user as reported by the auth endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

/// A cookie the server set, kept opaquely and replayed where it applies.
///
/// `host` is the host that set it. A `domain` widens the scope to that
/// domain and its subdomains. `expires_at` is a Unix timestamp; cookies
/// without one last until the server replaces them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCookie {
    pub host: String,
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub secure: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

/// Persisted shape of a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct SessionData {
    #[serde(
        rename = "scholarai_token",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub token: Option<String>,
    #[serde(
        rename = "scholarai_user",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub user: Option<UserIdentity>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cookies: Vec<StoredCookie>,
}

impl SessionData {
    /// Drops the credential. Cookies belong to the server and stay.
    pub fn clear_credential(&mut self) {
        self.token = None;
        self.user = None;
    }
}

/// Storage for the client's credential. Writes are last-write-wins.
#[cfg_attr(test, mockall::automock)]
pub trait SessionStore: Send + Sync {
    fn token(&self) -> Option<String>;
    fn set_token(&self, token: &str) -> Result<()>;
    fn user(&self) -> Option<UserIdentity>;
    fn set_user(&self, user: &UserIdentity) -> Result<()>;

    /// Removes the access token and user identity.
    fn clear(&self) -> Result<()>;

    fn cookies(&self) -> Vec<StoredCookie>;
    fn set_cookies(&self, cookies: Vec<StoredCookie>) -> Result<()>;
}

/// Masks a token for log output, keeping a few characters at each end.
pub(crate) fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 12 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}*********{}", head, tail)
}
