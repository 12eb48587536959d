//! In-process session store.

use anyhow::Result;
use std::sync::RwLock;

use super::{SessionData, SessionStore, StoredCookie, UserIdentity};

/// Session held in memory for the lifetime of the process.
#[derive(Debug, Default)]
pub struct MemorySession {
    data: RwLock<SessionData>,
}

impl MemorySession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts out signed in as `user` with `token`.
    pub fn signed_in(token: &str, user: UserIdentity) -> Self {
        Self {
            data: RwLock::new(SessionData {
                token: Some(token.to_string()),
                user: Some(user),
                cookies: Vec::new(),
            }),
        }
    }

    fn read<T>(&self, f: impl FnOnce(&SessionData) -> T) -> T {
        let guard = self.data.read().unwrap_or_else(|e| e.into_inner());
        f(&guard)
    }

    fn update(&self, f: impl FnOnce(&mut SessionData)) -> Result<()> {
        let mut guard = self.data.write().unwrap_or_else(|e| e.into_inner());
        f(&mut guard);
        Ok(())
    }
}

impl SessionStore for MemorySession {
    fn token(&self) -> Option<String> {
        self.read(|d| d.token.clone())
    }

    fn set_token(&self, token: &str) -> Result<()> {
        self.update(|d| d.token = Some(token.to_string()))
    }

    fn user(&self) -> Option<UserIdentity> {
        self.read(|d| d.user.clone())
    }

    fn set_user(&self, user: &UserIdentity) -> Result<()> {
        self.update(|d| d.user = Some(user.clone()))
    }

    fn clear(&self) -> Result<()> {
        self.update(SessionData::clear_credential)
    }

    fn cookies(&self) -> Vec<StoredCookie> {
        self.read(|d| d.cookies.clone())
    }

    fn set_cookies(&self, cookies: Vec<StoredCookie>) -> Result<()> {
        self.update(|d| d.cookies = cookies)
    }
}
