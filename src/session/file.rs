//! Session persisted as a JSON file between runs.

use anyhow::{Context, Result};
use log::{debug, warn};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::runtime::Runtime;

use super::{SessionData, SessionStore, StoredCookie, UserIdentity};

/// Session backed by a JSON file.
///
/// Every read goes to disk so that a token refreshed by another process is
/// picked up. A missing or unreadable file is an empty session.
pub struct FileSession<R: Runtime> {
    runtime: R,
    path: PathBuf,
    lock: Mutex<()>,
}

impl<R: Runtime> FileSession<R> {
    pub fn new(runtime: R, path: impl Into<PathBuf>) -> Self {
        Self {
            runtime,
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> SessionData {
        if !self.runtime.exists(&self.path) {
            return SessionData::default();
        }

        let content = match self.runtime.read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                warn!("Failed to read session file {:?}: {}", self.path, e);
                return SessionData::default();
            }
        };

        serde_json::from_str(&content).unwrap_or_else(|e| {
            warn!("Ignoring malformed session file {:?}: {}", self.path, e);
            SessionData::default()
        })
    }

    fn save(&self, data: &SessionData) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !self.runtime.exists(parent) {
                self.runtime.create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_string_pretty(data).context("Failed to serialize session")?;
        self.runtime.write(&self.path, json.as_bytes())?;
        self.runtime.set_private(&self.path)?;
        debug!("Saved session to {:?}", self.path);
        Ok(())
    }

    fn update(&self, f: impl FnOnce(&mut SessionData)) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut data = self.load();
        f(&mut data);
        self.save(&data)
    }
}

impl<R: Runtime> SessionStore for FileSession<R> {
    fn token(&self) -> Option<String> {
        self.load().token
    }

    fn set_token(&self, token: &str) -> Result<()> {
        self.update(|d| d.token = Some(token.to_string()))
    }

    fn user(&self) -> Option<UserIdentity> {
        self.load().user
    }

    fn set_user(&self, user: &UserIdentity) -> Result<()> {
        self.update(|d| d.user = Some(user.clone()))
    }

    fn clear(&self) -> Result<()> {
        if !self.runtime.exists(&self.path) {
            return Ok(());
        }
        self.update(SessionData::clear_credential)
    }

    fn cookies(&self) -> Vec<StoredCookie> {
        self.load().cookies
    }

    fn set_cookies(&self, cookies: Vec<StoredCookie>) -> Result<()> {
        self.update(|d| d.cookies = cookies)
    }
}
