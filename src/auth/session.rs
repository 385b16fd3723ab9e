//! Signed-in session persistence.
//!
//! Remembers which account last signed in so the next run can try a silent
//! token acquisition instead of prompting. Account labels go to a local JSON
//! file readable only by the owner; the refresh token goes to a `SecretStore`.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};
use zeroize::Zeroizing;

use super::secret::{KeyringSecret, SecretStore};
use crate::error::SessionError;

/// Session file name.
const SESSION_FILE: &str = "session.json";

/// What is remembered about the last signed-in account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub user_id: String,
    #[serde(default)]
    pub user_email: Option<String>,
    #[serde(default)]
    pub user_name: Option<String>,
}

/// Session record on disk plus the refresh token in the secret store.
#[derive(Clone)]
pub struct SessionStore {
    path: PathBuf,
    refresh_token: Arc<dyn SecretStore>,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>, refresh_token: Arc<dyn SecretStore>) -> Self {
        Self {
            path: path.into(),
            refresh_token,
        }
    }

    /// Record in the platform config directory, token in the OS keyring.
    ///
    /// e.g. `~/.config/graph-snippets/session.json` on Linux.
    pub fn default_location() -> Result<Self, SessionError> {
        ProjectDirs::from("dev", "graph-snippets", "graph-snippets")
            .map(|dirs| {
                Self::new(
                    dirs.config_dir().join(SESSION_FILE),
                    Arc::new(KeyringSecret::refresh_token()),
                )
            })
            .ok_or(SessionError::NoConfigDir)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the saved session.
    ///
    /// A missing or corrupted file means no prior session.
    pub fn load(&self) -> Option<SessionRecord> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No session file at {:?}", self.path);
                return None;
            }
            Err(e) => {
                error!("Failed to read session file: {}", e);
                return None;
            }
        };

        match serde_json::from_str::<SessionRecord>(&content) {
            Ok(record) if !record.user_id.is_empty() => Some(record),
            Ok(_) => None,
            Err(e) => {
                error!("Failed to parse session file: {}, ignoring it", e);
                None
            }
        }
    }

    /// Does a prior session exist?
    pub fn has_prior_session(&self) -> bool {
        self.load().is_some()
    }

    /// The saved refresh token. Store failures count as no token.
    pub fn refresh_token(&self) -> Option<Zeroizing<String>> {
        match self.refresh_token.get() {
            Ok(token) => token,
            Err(e) => {
                error!("Failed to read refresh token: {}", e);
                None
            }
        }
    }

    /// Save the session record, and the refresh token when one was issued.
    pub fn save(&self, record: &SessionRecord, refresh_token: Option<&str>) -> Result<(), SessionError> {
        if let Some(token) = refresh_token {
            self.refresh_token.set(token)?;
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(record)?;
        let mut file = private_file(&self.path)?;
        file.write_all(content.as_bytes())?;

        debug!("Saved session to {:?}", self.path);
        Ok(())
    }

    /// Forget the saved session and its refresh token.
    pub fn clear(&self) -> Result<(), SessionError> {
        match fs::remove_file(&self.path) {
            Ok(()) => info!("Cleared saved session"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        self.refresh_token.delete()
    }
}

/// Open `path` for writing, truncated, readable by the owner only.
#[cfg(unix)]
fn private_file(path: &Path) -> std::io::Result<fs::File> {
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    // `mode` only applies on creation; tighten a file left by an older run.
    file.set_permissions(fs::Permissions::from_mode(0o600))?;
    Ok(file)
}

#[cfg(not(unix))]
fn private_file(path: &Path) -> std::io::Result<fs::File> {
    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
}
