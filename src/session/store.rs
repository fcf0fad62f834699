use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::AuthError;

/// Key/value storage scoped to one login session.
///
/// This is the only place transient secrets (PKCE verifier, CSRF state) are
/// persisted between starting a login and handling its callback.
pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str) -> Result<(), AuthError>;

    /// Remove several keys in one step. Absent keys are ignored.
    fn remove_all(&self, keys: &[&str]) -> Result<(), AuthError>;

    fn remove(&self, key: &str) -> Result<(), AuthError> {
        self.remove_all(&[key])
    }
}

/// Process-local store, the equivalent of a single tab's session storage.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), AuthError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| AuthError::Store("session store lock poisoned".into()))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_all(&self, keys: &[&str]) -> Result<(), AuthError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| AuthError::Store("session store lock poisoned".into()))?;
        for key in keys {
            entries.remove(*key);
        }
        Ok(())
    }
}

/// Store backed by a JSON file, so a login started by one process can be
/// completed by another.
///
/// The file is re-read on every access; nothing is cached in memory.
#[derive(Debug)]
pub struct FileSessionStore {
    path: PathBuf,
    lock: Mutex<()>,
}

/// Default location: `CONSOLE_AUTH_SESSION`, else `~/.console-auth/session.json`.
pub fn default_session_path() -> PathBuf {
    if let Ok(path) = std::env::var("CONSOLE_AUTH_SESSION") {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".console-auth")
        .join("session.json")
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries(&self) -> HashMap<String, String> {
        let Ok(data) = std::fs::read_to_string(&self.path) else {
            return HashMap::new();
        };
        serde_json::from_str(&data).unwrap_or_else(|e| {
            tracing::warn!("Ignoring unreadable session file {}: {e}", self.path.display());
            HashMap::new()
        })
    }

    fn write_entries(&self, entries: &HashMap<String, String>) -> Result<(), AuthError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let data = serde_json::to_string_pretty(entries)
            .map_err(|e| AuthError::Store(format!("Failed to serialize session: {e}")))?;
        std::fs::write(&self.path, data)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }
}

impl SessionStore for FileSessionStore {
    fn get(&self, key: &str) -> Option<String> {
        let _guard = self.lock.lock().ok()?;
        self.read_entries().remove(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), AuthError> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| AuthError::Store("session file lock poisoned".into()))?;
        let mut entries = self.read_entries();
        entries.insert(key.to_string(), value.to_string());
        self.write_entries(&entries)
    }

    fn remove_all(&self, keys: &[&str]) -> Result<(), AuthError> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| AuthError::Store("session file lock poisoned".into()))?;
        let mut entries = self.read_entries();
        let before = entries.len();
        for key in keys {
            entries.remove(*key);
        }
        if entries.len() == before {
            return Ok(());
        }
        self.write_entries(&entries)
    }
}
