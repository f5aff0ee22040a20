//! Offline mode flag.
//!
//! When the network is unreachable the recovery layer flips the tool into
//! offline mode by writing `state/offline-mode.json`. The API gateway reads
//! the flag once at construction and fails fast afterwards; `clear` removes
//! the file when connectivity is restored.

use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Persisted offline-mode record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfflineState {
    /// Why offline mode was enabled.
    pub reason: String,
    /// When it was enabled.
    pub since: String,
}

impl OfflineState {
    fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            since: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }

    /// Parse the `since` timestamp, if well formed.
    pub fn since_time(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.since).ok().map(|t| t.with_timezone(&Utc))
    }
}

/// Handle to the offline-mode marker file.
#[derive(Debug, Clone)]
pub struct OfflineMode {
    path: PathBuf,
}

impl OfflineMode {
    /// Create a handle for the marker at `path`.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the marker file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether offline mode is currently enabled.
    pub fn is_enabled(&self) -> bool {
        self.path.exists()
    }

    /// Read the persisted state, when present and parseable.
    pub fn state(&self) -> Option<OfflineState> {
        let content = std::fs::read_to_string(&self.path).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Enable offline mode, persisting the reason.
    pub fn enable(&self, reason: impl Into<String>) -> std::io::Result<OfflineState> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let state = OfflineState::new(reason);
        let content = serde_json::to_string_pretty(&state).expect("serializable state");
        std::fs::write(&self.path, content)?;
        Ok(state)
    }

    /// Disable offline mode. Missing marker is not an error.
    pub fn clear(&self) -> std::io::Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enable_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let mode = OfflineMode::at(dir.path().join("state").join("offline-mode.json"));

        assert!(!mode.is_enabled());
        mode.enable("connection refused").unwrap();
        assert!(mode.is_enabled());

        let state = mode.state().unwrap();
        assert_eq!(state.reason, "connection refused");
        assert!(state.since_time().is_some());
    }

    #[test]
    fn test_clear_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mode = OfflineMode::at(dir.path().join("offline-mode.json"));

        mode.clear().unwrap();
        mode.enable("test").unwrap();
        mode.clear().unwrap();
        assert!(!mode.is_enabled());
        mode.clear().unwrap();
    }
}
