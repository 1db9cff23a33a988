//! Durable lockout snapshot
//!
//! Whole-file JSON overwrite. A missing or unreadable snapshot loads as the
//! default state (unlocked, zero attempts).

use std::path::PathBuf;

use tracing::{debug, warn};

use super::state::LockoutState;

/// Errors raised while saving a snapshot
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to write security state to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode security state: {0}")]
    Encode(#[from] serde_json::Error),
}

/// File-backed store for `LockoutState`
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    /// Store backed by the JSON file at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the snapshot file
    #[cfg(test)]
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Overwrite the snapshot with `state`
    pub fn save(&self, state: &LockoutState) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(state)?;
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        std::fs::write(&self.path, json).map_err(io_err)?;

        debug!(path = ?self.path, ?state, "security state saved");
        Ok(())
    }

    /// Read the snapshot, falling back to the default state on any failure
    pub fn load(&self) -> LockoutState {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = ?self.path, "no security state on disk");
                return LockoutState::default();
            }
            Err(e) => {
                warn!(path = ?self.path, error = %e, "failed to read security state, using defaults");
                return LockoutState::default();
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(state) => state,
            Err(e) => {
                warn!(path = ?self.path, error = %e, "malformed security state, using defaults");
                LockoutState::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("security_state.json"));
        let state = LockoutState {
            failed_attempts: 3,
            is_locked: true,
            lockdown_until: Some(Utc.with_ymd_and_hms(2026, 3, 1, 12, 30, 0).unwrap()),
        };

        store.save(&state).unwrap();
        assert_eq!(store.load(), state);
    }

    #[test]
    fn test_round_trip_subsecond_deadline() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        let until = Utc.with_ymd_and_hms(2026, 3, 1, 12, 30, 0).unwrap()
            + chrono::Duration::milliseconds(250);
        let state = LockoutState {
            failed_attempts: 3,
            is_locked: true,
            lockdown_until: Some(until),
        };

        store.save(&state).unwrap();
        assert_eq!(store.load(), state);
    }

    #[test]
    fn test_missing_file_loads_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("absent.json"));
        assert_eq!(store.load(), LockoutState::default());
    }

    #[test]
    fn test_malformed_file_loads_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("security_state.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(StateStore::new(&path).load(), LockoutState::default());

        std::fs::write(&path, r#"{"FailedAttempts":"three"}"#).unwrap();
        assert_eq!(StateStore::new(&path).load(), LockoutState::default());
    }

    #[test]
    fn test_save_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("nested").join("state.json"));
        store.save(&LockoutState::default()).unwrap();
        assert!(store.path().exists());
    }

    #[test]
    fn test_save_into_file_parent_fails() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();
        let store = StateStore::new(blocker.join("state.json"));
        assert!(matches!(store.save(&LockoutState::default()), Err(StoreError::Io { .. })));
    }
}
