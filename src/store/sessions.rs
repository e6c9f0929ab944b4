//! Ephemeral session records.
//!
//! A record exists while a directory is connected. It is written on a
//! successful connect and removed on disconnect; a crash can leave a stale
//! record behind, so callers treat the record as a hint and absence as
//! "not connected".

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{JsonDirStore, KvStore, StoreError};
use crate::paths;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub connected: bool,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub start_time: DateTime<Utc>,
    /// Idle timeout in milliseconds; zero disables it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle_timeout: Option<u64>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        alias = "mutagenSessionId"
    )]
    pub sync_session_id: Option<String>,
}

impl SessionState {
    /// A freshly connected session starting now.
    pub fn started_now(idle_timeout: Option<Duration>) -> Self {
        Self {
            connected: true,
            start_time: Utc::now(),
            idle_timeout: idle_timeout.map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
            sync_session_id: None,
        }
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout.map(Duration::from_millis)
    }

    /// Time since the session started, clamped at zero for clock skew.
    pub fn elapsed(&self) -> Duration {
        (Utc::now() - self.start_time).to_std().unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct SessionStore {
    backend: JsonDirStore<SessionState>,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            backend: JsonDirStore::new(dir),
        }
    }

    pub fn load(&self, local_path: &Path) -> Option<SessionState> {
        self.backend.get(&key_for(local_path))
    }

    pub fn save(&self, local_path: &Path, state: &SessionState) -> Result<(), StoreError> {
        self.backend.put(&key_for(local_path), state)
    }

    /// Remove the record; absence is not an error.
    pub fn delete(&self, local_path: &Path) -> Result<(), StoreError> {
        self.backend.delete(&key_for(local_path)).map(|_| ())
    }

    /// The file a session for `local_path` lives in.
    pub fn file_for(&self, local_path: &Path) -> PathBuf {
        self.backend.record_path(&key_for(local_path))
    }
}

fn key_for(local_path: &Path) -> String {
    paths::canonicalize(local_path).to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_save_load_delete() {
        let tmp = TempDir::new().unwrap();
        let store = SessionStore::new(tmp.path().join("sessions"));
        let state = SessionState::started_now(Some(Duration::from_secs(1800)));

        store.save(Path::new("/work/app"), &state).unwrap();
        assert!(store.file_for(Path::new("/work/app")).exists());

        let loaded = store.load(Path::new("/work/./app")).unwrap();
        assert!(loaded.connected);
        assert_eq!(loaded.idle_timeout(), Some(Duration::from_secs(1800)));
        assert_eq!(
            loaded.start_time.timestamp_millis(),
            state.start_time.timestamp_millis()
        );

        store.delete(Path::new("/work/app")).unwrap();
        assert!(store.load(Path::new("/work/app")).is_none());
        store.delete(Path::new("/work/app")).unwrap();
    }

    #[test]
    fn test_huge_idle_timeout_saturates() {
        let state = SessionState::started_now(Some(Duration::from_secs(u64::MAX)));
        assert_eq!(state.idle_timeout, Some(u64::MAX));
    }

    #[test]
    fn test_distinct_paths_use_distinct_files() {
        let tmp = TempDir::new().unwrap();
        let store = SessionStore::new(tmp.path());
        assert_ne!(
            store.file_for(Path::new("/work/a")),
            store.file_for(Path::new("/work/b"))
        );
    }

    #[test]
    fn test_reads_legacy_field_names() {
        let state: SessionState = serde_json::from_str(
            r#"{"connected":true,"startTime":1700000000000,"mutagenSessionId":"sync_abc"}"#,
        )
        .unwrap();
        assert_eq!(state.sync_session_id.as_deref(), Some("sync_abc"));
        assert_eq!(state.idle_timeout, None);
    }
}
