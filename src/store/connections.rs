//! Stored connection definitions, one per connected local directory.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{JsonMapStore, KvStore, StoreError};
use crate::paths;
use crate::target::{self, HostSpec};

/// Where a local directory syncs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    /// Absolute directory on the remote.
    pub remote_path: String,
    /// Derived from (host, port); re-derived when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_alias: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_milliseconds_option"
    )]
    pub last_connected: Option<DateTime<Utc>>,
}

impl ConnectionConfig {
    /// Build a config from a parsed target, filling in the derived alias.
    pub fn from_spec(spec: &HostSpec, remote_path: impl Into<String>) -> Self {
        Self {
            host: spec.host.clone(),
            port: spec.port,
            user: spec.user.clone(),
            remote_path: remote_path.into(),
            ssh_alias: Some(spec.alias()),
            last_connected: None,
        }
    }

    /// The SSH alias, deriving it when the stored record predates aliases.
    pub fn alias(&self) -> String {
        self.ssh_alias
            .clone()
            .unwrap_or_else(|| target::derive_alias(&self.host, self.port))
    }

    pub fn ssh_string(&self) -> String {
        target::ssh_string(&self.user, &self.host, self.port)
    }
}

/// Connection records keyed by canonical local path.
#[derive(Debug, Clone)]
pub struct ConnectionStore {
    backend: JsonMapStore<ConnectionConfig>,
}

impl ConnectionStore {
    pub fn new(file: impl Into<PathBuf>) -> Self {
        Self {
            backend: JsonMapStore::new(file),
        }
    }

    pub fn get(&self, local_path: &Path) -> Option<ConnectionConfig> {
        self.backend.get(&key_for(local_path))
    }

    pub fn save(&self, local_path: &Path, config: &ConnectionConfig) -> Result<(), StoreError> {
        let key = key_for(local_path);
        debug!(local_path = %key, alias = ?config.ssh_alias, "saving connection");
        self.backend.put(&key, config)
    }

    pub fn delete(&self, local_path: &Path) -> Result<bool, StoreError> {
        self.backend.delete(&key_for(local_path))
    }

    /// Nearest directory at or above `start` (up to and including `/`) with a
    /// stored connection.
    pub fn find_ancestor(&self, start: &Path) -> Option<(PathBuf, ConnectionConfig)> {
        let mut records = self.backend.load_all();
        if records.is_empty() {
            return None;
        }
        let start = paths::canonicalize(start);
        start.ancestors().find_map(|dir| {
            records
                .remove(dir.to_string_lossy().as_ref())
                .map(|config| (dir.to_path_buf(), config))
        })
    }
}

fn key_for(local_path: &Path) -> String {
    paths::canonicalize(local_path).to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> ConnectionConfig {
        ConnectionConfig {
            host: "10.0.0.5".into(),
            port: 2222,
            user: "alice".into(),
            remote_path: "/config/workspace/app".into(),
            ssh_alias: Some(target::derive_alias("10.0.0.5", 2222)),
            last_connected: None,
        }
    }

    #[test]
    fn test_get_save_delete_canonicalizes_keys() {
        let tmp = TempDir::new().unwrap();
        let store = ConnectionStore::new(tmp.path().join("connections.json"));
        let dir = tmp.path().join("work/app");
        std::fs::create_dir_all(&dir).unwrap();

        store.save(&dir, &sample()).unwrap();
        let dotted = tmp.path().join("work/./other/../app");
        assert_eq!(store.get(&dotted), Some(sample()));

        assert!(store.delete(&dotted).unwrap());
        assert_eq!(store.get(&dir), None);
    }

    #[test]
    fn test_find_ancestor() {
        let tmp = TempDir::new().unwrap();
        let store = ConnectionStore::new(tmp.path().join("connections.json"));
        store.save(Path::new("/a"), &sample()).unwrap();

        let (root, config) = store.find_ancestor(Path::new("/a/b/c")).unwrap();
        assert_eq!(root, PathBuf::from("/a"));
        assert_eq!(config, sample());
        assert!(store.find_ancestor(Path::new("/x/y")).is_none());
    }

    #[test]
    fn test_find_ancestor_prefers_nearest_and_includes_root() {
        let tmp = TempDir::new().unwrap();
        let store = ConnectionStore::new(tmp.path().join("connections.json"));
        let mut near = sample();
        near.remote_path = "/config/workspace/b".into();
        store.save(Path::new("/"), &sample()).unwrap();
        store.save(Path::new("/a/b"), &near).unwrap();

        let (root, config) = store.find_ancestor(Path::new("/a/b/c")).unwrap();
        assert_eq!(root, PathBuf::from("/a/b"));
        assert_eq!(config.remote_path, "/config/workspace/b");

        let (root, _) = store.find_ancestor(Path::new("/x/y")).unwrap();
        assert_eq!(root, PathBuf::from("/"));
    }

    #[test]
    fn test_missing_store_reads_as_absent() {
        let tmp = TempDir::new().unwrap();
        let store = ConnectionStore::new(tmp.path().join("nope/connections.json"));
        assert!(store.get(Path::new("/a")).is_none());
        assert!(store.find_ancestor(Path::new("/a")).is_none());
    }

    #[test]
    fn test_json_shape_is_camel_case_millis() {
        let mut config = sample();
        config.last_connected = DateTime::from_timestamp_millis(1_700_000_000_123);
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["remotePath"], "/config/workspace/app");
        assert_eq!(json["lastConnected"], 1_700_000_000_123i64);
        assert!(json.get("sshAlias").is_some());

        let legacy: ConnectionConfig = serde_json::from_str(
            r#"{"host":"h.example.com","port":22,"user":"abc","remotePath":"/r"}"#,
        )
        .unwrap();
        assert_eq!(legacy.ssh_alias, None);
        assert_eq!(legacy.alias(), target::derive_alias("h.example.com", 22));
        assert_eq!(legacy.ssh_string(), "abc@h.example.com");
    }
}
