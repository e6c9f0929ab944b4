//! Persistent per-directory state.
//!
//! Two record kinds are stored, both keyed by canonical local path:
//!
//! - **connections** ([`ConnectionStore`]): durable, one JSON object file
//!   mapping path → [`ConnectionConfig`].
//! - **sessions** ([`SessionStore`]): ephemeral, one small JSON file per path
//!   under `sessions/`, named by a hash of the path.
//!
//! Both sit on the narrow [`KvStore`] interface so the JSON backing can be
//! swapped without touching callers. Reads never fail: a missing or corrupt
//! file reads as "no record". Writes rewrite whole files and are not
//! coordinated across processes (last writer wins).

pub mod connections;
pub mod json;
pub mod sessions;

use thiserror::Error;

pub use connections::{ConnectionConfig, ConnectionStore};
pub use json::{JsonDirStore, JsonMapStore};
pub use sessions::{SessionState, SessionStore};

/// Errors surfaced by store writes. Reads degrade to absence instead.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to remove {path}: {source}")]
    Remove {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Minimal key-value layer over string keys.
pub trait KvStore<V> {
    /// Fetch a record, `None` when absent or unreadable.
    fn get(&self, key: &str) -> Option<V>;

    /// Insert or replace a record.
    fn put(&self, key: &str, value: &V) -> Result<(), StoreError>;

    /// Remove a record. Returns whether one existed.
    fn delete(&self, key: &str) -> Result<bool, StoreError>;
}
