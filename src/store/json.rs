//! JSON file backings for [`KvStore`].

use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use tracing::debug;

use super::{KvStore, StoreError};

/// All records in a single pretty-printed JSON object file.
#[derive(Debug, Clone)]
pub struct JsonMapStore<V> {
    path: PathBuf,
    _marker: PhantomData<V>,
}

impl<V> JsonMapStore<V>
where
    V: Serialize + DeserializeOwned,
{
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _marker: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load every record. Missing or corrupt files load as empty.
    pub fn load_all(&self) -> BTreeMap<String, V> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(_) => return BTreeMap::new(),
        };
        match serde_json::from_str(&content) {
            Ok(map) => map,
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "ignoring unreadable store file");
                BTreeMap::new()
            }
        }
    }

    fn save_all(&self, records: &BTreeMap<String, V>) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(records)?;
        write_file(&self.path, &json)
    }
}

impl<V> KvStore<V> for JsonMapStore<V>
where
    V: Serialize + DeserializeOwned,
{
    fn get(&self, key: &str) -> Option<V> {
        self.load_all().remove(key)
    }

    fn put(&self, key: &str, value: &V) -> Result<(), StoreError> {
        let mut records: BTreeMap<String, serde_json::Value> = self
            .load_all()
            .into_iter()
            .map(|(k, v)| serde_json::to_value(v).map(|v| (k, v)))
            .collect::<Result<_, _>>()?;
        records.insert(key.to_string(), serde_json::to_value(value)?);
        let json = serde_json::to_string_pretty(&records)?;
        write_file(&self.path, &json)
    }

    fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut records = self.load_all();
        if records.remove(key).is_none() {
            return Ok(false);
        }
        self.save_all(&records)?;
        Ok(true)
    }
}

/// One JSON file per record, named by the SHA-256 of the key.
///
/// Hashing keeps file names short and filesystem-safe for arbitrary paths.
#[derive(Debug, Clone)]
pub struct JsonDirStore<V> {
    dir: PathBuf,
    _marker: PhantomData<V>,
}

impl<V> JsonDirStore<V>
where
    V: Serialize + DeserializeOwned,
{
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            _marker: PhantomData,
        }
    }

    /// File backing `key`.
    pub fn record_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", hash_key(key)))
    }
}

impl<V> KvStore<V> for JsonDirStore<V>
where
    V: Serialize + DeserializeOwned,
{
    fn get(&self, key: &str) -> Option<V> {
        let path = self.record_path(key);
        let content = std::fs::read_to_string(&path).ok()?;
        serde_json::from_str(&content)
            .map_err(|e| debug!(path = %path.display(), error = %e, "ignoring unreadable record"))
            .ok()
    }

    fn put(&self, key: &str, value: &V) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(value)?;
        write_file(&self.record_path(key), &json)
    }

    fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let path = self.record_path(key);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(StoreError::Remove {
                path: path.display().to_string(),
                source,
            }),
        }
    }
}

pub(crate) fn hash_key(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

fn write_file(path: &Path, content: &str) -> Result<(), StoreError> {
    let to_err = |source| StoreError::Write {
        path: path.display().to_string(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(to_err)?;
    }
    std::fs::write(path, content).map_err(to_err)?;
    debug!(path = %path.display(), bytes = content.len(), "store file written");
    Ok(())
}
