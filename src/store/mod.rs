//! Asynchronous key-value persistence
//!
//! A single JSON file holds every persisted structure: the current run, the
//! bounded run history, the tab correlation maps, and the configurable field
//! data. Reads and writes go through read-modify-write of the whole file;
//! writers are serialized by the run's own pacing, so no finer-grained
//! locking is needed.
//!
//! Run-time callers use the best-effort [`KvStore::get`]/[`KvStore::set`]
//! pair: persistence failures are logged and swallowed, never fatal to a run.
//! The CLI management commands use the `try_` variants and surface errors.

pub mod fields;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::PathBuf;
use thiserror::Error;

/// Storage keys, one per persisted structure
pub mod keys {
    pub const RUN_CURRENT: &str = "runCurrent";
    pub const RUN_HISTORY: &str = "runHistory";
    pub const FORM_TABS_BY_CASE: &str = "formTabsByCase";
    pub const DEBUG_TABS_BY_CASE: &str = "debugTabsByCase";
    pub const FIELD_VALUES: &str = "fieldValues";
    pub const CUSTOM_FIELDS: &str = "customFields";
    pub const TESTABLE_FIELDS: &str = "testableFields";
    pub const COUNTRIES: &str = "countries";
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// JSON-file-backed key-value store
#[derive(Clone, Debug)]
pub struct KvStore {
    path: PathBuf,
}

impl KvStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Platform data directory, e.g. `~/.local/share/txprobe/store.json`
    pub fn default_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("txprobe")
            .join("store.json")
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    pub async fn try_get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        let all = self.read_all().await?;
        match all.get(key) {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => Ok(None),
        }
    }

    pub async fn try_set<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let mut all = self.read_all().await.unwrap_or_default();
        all.insert(key.to_string(), serde_json::to_value(value)?);
        self.write_all(&all).await
    }

    pub async fn try_remove(&self, key: &str) -> Result<(), StoreError> {
        let mut all = self.read_all().await.unwrap_or_default();
        if all.remove(key).is_some() {
            self.write_all(&all).await?;
        }
        Ok(())
    }

    /// Best-effort read: any failure is logged and reads as absent
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.try_get(key).await {
            Ok(value) => value,
            Err(e) => {
                log::warn!("store read failed for '{key}': {e}");
                None
            }
        }
    }

    /// Best-effort write: any failure is logged and swallowed
    pub async fn set<T: Serialize>(&self, key: &str, value: &T) {
        if let Err(e) = self.try_set(key, value).await {
            log::warn!("store write failed for '{key}': {e}");
        }
    }

    /// Best-effort removal
    pub async fn remove(&self, key: &str) {
        if let Err(e) = self.try_remove(key).await {
            log::warn!("store remove failed for '{key}': {e}");
        }
    }

    async fn read_all(&self) -> Result<Map<String, Value>, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Map::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_all(&self, all: &Map<String, Value>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec_pretty(all)?;
        tokio::fs::write(&self.path, bytes).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, KvStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = KvStore::new(dir.path().join("store.json"));
        (dir, store)
    }

    #[tokio::test]
    async fn roundtrip_and_remove() {
        let (_dir, store) = temp_store();
        assert_eq!(store.get::<Vec<String>>(keys::COUNTRIES).await, None);

        store
            .set(keys::COUNTRIES, &vec!["Netherlands".to_string()])
            .await;
        assert_eq!(
            store.get::<Vec<String>>(keys::COUNTRIES).await,
            Some(vec!["Netherlands".to_string()])
        );

        store.remove(keys::COUNTRIES).await;
        assert_eq!(store.get::<Vec<String>>(keys::COUNTRIES).await, None);
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let (_dir, store) = temp_store();
        store.set(keys::RUN_CURRENT, &"a").await;
        store.set(keys::RUN_HISTORY, &vec!["b"]).await;
        store.remove(keys::RUN_CURRENT).await;
        assert_eq!(
            store.get::<Vec<String>>(keys::RUN_HISTORY).await,
            Some(vec!["b".to_string()])
        );
    }

    #[tokio::test]
    async fn corrupt_file_reads_as_error_but_best_effort_recovers() {
        let (_dir, store) = temp_store();
        tokio::fs::create_dir_all(store.path().parent().unwrap())
            .await
            .unwrap();
        tokio::fs::write(store.path(), b"not json").await.unwrap();

        assert!(store.try_get::<String>(keys::RUN_CURRENT).await.is_err());
        assert_eq!(store.get::<String>(keys::RUN_CURRENT).await, None);

        // a best-effort write replaces the corrupt file
        store.set(keys::RUN_CURRENT, &"fresh").await;
        assert_eq!(
            store.get::<String>(keys::RUN_CURRENT).await,
            Some("fresh".to_string())
        );
    }
}
