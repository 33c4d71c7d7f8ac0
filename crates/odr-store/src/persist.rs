//! Persistence policy
//!
//! Entity files are read, merged and rewritten under a per-path lock, and
//! only when the serialized result differs byte-for-byte from what is
//! already stored. Metadata documents follow the same suppression rule.

use crate::error::StorageError;
use crate::merge::merge;
use crate::storage::Storage;
use dashmap::DashMap;
use odr_edm::EntityRecord;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

/// When captured records reach storage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SaveMode {
    /// Every response is merged into its file immediately
    #[default]
    Stream,
    /// Records are buffered until flush or stop
    OnStop,
}

impl SaveMode {
    /// Configuration label (`stream` / `onStop`)
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SaveMode::Stream => "stream",
            SaveMode::OnStop => "onStop",
        }
    }
}

impl fmt::Display for SaveMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SaveMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stream" => Ok(SaveMode::Stream),
            "onStop" => Ok(SaveMode::OnStop),
            other => Err(format!("unknown save mode: '{other}'")),
        }
    }
}

/// Result of a suppressible write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Storage was written
    Written,
    /// Content was identical; nothing written
    Unchanged,
}

/// Fixture file name for an entity set: `<set>[-<id>].json`
#[must_use]
pub fn entity_file_name(entity_set: &str, recording_id: Option<&str>) -> String {
    match recording_id {
        Some(id) => format!("{entity_set}-{id}.json"),
        None => format!("{entity_set}.json"),
    }
}

/// Metadata location for a service: next to its data directory
#[must_use]
pub fn metadata_path(target_dir: &Path) -> PathBuf {
    target_dir
        .parent()
        .unwrap_or(target_dir)
        .join("metadata.xml")
}

/// Writes fixtures through a [`Storage`] with per-path serialization
#[derive(Clone)]
pub struct Persister {
    storage: Arc<dyn Storage>,
    locks: Arc<DashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl fmt::Debug for Persister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Persister")
            .field("locked_paths", &self.locks.len())
            .finish_non_exhaustive()
    }
}

impl Persister {
    /// Create persister over a storage adapter
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            locks: Arc::new(DashMap::new()),
        }
    }

    /// Underlying storage
    #[inline]
    #[must_use]
    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    async fn lock(&self, path: &Path) -> OwnedMutexGuard<()> {
        let lock = self.locks.entry(path.to_path_buf()).or_default().clone();
        lock.lock_owned().await
    }

    /// Merge `entities` into the entity file and write it if it changed
    ///
    /// An existing file that is not a JSON array of objects is treated as
    /// empty and overwritten.
    ///
    /// # Errors
    /// Returns [`StorageError`] when reading or writing the file fails.
    pub async fn write_entities(
        &self,
        target_dir: &Path,
        entity_set: &str,
        recording_id: Option<&str>,
        entities: Vec<EntityRecord>,
        keys: &[String],
    ) -> Result<WriteOutcome, StorageError> {
        let file_name = entity_file_name(entity_set, recording_id);
        let path = target_dir.join(&file_name);
        let _guard = self.lock(&path).await;

        let current = self.storage.read_file(&path).await?;
        let existing = match current.as_deref() {
            Some(text) => serde_json::from_str::<Vec<EntityRecord>>(text).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "could not parse existing entity file, overwriting");
                Vec::new()
            }),
            None => Vec::new(),
        };

        let merged = merge(existing, entities, keys);
        let content = serde_json::to_string_pretty(&merged).map_err(|source| {
            StorageError::Serialize {
                path: path.clone(),
                source,
            }
        })?;

        if current.as_deref() == Some(content.as_str()) {
            debug!(file = %file_name, "skipping entity write, content unchanged");
            return Ok(WriteOutcome::Unchanged);
        }

        self.storage.write_file(&path, &content).await?;
        info!(file = %file_name, entities = merged.len(), "updated entities");
        Ok(WriteOutcome::Written)
    }

    /// Write a metadata document next to the service's data directory
    ///
    /// # Errors
    /// Returns [`StorageError`] when reading or writing the file fails.
    pub async fn write_metadata(
        &self,
        target_dir: &Path,
        xml: &str,
    ) -> Result<WriteOutcome, StorageError> {
        let path = metadata_path(target_dir);
        let _guard = self.lock(&path).await;

        if self.storage.read_file(&path).await?.as_deref() == Some(xml) {
            debug!(path = %path.display(), "skipping metadata write, content unchanged");
            return Ok(WriteOutcome::Unchanged);
        }

        self.storage.write_file(&path, xml).await?;
        info!(path = %path.display(), bytes = xml.len(), "updated metadata");
        Ok(WriteOutcome::Written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{FsStorage, MemoryStorage};
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    fn record(value: Value) -> EntityRecord {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn id_key() -> Vec<String> {
        vec!["ID".to_string()]
    }

    #[test]
    fn file_names() {
        assert_eq!(entity_file_name("Orders", None), "Orders.json");
        assert_eq!(entity_file_name("Orders", Some("demo")), "Orders-demo.json");
        assert_eq!(
            metadata_path(Path::new("webapp/localService/mainService/data")),
            PathBuf::from("webapp/localService/mainService/metadata.xml")
        );
    }

    #[test]
    fn save_mode_labels() {
        assert_eq!(serde_json::to_string(&SaveMode::OnStop).unwrap(), "\"onStop\"");
        assert_eq!("stream".parse::<SaveMode>().unwrap(), SaveMode::Stream);
        assert!("later".parse::<SaveMode>().is_err());
    }

    #[tokio::test]
    async fn identical_content_is_written_once() {
        let storage = Arc::new(MemoryStorage::new());
        let persister = Persister::new(storage.clone());
        let dir = Path::new("/svc/data");

        for _ in 0..2 {
            persister
                .write_entities(dir, "Orders", None, vec![record(json!({"ID": 1}))], &id_key())
                .await
                .unwrap();
        }

        assert_eq!(storage.write_count(), 1);
        let text = storage.get("/svc/data/Orders.json").unwrap();
        assert_eq!(text, "[\n  {\n    \"ID\": 1\n  }\n]");
    }

    #[tokio::test]
    async fn second_write_reports_unchanged() {
        let persister = Persister::new(Arc::new(MemoryStorage::new()));
        let dir = Path::new("/svc/data");
        let records = vec![record(json!({"ID": 1}))];

        let first = persister
            .write_entities(dir, "Orders", Some("r1"), records.clone(), &id_key())
            .await
            .unwrap();
        let second = persister
            .write_entities(dir, "Orders", Some("r1"), records, &id_key())
            .await
            .unwrap();

        assert_eq!(first, WriteOutcome::Written);
        assert_eq!(second, WriteOutcome::Unchanged);
    }

    #[tokio::test]
    async fn merges_with_existing_file() {
        let storage = Arc::new(MemoryStorage::new());
        storage.insert("/svc/data/Orders.json", r#"[{"ID": 1, "name": "old"}]"#);
        let persister = Persister::new(storage.clone());

        persister
            .write_entities(
                Path::new("/svc/data"),
                "Orders",
                None,
                vec![record(json!({"ID": 1, "name": "new"})), record(json!({"ID": 2}))],
                &id_key(),
            )
            .await
            .unwrap();

        let stored: Vec<EntityRecord> =
            serde_json::from_str(&storage.get("/svc/data/Orders.json").unwrap()).unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0]["name"], json!("old"));
    }

    #[tokio::test]
    async fn invalid_existing_file_is_overwritten() {
        let storage = Arc::new(MemoryStorage::new());
        storage.insert("/svc/data/Orders.json", "{not json");
        let persister = Persister::new(storage.clone());

        let outcome = persister
            .write_entities(
                Path::new("/svc/data"),
                "Orders",
                None,
                vec![record(json!({"ID": 1}))],
                &id_key(),
            )
            .await
            .unwrap();

        assert_eq!(outcome, WriteOutcome::Written);
        let stored: Vec<EntityRecord> =
            serde_json::from_str(&storage.get("/svc/data/Orders.json").unwrap()).unwrap();
        assert_eq!(stored.len(), 1);
    }

    #[tokio::test]
    async fn metadata_write_suppression() {
        let storage = Arc::new(MemoryStorage::new());
        let persister = Persister::new(storage.clone());
        let dir = Path::new("/app/localService/main/data");
        let xml = "<?xml version=\"1.0\"?><edmx:Edmx/>";

        assert_eq!(persister.write_metadata(dir, xml).await.unwrap(), WriteOutcome::Written);
        assert_eq!(persister.write_metadata(dir, xml).await.unwrap(), WriteOutcome::Unchanged);
        assert_eq!(storage.write_count(), 1);
        assert_eq!(
            storage.get("/app/localService/main/metadata.xml").as_deref(),
            Some(xml)
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writes_to_same_file_are_serialized() {
        let dir = tempfile::tempdir().unwrap();
        let persister = Persister::new(Arc::new(FsStorage::new()));

        let tasks: Vec<_> = (0..16)
            .map(|id| {
                let persister = persister.clone();
                let target = dir.path().to_path_buf();
                tokio::spawn(async move {
                    persister
                        .write_entities(&target, "Orders", None, vec![record(json!({"ID": id}))], &id_key())
                        .await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let text = tokio::fs::read_to_string(dir.path().join("Orders.json")).await.unwrap();
        let stored: Vec<EntityRecord> = serde_json::from_str(&text).unwrap();
        assert_eq!(stored.len(), 16);
    }
}
