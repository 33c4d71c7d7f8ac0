//! Storage port and its adapters
//!
//! The recorder never touches the file system directly; everything goes
//! through [`Storage`]. [`FsStorage`] writes real files, [`MemoryStorage`]
//! keeps them in memory and counts writes.

use crate::error::StorageError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Text file storage port
#[async_trait]
pub trait Storage: Send + Sync {
    /// Write `text` to `path`, creating parent directories
    ///
    /// # Errors
    /// Returns [`StorageError::Io`] when the write fails.
    async fn write_file(&self, path: &Path, text: &str) -> Result<(), StorageError>;

    /// Read `path`; `None` when the file does not exist
    ///
    /// # Errors
    /// Returns [`StorageError::Io`] when the file exists but cannot be read.
    async fn read_file(&self, path: &Path) -> Result<Option<String>, StorageError>;

    /// Whether `path` exists
    async fn file_exists(&self, path: &Path) -> bool;
}

/// File-system storage backed by `tokio::fs`
#[derive(Debug, Clone, Copy, Default)]
pub struct FsStorage;

impl FsStorage {
    /// Create file-system storage
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Storage for FsStorage {
    async fn write_file(&self, path: &Path, text: &str) -> Result<(), StorageError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::io(parent, e))?;
        }
        tokio::fs::write(path, text)
            .await
            .map_err(|e| StorageError::io(path, e))
    }

    async fn read_file(&self, path: &Path) -> Result<Option<String>, StorageError> {
        match tokio::fs::read_to_string(path).await {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::io(path, e)),
        }
    }

    async fn file_exists(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }
}

/// In-memory storage with a write counter
#[derive(Debug, Default)]
pub struct MemoryStorage {
    files: Mutex<HashMap<PathBuf, String>>,
    writes: AtomicUsize,
}

impl MemoryStorage {
    /// Create empty storage
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a file without counting it as a write
    pub fn insert(&self, path: impl Into<PathBuf>, text: impl Into<String>) {
        self.files.lock().insert(path.into(), text.into());
    }

    /// Current content of a file
    #[must_use]
    pub fn get(&self, path: impl AsRef<Path>) -> Option<String> {
        self.files.lock().get(path.as_ref()).cloned()
    }

    /// All stored paths, sorted
    #[must_use]
    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<_> = self.files.lock().keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Number of `write_file` calls so far
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn write_file(&self, path: &Path, text: &str) -> Result<(), StorageError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.files.lock().insert(path.to_path_buf(), text.to_string());
        Ok(())
    }

    async fn read_file(&self, path: &Path) -> Result<Option<String>, StorageError> {
        Ok(self.get(path))
    }

    async fn file_exists(&self, path: &Path) -> bool {
        self.files.lock().contains_key(path)
    }
}
