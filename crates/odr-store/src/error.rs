//! Error types for fixture storage

use std::path::PathBuf;

/// Failure of a single storage operation
///
/// Errors are scoped to one path; other pending writes are unaffected.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Read or write failed
    #[error("io error at {path}: {source}")]
    Io {
        /// File involved
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Records could not be serialized
    #[error("failed to serialize {path}: {source}")]
    Serialize {
        /// File that would have been written
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl StorageError {
    /// Create IO error for path
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Path the failed operation targeted
    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        match self {
            Self::Io { path, .. } | Self::Serialize { path, .. } => path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_names_path() {
        let err = StorageError::io(
            "/data/Orders.json",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(err.path(), std::path::Path::new("/data/Orders.json"));
        assert!(err.to_string().contains("/data/Orders.json"));
    }
}
