//! ODR Entity Store
//!
//! Deduplicating accumulation of entity records and the policy that turns
//! them into fixture files.
//!
//! # Core Concepts
//!
//! - [`merge`]: key-based, first-write-wins deduplication
//! - [`EntityBuffers`]: in-memory accumulation per [`BufferKey`]
//! - [`Storage`]: port for the file system ([`FsStorage`], [`MemoryStorage`])
//! - [`Persister`]: read-merge-write with per-path locking and write suppression
//!
//! # Example
//!
//! ```rust,ignore
//! use odr_store::{FsStorage, Persister};
//! use std::sync::Arc;
//!
//! let persister = Persister::new(Arc::new(FsStorage::new()));
//! persister
//!     .write_entities(&target_dir, "Orders", None, records, &["ID".to_string()])
//!     .await?;
//! ```

#![warn(unreachable_pub)]

pub mod error;
pub mod merge;
pub mod persist;
pub mod storage;

pub use error::StorageError;
pub use merge::{dedup_key, merge, redact, BufferKey, EntityBuffers};
pub use persist::{entity_file_name, metadata_path, Persister, SaveMode, WriteOutcome};
pub use storage::{FsStorage, MemoryStorage, Storage};
