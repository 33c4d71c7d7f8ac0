//! ODR Core
//!
//! Records live OData traffic into deduplicated JSON fixtures.
//!
//! # Architecture
//!
//! ```text
//! HTTP tap ──TapResponse──▶ RecorderHandle ──mpsc──▶ Recorder task
//!                               │                     ├─ $metadata ─▶ ParserRegistry
//!                               │                     ├─ $batch ────▶ split ─┐
//!                               │                     └─ JSON ───────────────┴▶ normalize
//!                               │                                               ▶ expand / enrich
//!                               │                                               ▶ redact ▶ store
//!                               └─ MetadataFetcher (spawned, one per alias)
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use odr_core::{Recorder, RecorderConfig, RecorderHandle, TapResponse};
//! use odr_edm::JsonSchemaReader;
//! use odr_store::FsStorage;
//! use std::sync::Arc;
//!
//! let recorder = Recorder::new(config, Arc::new(FsStorage::new()), Arc::new(JsonSchemaReader));
//! let handle = RecorderHandle::spawn(recorder);
//!
//! handle.start(Some("demo".into()), None).await?;
//! handle.submit(response)?;
//! let written = handle.stop().await?;
//! ```

#![warn(unreachable_pub)]

pub mod config;
pub mod control;
pub mod error;
pub mod fetch;
pub mod handle;
pub mod recorder;
pub mod registry;

pub use config::{extract_recording_id, RecorderConfig, ServiceConfig};
pub use control::{ControlAck, ControlCommand, ControlError, ControlResponse};
pub use error::RecorderError;
pub use fetch::{FetchAttempt, FetchAttemptTracker, MetadataFetcher};
pub use handle::RecorderHandle;
pub use recorder::{Recorder, RecorderStatus, TapResponse};
pub use registry::ParserRegistry;
