//! Error types for the recorder

use odr_edm::MetadataParseError;
use odr_payload::PayloadError;
use odr_store::StorageError;

/// Errors surfaced by the recorder and its control surface
///
/// Inside the pipeline every error is logged and drops only the unit of
/// work it belongs to; nothing propagates back to the response tap.
#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    /// Metadata document could not be read
    #[error("metadata error: {0}")]
    Metadata(#[from] MetadataParseError),

    /// Response body could not be handled
    #[error(transparent)]
    Payload(#[from] PayloadError),

    /// Storage operation failed
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Administrative action not recognised
    #[error("unknown control command: '{0}'")]
    UnknownControlCommand(String),

    /// Administrative parameter has an unusable value
    #[error("invalid value '{value}' for parameter '{name}'")]
    InvalidParameter {
        /// Parameter name
        name: String,
        /// Rejected value
        value: String,
    },

    /// Response or metadata for a service that is not configured
    #[error("unknown service alias: '{0}'")]
    UnknownService(String),

    /// Recorder task is no longer running
    #[error("recorder stopped")]
    RecorderStopped,

    /// Proactive metadata fetch failed
    #[error("metadata fetch for '{alias}' failed: {message}")]
    Fetch {
        /// Service alias
        alias: String,
        /// Failure description
        message: String,
    },
}

impl RecorderError {
    /// Create fetch error
    pub fn fetch(alias: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Fetch {
            alias: alias.into(),
            message: message.into(),
        }
    }

    /// Whether the error is the caller's fault on the administrative surface
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownControlCommand(_) | Self::InvalidParameter { .. } | Self::UnknownService(_)
        )
    }
}
