//! Administrative surface
//!
//! Parses control actions (`start`, `stop`, `status`, `flush`) and shapes
//! their JSON answers. Transport is left to the embedding server.

use crate::error::RecorderError;
use crate::recorder::RecorderStatus;
use odr_store::SaveMode;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Parsed control action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    /// Start a recording session
    Start {
        /// Requested recording id
        recording_id: Option<String>,
        /// Requested save mode; configured default when absent
        mode: Option<SaveMode>,
    },
    /// Flush and deactivate
    Stop,
    /// Report state
    Status,
    /// Flush without deactivating
    Flush,
}

impl ControlCommand {
    /// Parse an action name and its query parameters
    ///
    /// The action may carry leading or trailing slashes (`/start`).
    ///
    /// # Errors
    /// Returns [`RecorderError::UnknownControlCommand`] for an unknown action
    /// and [`RecorderError::InvalidParameter`] for an unknown `mode`.
    pub fn parse(action: &str, params: &HashMap<String, String>) -> Result<Self, RecorderError> {
        match action.trim_matches('/') {
            "start" => {
                let mode = params
                    .get("mode")
                    .filter(|mode| !mode.is_empty())
                    .map(|mode| {
                        mode.parse::<SaveMode>().map_err(|_| RecorderError::InvalidParameter {
                            name: "mode".to_string(),
                            value: mode.clone(),
                        })
                    })
                    .transpose()?;

                Ok(Self::Start {
                    recording_id: params.get("recordingId").cloned(),
                    mode,
                })
            }
            "stop" => Ok(Self::Stop),
            "status" => Ok(Self::Status),
            "flush" => Ok(Self::Flush),
            other => Err(RecorderError::UnknownControlCommand(other.to_string())),
        }
    }

    /// Action name
    #[must_use]
    pub fn action(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::Stop => "stop",
            Self::Status => "status",
            Self::Flush => "flush",
        }
    }
}

/// Acknowledgement of a state-changing action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ControlAck {
    /// Recording started
    #[serde(rename_all = "camelCase")]
    Started {
        /// Effective recording id
        recording_id: Option<String>,
        /// Effective save mode
        mode: SaveMode,
    },
    /// Recording stopped after flushing
    #[serde(rename_all = "camelCase")]
    Stopped {
        /// Entity sets written by the flush
        items_written: usize,
    },
    /// Buffers flushed
    #[serde(rename_all = "camelCase")]
    Flushed {
        /// Entity sets written
        items_written: usize,
    },
}

/// Answer to a control action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ControlResponse {
    /// `start`, `stop` and `flush`
    Ack(ControlAck),
    /// `status`
    Status(RecorderStatus),
}

/// Error body for a rejected control action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlError {
    /// Description of the failure
    pub error: String,
}

impl From<&RecorderError> for ControlError {
    fn from(err: &RecorderError) -> Self {
        Self {
            error: err.to_string(),
        }
    }
}
