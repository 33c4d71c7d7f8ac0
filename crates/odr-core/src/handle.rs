//! Single-writer recorder actor
//!
//! A [`Recorder`] runs on its own task and is reached through a
//! [`RecorderHandle`]. Every submission and control action travels through
//! one channel, so the recorder observes them in submission order and a
//! flush only answers after everything queued before it was processed.

use crate::config::RecorderConfig;
use crate::control::{ControlAck, ControlCommand, ControlResponse};
use crate::error::RecorderError;
use crate::fetch::{FetchAttemptTracker, MetadataFetcher};
use crate::recorder::{Recorder, RecorderStatus, TapResponse};
use crate::registry::ParserRegistry;
use odr_edm::{MetadataIndex, Schema};
use odr_store::SaveMode;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

type Reply<T> = oneshot::Sender<T>;

/// Messages handled by the recorder task
enum Command {
    Submit(Box<TapResponse>),
    Start {
        recording_id: Option<String>,
        mode: Option<SaveMode>,
        reply: Reply<(Option<String>, SaveMode)>,
    },
    Stop {
        reply: Reply<usize>,
    },
    Flush {
        reply: Reply<usize>,
    },
    Status {
        reply: Reply<RecorderStatus>,
    },
    LoadMetadata {
        alias: String,
        xml: String,
        reply: Reply<Result<Option<Arc<MetadataIndex>>, RecorderError>>,
    },
    LoadSchema {
        alias: String,
        schema: Box<Schema>,
        reply: Reply<Result<Arc<MetadataIndex>, RecorderError>>,
    },
    Shutdown {
        reply: Reply<()>,
    },
}

/// Cloneable handle to a running recorder
#[derive(Clone)]
pub struct RecorderHandle {
    sender: mpsc::UnboundedSender<Command>,
    config: Arc<RecorderConfig>,
    registry: ParserRegistry,
    tracker: FetchAttemptTracker,
    fetcher: Option<Arc<dyn MetadataFetcher>>,
}

impl std::fmt::Debug for RecorderHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecorderHandle")
            .field("resolved", &self.registry.aliases())
            .field("fetcher", &self.fetcher.is_some())
            .finish_non_exhaustive()
    }
}

impl RecorderHandle {
    /// Spawn the recorder task
    ///
    /// Must be called inside a tokio runtime.
    #[must_use]
    pub fn spawn(recorder: Recorder) -> Self {
        Self::spawn_inner(recorder, None)
    }

    /// Spawn the recorder task with a metadata fetcher
    ///
    /// With `auto_start` configured, metadata of every service is fetched
    /// right away.
    #[must_use]
    pub fn spawn_with_fetcher(recorder: Recorder, fetcher: Arc<dyn MetadataFetcher>) -> Self {
        let auto_start = recorder.config().auto_start;
        let handle = Self::spawn_inner(recorder, Some(fetcher));
        if auto_start {
            handle.fetch_missing_metadata();
        }
        handle
    }

    fn spawn_inner(recorder: Recorder, fetcher: Option<Arc<dyn MetadataFetcher>>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let config = Arc::clone(recorder.config());
        let registry = recorder.registry().clone();

        tokio::spawn(recorder_task(recorder, rx));

        Self {
            sender: tx,
            config,
            registry,
            tracker: FetchAttemptTracker::new(),
            fetcher,
        }
    }

    /// Shared metadata registry
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &ParserRegistry {
        &self.registry
    }

    /// Fetch attempt tracker
    #[inline]
    #[must_use]
    pub fn tracker(&self) -> &FetchAttemptTracker {
        &self.tracker
    }

    fn send(&self, command: Command) -> Result<(), RecorderError> {
        self.sender
            .send(command)
            .map_err(|_| RecorderError::RecorderStopped)
    }

    async fn request<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> Result<T, RecorderError> {
        let (reply, rx) = oneshot::channel();
        self.send(command(reply))?;
        rx.await.map_err(|_| RecorderError::RecorderStopped)
    }

    /// Queue a tapped response; returns without waiting for processing
    ///
    /// # Errors
    /// Returns [`RecorderError::RecorderStopped`] after shutdown.
    pub fn submit(&self, response: TapResponse) -> Result<(), RecorderError> {
        self.send(Command::Submit(Box::new(response)))
    }

    /// Start a recording session and fetch metadata still missing
    ///
    /// Returns the effective recording id and mode.
    ///
    /// # Errors
    /// Returns [`RecorderError::RecorderStopped`] after shutdown.
    pub async fn start(
        &self,
        recording_id: Option<String>,
        mode: Option<SaveMode>,
    ) -> Result<(Option<String>, SaveMode), RecorderError> {
        let started = self
            .request(|reply| Command::Start {
                recording_id,
                mode,
                reply,
            })
            .await?;
        self.fetch_missing_metadata();
        Ok(started)
    }

    /// Flush and deactivate; returns the number of entity sets written
    ///
    /// # Errors
    /// Returns [`RecorderError::RecorderStopped`] after shutdown.
    pub async fn stop(&self) -> Result<usize, RecorderError> {
        self.request(|reply| Command::Stop { reply }).await
    }

    /// Flush without deactivating; returns the number of entity sets written
    ///
    /// # Errors
    /// Returns [`RecorderError::RecorderStopped`] after shutdown.
    pub async fn flush(&self) -> Result<usize, RecorderError> {
        self.request(|reply| Command::Flush { reply }).await
    }

    /// Current state
    ///
    /// # Errors
    /// Returns [`RecorderError::RecorderStopped`] after shutdown.
    pub async fn status(&self) -> Result<RecorderStatus, RecorderError> {
        self.request(|reply| Command::Status { reply }).await
    }

    /// Persist and install a metadata document
    ///
    /// # Errors
    /// Returns the load failure, or [`RecorderError::RecorderStopped`].
    pub async fn load_metadata(
        &self,
        alias: impl Into<String>,
        xml: impl Into<String>,
    ) -> Result<Option<Arc<MetadataIndex>>, RecorderError> {
        let (alias, xml) = (alias.into(), xml.into());
        self.request(|reply| Command::LoadMetadata { alias, xml, reply })
            .await?
    }

    /// Install an already parsed schema
    ///
    /// # Errors
    /// Returns [`RecorderError::UnknownService`], or
    /// [`RecorderError::RecorderStopped`].
    pub async fn load_schema(
        &self,
        alias: impl Into<String>,
        schema: Schema,
    ) -> Result<Arc<MetadataIndex>, RecorderError> {
        let alias = alias.into();
        self.request(|reply| Command::LoadSchema {
            alias,
            schema: Box::new(schema),
            reply,
        })
        .await?
    }

    /// Run a parsed control action
    ///
    /// # Errors
    /// Returns [`RecorderError::RecorderStopped`] after shutdown.
    pub async fn execute(&self, command: ControlCommand) -> Result<ControlResponse, RecorderError> {
        debug!(action = command.action(), "control action");
        let response = match command {
            ControlCommand::Start { recording_id, mode } => {
                let (recording_id, mode) = self.start(recording_id, mode).await?;
                ControlResponse::Ack(ControlAck::Started { recording_id, mode })
            }
            ControlCommand::Stop => ControlResponse::Ack(ControlAck::Stopped {
                items_written: self.stop().await?,
            }),
            ControlCommand::Flush => ControlResponse::Ack(ControlAck::Flushed {
                items_written: self.flush().await?,
            }),
            ControlCommand::Status => ControlResponse::Status(self.status().await?),
        };
        Ok(response)
    }

    /// Stop the recorder task; unflushed buffers are discarded
    ///
    /// # Errors
    /// Returns [`RecorderError::RecorderStopped`] when already stopped.
    pub async fn shutdown(&self) -> Result<(), RecorderError> {
        self.request(|reply| Command::Shutdown { reply }).await
    }

    /// Fetch metadata for every service without a resolved index
    ///
    /// At most one attempt per alias is in flight; services already being
    /// fetched are skipped. Results are loaded through the recorder queue.
    /// Returns the spawned fetch tasks.
    pub fn fetch_missing_metadata(&self) -> Vec<JoinHandle<()>> {
        let Some(fetcher) = &self.fetcher else {
            return Vec::new();
        };

        let mut tasks = Vec::new();
        for service in &self.config.services {
            if self.registry.contains(&service.alias) {
                debug!(alias = %service.alias, "metadata already loaded");
                continue;
            }
            let Some(attempt) = self.tracker.try_begin(&service.alias) else {
                debug!(alias = %service.alias, "metadata fetch already in flight");
                continue;
            };

            let fetcher = Arc::clone(fetcher);
            let handle = self.clone();
            let service = service.clone();

            tasks.push(tokio::spawn(async move {
                let xml = match fetcher.fetch(&service).await {
                    Ok(xml) => xml,
                    Err(err) => {
                        warn!(alias = %attempt.alias(), %err, "failed to proactively load metadata");
                        return;
                    }
                };
                match handle.load_metadata(service.alias.clone(), xml).await {
                    Ok(Some(_)) => info!(alias = %attempt.alias(), "proactively loaded metadata"),
                    Ok(None) => debug!(alias = %attempt.alias(), "fetched metadata was empty"),
                    Err(err) => warn!(alias = %attempt.alias(), %err, "failed to proactively load metadata"),
                }
            }));
        }
        tasks
    }
}

async fn recorder_task(mut recorder: Recorder, mut rx: mpsc::UnboundedReceiver<Command>) {
    while let Some(command) = rx.recv().await {
        match command {
            Command::Submit(response) => recorder.handle(*response).await,
            Command::Start {
                recording_id,
                mode,
                reply,
            } => {
                let _ = reply.send(recorder.start(recording_id.as_deref(), mode));
            }
            Command::Stop { reply } => {
                let _ = reply.send(recorder.stop().await);
            }
            Command::Flush { reply } => {
                let _ = reply.send(recorder.flush().await);
            }
            Command::Status { reply } => {
                let _ = reply.send(recorder.status());
            }
            Command::LoadMetadata { alias, xml, reply } => {
                let result = recorder.load_metadata_for(&alias, &xml).await;
                if let Err(err) = &result {
                    warn!(alias = %alias, %err, "metadata not loaded");
                }
                let _ = reply.send(result);
            }
            Command::LoadSchema { alias, schema, reply } => {
                let _ = reply.send(recorder.load_schema(&alias, *schema));
            }
            Command::Shutdown { reply } => {
                let _ = reply.send(());
                break;
            }
        }
    }
    debug!("recorder task finished");
}
