//! Traffic-to-fixture pipeline
//!
//! [`Recorder`] owns the recording state and turns tapped responses into
//! entity files. It is driven by exactly one task (see
//! [`RecorderHandle`](crate::RecorderHandle)), so buffer merges apply in
//! submission order without further locking.

use crate::config::{RecorderConfig, ServiceConfig};
use crate::error::RecorderError;
use crate::registry::ParserRegistry;
use futures::future::join_all;
use indexmap::IndexMap;
use odr_edm::{
    sniff_metadata, EntityRecord, MetadataIndex, MetadataParseError, ODataVersion, Schema,
    SchemaReader,
};
use odr_payload::{extract_entity_set, normalize, parse_body, split, ExpansionPolicy};
use odr_store::{redact, BufferKey, EntityBuffers, Persister, SaveMode, Storage};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// A decoded response as delivered by the HTTP tap
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TapResponse {
    /// Request path, including query string
    pub request_path: String,
    /// URL prefix of the matched service
    pub service_base_path: String,
    /// Alias of the matched service; empty to match by base path
    #[serde(default)]
    pub service_alias: String,
    /// Protocol generation of the service
    pub odata_version: ODataVersion,
    /// HTTP status of the response
    pub status_code: u16,
    /// `Content-Type` response header
    #[serde(default)]
    pub content_type: String,
    /// Decompressed body text
    #[serde(default)]
    pub body: String,
    /// Request addressed `$metadata`
    #[serde(default)]
    pub is_metadata: bool,
    /// Request addressed `$batch`
    #[serde(default)]
    pub is_batch: bool,
}

impl TapResponse {
    /// Create a `200 application/json` response for a configured service
    #[must_use]
    pub fn json(service: &ServiceConfig, request_path: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            request_path: request_path.into(),
            service_base_path: service.base_path.clone(),
            service_alias: service.alias.clone(),
            odata_version: service.version,
            status_code: 200,
            content_type: "application/json".to_string(),
            body: body.into(),
            is_metadata: false,
            is_batch: false,
        }
    }

    /// Create a `200` metadata response for a configured service
    #[must_use]
    pub fn metadata(service: &ServiceConfig, xml: impl Into<String>) -> Self {
        Self {
            request_path: format!("{}$metadata", service.base_path),
            content_type: "application/xml".to_string(),
            is_metadata: true,
            ..Self::json(service, "", xml)
        }
    }

    /// Create a `200` batch response for a configured service
    #[must_use]
    pub fn batch(service: &ServiceConfig, content_type: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            request_path: format!("{}$batch", service.base_path),
            content_type: content_type.into(),
            is_batch: true,
            ..Self::json(service, "", body)
        }
    }

    /// With status code
    #[inline]
    #[must_use]
    pub fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = status_code;
        self
    }

    /// With content type
    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }
}

/// Snapshot reported by the `status` control action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecorderStatus {
    /// Recording is active
    pub active: bool,
    /// Current recording id
    pub recording_id: Option<String>,
    /// Current save mode
    pub mode: SaveMode,
    /// Buffered targets, rendered as `alias|recordingId|entitySet`
    pub buffered_keys: Vec<String>,
}

/// Recording session state and pipeline
pub struct Recorder {
    config: Arc<RecorderConfig>,
    registry: ParserRegistry,
    reader: Arc<dyn SchemaReader>,
    persister: Persister,
    policy: ExpansionPolicy,
    active: bool,
    mode: SaveMode,
    recording_id: Option<String>,
    buffers: EntityBuffers,
}

impl std::fmt::Debug for Recorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recorder")
            .field("active", &self.active)
            .field("mode", &self.mode)
            .field("recording_id", &self.recording_id)
            .field("buffered", &self.buffers.len())
            .field("reader", &self.reader.name())
            .finish_non_exhaustive()
    }
}

impl Recorder {
    /// Create recorder
    ///
    /// With `auto_start` set the recorder is active immediately, using the
    /// configured default recording id and save mode.
    #[must_use]
    pub fn new(config: RecorderConfig, storage: Arc<dyn Storage>, reader: Arc<dyn SchemaReader>) -> Self {
        let policy = config.expansion_policy();
        let active = config.auto_start;
        let mode = config.auto_save;
        let recording_id = config.default_recording_id.clone();

        if active {
            info!(recording_id = ?recording_id, %mode, "recording auto-started");
        }

        Self {
            config: Arc::new(config),
            registry: ParserRegistry::new(),
            reader,
            persister: Persister::new(storage),
            policy,
            active,
            mode,
            recording_id,
            buffers: EntityBuffers::new(),
        }
    }

    /// With shared metadata registry
    #[must_use]
    pub fn with_registry(mut self, registry: ParserRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &Arc<RecorderConfig> {
        &self.config
    }

    /// Metadata registry
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &ParserRegistry {
        &self.registry
    }

    /// Whether recording is active
    #[inline]
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Start a recording session
    ///
    /// Clears every buffer. Returns the effective recording id and mode.
    pub fn start(&mut self, recording_id: Option<&str>, mode: Option<SaveMode>) -> (Option<String>, SaveMode) {
        self.recording_id = self.config.recording_id(recording_id);
        self.mode = mode.unwrap_or(self.config.auto_save);
        self.buffers.clear();
        self.active = true;

        info!(recording_id = ?self.recording_id, mode = %self.mode, "recording active");
        (self.recording_id.clone(), self.mode)
    }

    /// Flush every buffer and deactivate
    ///
    /// Returns the number of entity sets written.
    pub async fn stop(&mut self) -> usize {
        let written = self.flush().await;
        self.active = false;
        info!(written, "recording stopped");
        written
    }

    /// Write every buffer to storage and clear the buffers
    ///
    /// All writes run concurrently and are joined before returning. A
    /// failing write is logged and does not affect the others. Returns the
    /// number of entity sets written successfully.
    pub async fn flush(&mut self) -> usize {
        let drained = self.buffers.drain();
        if drained.is_empty() {
            return 0;
        }
        info!(entity_sets = drained.len(), "flushing buffered entity sets");

        let writes = drained.into_iter().filter_map(|(key, records)| {
            let Some(service) = self.config.service(&key.alias) else {
                warn!(buffer = %key, "buffered entity set has no configured service, dropping");
                return None;
            };
            let target_dir = service.target_dir.clone();
            let keys = self.keys_for(&key.alias, &key.entity_set);
            let persister = self.persister.clone();

            Some(async move {
                let result = persister
                    .write_entities(
                        &target_dir,
                        &key.entity_set,
                        key.recording_id.as_deref(),
                        records,
                        &keys,
                    )
                    .await;
                (key, result)
            })
        });

        let mut written = 0;
        for (key, result) in join_all(writes).await {
            match result {
                Ok(_) => written += 1,
                Err(err) => error!(buffer = %key, %err, "failed to write buffered entities"),
            }
        }

        info!(written, "flush complete");
        written
    }

    /// Current state
    #[must_use]
    pub fn status(&self) -> RecorderStatus {
        RecorderStatus {
            active: self.active,
            recording_id: self.recording_id.clone(),
            mode: self.mode,
            buffered_keys: self.buffers.keys().map(ToString::to_string).collect(),
        }
    }

    /// Process one tapped response
    ///
    /// Never fails: every error is logged and drops only this response.
    pub async fn handle(&mut self, response: TapResponse) {
        if let Err(err) = self.process(&response).await {
            warn!(
                alias = %response.service_alias,
                path = %response.request_path,
                %err,
                "dropping response"
            );
        }
    }

    /// Process one tapped response, surfacing the first error
    ///
    /// # Errors
    /// Returns [`RecorderError`] when the response cannot be recorded.
    pub async fn process(&mut self, response: &TapResponse) -> Result<(), RecorderError> {
        if !self.active {
            debug!(path = %response.request_path, "not recording, skipping");
            return Ok(());
        }

        let config = Arc::clone(&self.config);
        let service = config
            .resolve_service(&response.service_alias, &response.request_path)
            .ok_or_else(|| RecorderError::UnknownService(response.service_alias.clone()))?;

        match response.status_code {
            401 | 403 => {
                warn!(
                    status = response.status_code,
                    path = %response.request_path,
                    "skipping recording due to authentication error, please authenticate first"
                );
                return Ok(());
            }
            status if status >= 400 => {
                warn!(status, path = %response.request_path, "skipping recording due to error response");
                return Ok(());
            }
            _ => {}
        }

        if response.is_metadata {
            if response.status_code == 304 {
                warn!(alias = %service.alias, "received 304 for metadata, caching headers were not removed");
                return Ok(());
            }
            return self.load_metadata(service, &response.body).await.map(|_| ());
        }

        if response.is_batch {
            let items = split(&response.body, &response.content_type, service.version);
            debug!(alias = %service.alias, items = items.len(), "batch items parsed");

            for item in &items {
                if item.status_code >= 400 {
                    debug!(url = %item.url, status = item.status_code, "skipping failed batch item");
                    continue;
                }
                if let Err(err) = self.process_single(service, &item.url, &item.body).await {
                    warn!(alias = %service.alias, url = %item.url, %err, "dropping batch item");
                }
            }

            info!(alias = %service.alias, items = items.len(), "processed batch items");
            return Ok(());
        }

        if response.content_type.contains("application/json") {
            return self
                .process_single(service, &response.request_path, &response.body)
                .await;
        }

        debug!(
            path = %response.request_path,
            content_type = %response.content_type,
            "not a JSON response, skipping"
        );
        Ok(())
    }

    async fn process_single(
        &mut self,
        service: &ServiceConfig,
        url: &str,
        body: &str,
    ) -> Result<(), RecorderError> {
        let parsed = parse_body(url, body)?;

        let Some(entity_set) = extract_entity_set(url, &service.base_path) else {
            debug!(url, "no entity set in URL, skipping");
            return Ok(());
        };

        let mut entities = normalize(parsed, service.version);
        if entities.is_empty() {
            debug!(url, entity_set = %entity_set, "no entities in response");
            return Ok(());
        }

        let index = self.registry.get(&service.alias);
        let related = self
            .policy
            .apply(&entity_set, &mut entities, service.version, index.as_deref());

        let mut by_target: IndexMap<String, Vec<EntityRecord>> = IndexMap::new();
        for result in related {
            by_target
                .entry(result.target_entity_set)
                .or_default()
                .extend(result.entities);
        }

        let captured = entities.len();
        let entities = self.redact_all(entities);
        self.store(service, &entity_set, entities).await;
        info!(
            alias = %service.alias,
            entity_set = %entity_set,
            entities = captured,
            recording_id = ?self.recording_id,
            "captured entities"
        );

        for (target, records) in by_target {
            let captured = records.len();
            let records = self.redact_all(records);
            self.store(service, &target, records).await;
            info!(
                alias = %service.alias,
                entity_set = %target,
                entities = captured,
                recording_id = ?self.recording_id,
                "captured expanded entities"
            );
        }

        Ok(())
    }

    fn redact_all(&self, records: Vec<EntityRecord>) -> Vec<EntityRecord> {
        if self.config.redact.is_empty() {
            return records;
        }
        records
            .iter()
            .map(|record| redact(record, &self.config.redact))
            .collect()
    }

    async fn store(&mut self, service: &ServiceConfig, entity_set: &str, records: Vec<EntityRecord>) {
        let keys = self.keys_for(&service.alias, entity_set);

        match self.mode {
            SaveMode::Stream => {
                let result = self
                    .persister
                    .write_entities(
                        &service.target_dir,
                        entity_set,
                        self.recording_id.as_deref(),
                        records,
                        &keys,
                    )
                    .await;
                if let Err(err) = result {
                    error!(alias = %service.alias, entity_set, %err, "failed to write entities");
                }
            }
            SaveMode::OnStop => {
                let key = BufferKey::new(&service.alias, self.recording_id.clone(), entity_set);
                let added = self.buffers.merge(key, records, &keys);
                debug!(alias = %service.alias, entity_set, added, "buffered entities");
            }
        }
    }

    fn keys_for(&self, alias: &str, entity_set: &str) -> Vec<String> {
        self.registry
            .get(alias)
            .map(|index| index.keys_for_entity_set(entity_set))
            .unwrap_or_default()
    }

    /// Persist and install a metadata document for a configured service
    ///
    /// The document is written before parsing so it is kept even when the
    /// reader rejects it. A parse failure leaves the previous index in place.
    /// Returns the installed index, or `None` for an empty body.
    ///
    /// # Errors
    /// Returns [`RecorderError::UnknownService`] for an unconfigured alias
    /// and [`RecorderError::Metadata`] when the body is not a readable
    /// metadata document.
    pub async fn load_metadata_for(
        &mut self,
        alias: &str,
        xml: &str,
    ) -> Result<Option<Arc<MetadataIndex>>, RecorderError> {
        let config = Arc::clone(&self.config);
        let service = config
            .service(alias)
            .ok_or_else(|| RecorderError::UnknownService(alias.to_string()))?;
        self.load_metadata(service, xml).await
    }

    async fn load_metadata(
        &mut self,
        service: &ServiceConfig,
        xml: &str,
    ) -> Result<Option<Arc<MetadataIndex>>, RecorderError> {
        if xml.trim().is_empty() {
            debug!(alias = %service.alias, "skipping metadata, empty body");
            return Ok(None);
        }
        if !sniff_metadata(xml) {
            return Err(MetadataParseError::NotMetadata(format!(
                "body for '{}' is not XML",
                service.alias
            ))
            .into());
        }

        if self.config.write_metadata {
            if let Err(err) = self.persister.write_metadata(&service.target_dir, xml).await {
                error!(alias = %service.alias, %err, "failed to write metadata");
            }
        }

        let schema = self.reader.read(xml)?;
        Ok(Some(self.install(&service.alias, schema)))
    }

    /// Install an already parsed schema for `alias`
    ///
    /// # Errors
    /// Returns [`RecorderError::UnknownService`] for an unconfigured alias.
    pub fn load_schema(&mut self, alias: &str, schema: Schema) -> Result<Arc<MetadataIndex>, RecorderError> {
        if self.config.service(alias).is_none() {
            return Err(RecorderError::UnknownService(alias.to_string()));
        }
        Ok(self.install(alias, schema))
    }

    fn install(&self, alias: &str, schema: Schema) -> Arc<MetadataIndex> {
        let index = Arc::new(MetadataIndex::new(schema));
        info!(
            alias,
            version = %index.version(),
            entity_sets = index.entity_set_count(),
            "metadata updated"
        );
        self.registry.install(alias, Arc::clone(&index));
        index
    }
}
