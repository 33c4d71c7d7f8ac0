//! Recorder configuration
//!
//! Plain serde types; loading files is left to the binary.

use odr_edm::ODataVersion;
use odr_payload::{ExpansionPolicy, NavigationStrategy};
use odr_store::{metadata_path, SaveMode};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One recorded OData service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    /// Service alias (e.g. `mainService`)
    pub alias: String,
    /// Protocol generation
    pub version: ODataVersion,
    /// URL prefix of the service (e.g. `/odata/v4/orders/`)
    pub base_path: String,
    /// Directory receiving entity files (e.g. `webapp/localService/mainService/data`)
    pub target_dir: PathBuf,
}

impl ServiceConfig {
    /// Create service configuration
    #[must_use]
    pub fn new(
        alias: impl Into<String>,
        version: ODataVersion,
        base_path: impl Into<String>,
        target_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            alias: alias.into(),
            version,
            base_path: base_path.into(),
            target_dir: target_dir.into(),
        }
    }

    /// Where this service's metadata document is written
    #[must_use]
    pub fn metadata_path(&self) -> PathBuf {
        metadata_path(&self.target_dir)
    }
}

/// Recorder configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecorderConfig {
    /// Recorded services
    pub services: Vec<ServiceConfig>,
    /// Default save mode for new recordings
    pub auto_save: SaveMode,
    /// Persist metadata documents next to the data directory
    pub write_metadata: bool,
    /// Recording id used when a start request names none
    #[serde(alias = "defaultTenant")]
    pub default_recording_id: Option<String>,
    /// Recorder is active from construction
    pub auto_start: bool,
    /// Expanded navigation handling
    pub expanded_navigation_strategy: NavigationStrategy,
    /// Back-fill foreign keys on extracted navigations
    pub enrich_foreign_keys: bool,
    /// Fields removed from every record before storage
    pub redact: Vec<String>,
    /// Nesting bound for expansion discovery
    pub max_expansion_depth: usize,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            services: Vec::new(),
            auto_save: SaveMode::Stream,
            write_metadata: true,
            default_recording_id: None,
            auto_start: false,
            expanded_navigation_strategy: NavigationStrategy::Auto,
            enrich_foreign_keys: true,
            redact: Vec::new(),
            max_expansion_depth: ExpansionPolicy::DEFAULT_MAX_DEPTH,
        }
    }
}

impl RecorderConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With service
    #[must_use]
    pub fn with_service(mut self, service: ServiceConfig) -> Self {
        self.services.push(service);
        self
    }

    /// With default save mode
    #[inline]
    #[must_use]
    pub fn with_auto_save(mut self, mode: SaveMode) -> Self {
        self.auto_save = mode;
        self
    }

    /// With metadata writing toggle
    #[inline]
    #[must_use]
    pub fn with_write_metadata(mut self, enabled: bool) -> Self {
        self.write_metadata = enabled;
        self
    }

    /// With default recording id
    #[must_use]
    pub fn with_default_recording_id(mut self, id: impl Into<String>) -> Self {
        self.default_recording_id = Some(id.into());
        self
    }

    /// With auto start
    #[inline]
    #[must_use]
    pub fn with_auto_start(mut self, enabled: bool) -> Self {
        self.auto_start = enabled;
        self
    }

    /// With navigation strategy
    #[inline]
    #[must_use]
    pub fn with_navigation_strategy(mut self, strategy: NavigationStrategy) -> Self {
        self.expanded_navigation_strategy = strategy;
        self
    }

    /// With foreign-key enrichment toggle
    #[inline]
    #[must_use]
    pub fn with_enrich_foreign_keys(mut self, enabled: bool) -> Self {
        self.enrich_foreign_keys = enabled;
        self
    }

    /// With redacted fields
    #[must_use]
    pub fn with_redact<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.redact = fields.into_iter().map(Into::into).collect();
        self
    }

    /// With expansion nesting bound
    #[inline]
    #[must_use]
    pub fn with_max_expansion_depth(mut self, depth: usize) -> Self {
        self.max_expansion_depth = depth;
        self
    }

    /// Service by alias
    #[must_use]
    pub fn service(&self, alias: &str) -> Option<&ServiceConfig> {
        self.services.iter().find(|s| s.alias == alias)
    }

    /// First service whose base path prefixes `request_path`
    #[must_use]
    pub fn match_service(&self, request_path: &str) -> Option<&ServiceConfig> {
        self.services
            .iter()
            .find(|s| request_path.starts_with(&s.base_path))
    }

    /// Service by alias, falling back to the base path of `request_path`
    #[must_use]
    pub fn resolve_service(&self, alias: &str, request_path: &str) -> Option<&ServiceConfig> {
        if alias.is_empty() {
            self.match_service(request_path)
        } else {
            self.service(alias)
        }
    }

    /// Expansion policy described by this configuration
    #[must_use]
    pub fn expansion_policy(&self) -> ExpansionPolicy {
        ExpansionPolicy::new(self.expanded_navigation_strategy)
            .with_enrich_foreign_keys(self.enrich_foreign_keys)
            .with_max_depth(self.max_expansion_depth)
    }

    /// Recording id for a start request
    ///
    /// A non-blank requested id wins over the configured default.
    #[must_use]
    pub fn recording_id(&self, requested: Option<&str>) -> Option<String> {
        extract_recording_id(requested, self.default_recording_id.as_deref())
    }
}

/// Pick the recording id: non-blank `requested`, else `default`
#[must_use]
pub fn extract_recording_id(requested: Option<&str>, default: Option<&str>) -> Option<String> {
    requested
        .filter(|id| !id.trim().is_empty())
        .or(default)
        .map(str::to_string)
}
