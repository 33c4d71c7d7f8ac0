//! Proactive metadata fetching
//!
//! The network side is a collaborator implementing [`MetadataFetcher`];
//! [`FetchAttemptTracker`] keeps at most one attempt per alias in flight.

use crate::config::ServiceConfig;
use crate::error::RecorderError;
use async_trait::async_trait;
use dashmap::DashSet;
use std::sync::Arc;

/// Source of `$metadata` documents
#[async_trait]
pub trait MetadataFetcher: Send + Sync {
    /// Fetch the raw metadata document of `service`
    ///
    /// # Errors
    /// Returns [`RecorderError::Fetch`] when the document cannot be obtained.
    async fn fetch(&self, service: &ServiceConfig) -> Result<String, RecorderError>;
}

/// In-flight fetch attempts per alias
#[derive(Debug, Clone, Default)]
pub struct FetchAttemptTracker {
    in_flight: Arc<DashSet<String>>,
}

impl FetchAttemptTracker {
    /// Create empty tracker
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the attempt for `alias`
    ///
    /// Returns `None` while another attempt for the alias is running. The
    /// claim is released when the returned guard drops.
    #[must_use]
    pub fn try_begin(&self, alias: &str) -> Option<FetchAttempt> {
        self.in_flight.insert(alias.to_string()).then(|| FetchAttempt {
            alias: alias.to_string(),
            in_flight: Arc::clone(&self.in_flight),
        })
    }

    /// Whether an attempt for `alias` is running
    #[must_use]
    pub fn is_in_flight(&self, alias: &str) -> bool {
        self.in_flight.contains(alias)
    }
}

/// Claim on a fetch attempt; released on drop
#[derive(Debug)]
pub struct FetchAttempt {
    alias: String,
    in_flight: Arc<DashSet<String>>,
}

impl FetchAttempt {
    /// Alias being fetched
    #[inline]
    #[must_use]
    pub fn alias(&self) -> &str {
        &self.alias
    }
}

impl Drop for FetchAttempt {
    fn drop(&mut self) {
        self.in_flight.remove(&self.alias);
    }
}
