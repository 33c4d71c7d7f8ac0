//! Per-service metadata registry

use dashmap::DashMap;
use odr_edm::MetadataIndex;
use std::sync::Arc;

/// Resolved metadata per service alias
///
/// Indexes are replaced wholesale on every successful parse, never merged.
/// Clones share the same underlying map.
#[derive(Debug, Clone, Default)]
pub struct ParserRegistry {
    indexes: Arc<DashMap<String, Arc<MetadataIndex>>>,
}

impl ParserRegistry {
    /// Create empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install index for `alias`, returning the one it replaces
    pub fn install(
        &self,
        alias: impl Into<String>,
        index: impl Into<Arc<MetadataIndex>>,
    ) -> Option<Arc<MetadataIndex>> {
        self.indexes.insert(alias.into(), index.into())
    }

    /// Index for `alias`
    #[must_use]
    pub fn get(&self, alias: &str) -> Option<Arc<MetadataIndex>> {
        self.indexes.get(alias).map(|entry| Arc::clone(entry.value()))
    }

    /// Whether metadata for `alias` is resolved
    #[must_use]
    pub fn contains(&self, alias: &str) -> bool {
        self.indexes.contains_key(alias)
    }

    /// Resolved aliases, sorted
    #[must_use]
    pub fn aliases(&self) -> Vec<String> {
        let mut aliases: Vec<_> = self.indexes.iter().map(|e| e.key().clone()).collect();
        aliases.sort();
        aliases
    }

    /// Number of resolved services
    #[must_use]
    pub fn len(&self) -> usize {
        self.indexes.len()
    }

    /// Whether no service is resolved
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.indexes.is_empty()
    }
}
