//! Error types for payload handling

/// Errors raised while turning a response body into entity records
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    /// Body is not parseable JSON where JSON was expected
    #[error("malformed response from {url}: {source}")]
    MalformedResponse {
        /// Request URL the body belongs to
        url: String,
        #[source]
        source: serde_json::Error,
    },

    /// Expanded navigation has no target entity set in the metadata
    #[error("no entity set mapping for navigation '{navigation}' of '{entity_set}'")]
    UnmappedNavigation {
        /// Entity set owning the navigation
        entity_set: String,
        /// Navigation property name
        navigation: String,
    },
}

impl PayloadError {
    /// Create malformed-response error for a URL
    pub fn malformed(url: impl Into<String>, source: serde_json::Error) -> Self {
        Self::MalformedResponse {
            url: url.into(),
            source,
        }
    }

    /// Create unmapped-navigation error
    pub fn unmapped(entity_set: impl Into<String>, navigation: impl Into<String>) -> Self {
        Self::UnmappedNavigation {
            entity_set: entity_set.into(),
            navigation: navigation.into(),
        }
    }
}
