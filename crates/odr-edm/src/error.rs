//! Error types for metadata handling

/// Errors while turning a metadata document into a [`Schema`](crate::Schema)
#[derive(Debug, thiserror::Error)]
pub enum MetadataParseError {
    /// Body does not look like an EDMX document
    #[error("not a metadata document: {0}")]
    NotMetadata(String),

    /// The tokenizer rejected the document
    #[error("malformed metadata: {0}")]
    Malformed(String),

    /// A serialized schema document could not be decoded
    #[error("invalid schema document: {0}")]
    Json(#[from] serde_json::Error),
}

impl MetadataParseError {
    /// Create malformed-document error
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed(message.into())
    }
}
