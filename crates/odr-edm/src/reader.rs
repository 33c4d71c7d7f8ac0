//! Metadata document readers
//!
//! The EDMX tokenizer lives outside this workspace; it plugs in through
//! [`SchemaReader`]. [`JsonSchemaReader`] accepts a [`Schema`] that was
//! already converted to JSON.

use crate::error::MetadataParseError;
use crate::schema::Schema;

/// Reader trait for turning a metadata body into a [`Schema`]
///
/// Implement this trait to plug in an EDMX tokenizer.
pub trait SchemaReader: Send + Sync + 'static {
    /// Parse metadata text
    ///
    /// # Errors
    /// Returns [`MetadataParseError`] when the body cannot be read.
    fn read(&self, text: &str) -> Result<Schema, MetadataParseError>;

    /// Reader name (for diagnostics)
    fn name(&self) -> &'static str;
}

/// Reader for schema documents serialized as JSON
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSchemaReader;

impl SchemaReader for JsonSchemaReader {
    fn read(&self, text: &str) -> Result<Schema, MetadataParseError> {
        Ok(serde_json::from_str(text)?)
    }

    fn name(&self) -> &'static str {
        "json"
    }
}

/// Best-effort check that a body is an EDMX document
///
/// Only sniffs for an XML prolog or the `edmx:Edmx` root; no validation.
#[must_use]
pub fn sniff_metadata(body: &str) -> bool {
    let trimmed = body.trim();
    !trimmed.is_empty() && (trimmed.contains("<?xml") || trimmed.contains("<edmx:Edmx"))
}
