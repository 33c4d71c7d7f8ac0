//! ODR Entity Data Model
//!
//! Foundation types shared by every recorder crate.
//!
//! # Core Concepts
//!
//! - [`ODataVersion`]: wire protocol generation (`v2` or `v4`)
//! - [`EntityRecord`]: ordered, dynamically typed entity payload
//! - [`Schema`]: parsed shape of an EDMX document as delivered by a tokenizer
//! - [`SchemaReader`]: seam for the EDMX tokenizer
//! - [`MetadataIndex`]: key, navigation and constraint lookups over a [`Schema`]
//!
//! # Example
//!
//! ```rust,ignore
//! use odr_edm::{JsonSchemaReader, MetadataIndex, SchemaReader};
//!
//! let schema = JsonSchemaReader.read(&document)?;
//! let index = MetadataIndex::new(schema);
//!
//! assert_eq!(index.keys_for_entity_set("Orders"), vec!["ID".to_string()]);
//! ```

#![warn(unreachable_pub)]

// Core modules
pub mod error;
pub mod index;
pub mod reader;
pub mod record;
pub mod schema;

// Re-exports for convenience
pub use error::MetadataParseError;
pub use index::MetadataIndex;
pub use reader::{sniff_metadata, JsonSchemaReader, SchemaReader};
pub use record::{EntityRecord, ODataVersion};
pub use schema::{
    simple_name, Association, AssociationSet, AssociationSetEnd, EntitySet, EntityType,
    NavigationBinding, NavigationProperty, ReferentialConstraint, Schema,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
