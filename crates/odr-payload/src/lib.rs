//! ODR Payload Handling
//!
//! Turns decoded OData response bodies into entity records ready for the
//! entity store.
//!
//! # Pipeline
//!
//! ```text
//! $batch body ──split──▶ sub-responses ─┐
//!                                       ▼
//! response body ──parse──▶ normalize ──▶ ExpansionPolicy::apply ──▶ records
//!                                          (extract, enrich, reinline)
//! ```
//!
//! Every step is best-effort: shapes that do not match yield empty results
//! rather than errors, with [`PayloadError`] reserved for bodies that are not
//! JSON and navigations without a target entity set.

#![warn(unreachable_pub)]

pub mod batch;
pub mod enrich;
pub mod error;
pub mod expansion;
pub mod normalize;
pub mod url;

pub use batch::{split, BatchItem};
pub use enrich::enrich;
pub use error::PayloadError;
pub use expansion::{
    extract, reinline, ExpandedNavigation, ExpansionPolicy, ExpansionResult, NavigationShape,
    NavigationStrategy, Placement,
};
pub use normalize::{normalize, parse_body};
pub use url::extract_entity_set;
