//! Record and protocol primitives

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A single entity as captured from the wire.
///
/// Field order is preserved (`serde_json` is built with `preserve_order`),
/// so fixtures serialize in the order the service produced them.
pub type EntityRecord = serde_json::Map<String, serde_json::Value>;

/// OData protocol generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ODataVersion {
    /// OData V2 (`{ "d": ... }` envelopes, associations, deferred links)
    V2,
    /// OData V4 (`{ "value": [...] }` envelopes, navigation bindings)
    V4,
}

impl ODataVersion {
    /// Wire label (`"v2"` / `"v4"`)
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ODataVersion::V2 => "v2",
            ODataVersion::V4 => "v4",
        }
    }
}

impl fmt::Display for ODataVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ODataVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "v2" | "2" | "2.0" => Ok(ODataVersion::V2),
            "v4" | "4" | "4.0" => Ok(ODataVersion::V4),
            other => Err(format!("unsupported OData version: '{other}'")),
        }
    }
}
