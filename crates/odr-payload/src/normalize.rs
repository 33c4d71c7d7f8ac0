//! Response normalization
//!
//! Flattens V2 (`{"d": ...}`) and V4 (`{"value": [...]}`) envelopes into a
//! flat list of [`EntityRecord`]s. Shape mismatches yield an empty list.

use crate::error::PayloadError;
use odr_edm::{EntityRecord, ODataVersion};
use serde_json::Value;

/// Parse a response body as JSON
///
/// # Errors
/// Returns [`PayloadError::MalformedResponse`] when the body is not JSON.
pub fn parse_body(url: &str, body: &str) -> Result<Value, PayloadError> {
    serde_json::from_str(body).map_err(|source| PayloadError::malformed(url, source))
}

/// Flatten a parsed OData body into entity records
///
/// Non-object list elements are not entities and are skipped.
#[must_use]
pub fn normalize(body: Value, version: ODataVersion) -> Vec<EntityRecord> {
    match version {
        ODataVersion::V2 => normalize_v2(body),
        ODataVersion::V4 => normalize_v4(body),
    }
}

fn normalize_v2(body: Value) -> Vec<EntityRecord> {
    let Value::Object(mut envelope) = body else {
        return Vec::new();
    };

    match envelope.remove("d") {
        Some(Value::Object(mut d)) => {
            if !matches!(d.get("results"), Some(Value::Array(_))) {
                return vec![d];
            }
            match d.remove("results") {
                Some(Value::Array(results)) => records(results),
                _ => Vec::new(),
            }
        }
        _ => Vec::new(),
    }
}

fn normalize_v4(body: Value) -> Vec<EntityRecord> {
    let Value::Object(mut envelope) = body else {
        return Vec::new();
    };

    match envelope.get("value") {
        Some(Value::Array(_)) => match envelope.remove("value") {
            Some(Value::Array(values)) => records(values),
            _ => Vec::new(),
        },
        None | Some(Value::Null) => vec![envelope],
        Some(_) => Vec::new(),
    }
}

fn records(values: Vec<Value>) -> Vec<EntityRecord> {
    values
        .into_iter()
        .filter_map(|value| match value {
            Value::Object(record) => Some(record),
            _ => None,
        })
        .collect()
}
