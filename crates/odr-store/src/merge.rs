//! Key-based entity deduplication
//!
//! Identity is the tuple of key-field values. The first record seen for a
//! key wins; later duplicates are dropped whole, never field-merged. When
//! keys are unknown (metadata not resolved yet) the whole serialized record
//! is the identity.

use indexmap::IndexMap;
use odr_edm::EntityRecord;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;

/// Text form of a field value used for key comparison
///
/// Missing and null become `""`, strings are used raw, arrays join their
/// elements with `,`, objects collapse to `[object Object]`.
fn key_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| key_text(Some(item)))
            .collect::<Vec<_>>()
            .join(","),
        Some(Value::Object(_)) => "[object Object]".to_string(),
    }
}

/// Dedup identity of `record` under `keys`
///
/// Key values are joined with `|`. Empty `keys` yields the serialized record.
#[must_use]
pub fn dedup_key(record: &EntityRecord, keys: &[String]) -> String {
    if keys.is_empty() {
        return serde_json::to_string(record).unwrap_or_default();
    }
    keys.iter()
        .map(|key| key_text(record.get(key)))
        .collect::<Vec<_>>()
        .join("|")
}

/// Append `incoming` records whose identity is not yet present
///
/// Existing records are kept untouched and in order.
#[must_use]
pub fn merge(
    existing: Vec<EntityRecord>,
    incoming: Vec<EntityRecord>,
    keys: &[String],
) -> Vec<EntityRecord> {
    let mut seen: HashSet<String> = existing.iter().map(|r| dedup_key(r, keys)).collect();
    let mut merged = existing;

    for record in incoming {
        if seen.insert(dedup_key(&record, keys)) {
            merged.push(record);
        }
    }

    merged
}

/// Copy of `record` without the named fields
#[must_use]
pub fn redact(record: &EntityRecord, fields: &[String]) -> EntityRecord {
    if fields.is_empty() {
        return record.clone();
    }
    record
        .iter()
        .filter(|(name, _)| !fields.contains(name))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

/// In-memory accumulation target: (service, recording id, entity set)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferKey {
    /// Service alias
    pub alias: String,
    /// Recording id; `None` writes files without suffix
    pub recording_id: Option<String>,
    /// Entity set name
    pub entity_set: String,
}

impl BufferKey {
    /// Create buffer key
    #[must_use]
    pub fn new(
        alias: impl Into<String>,
        recording_id: Option<String>,
        entity_set: impl Into<String>,
    ) -> Self {
        Self {
            alias: alias.into(),
            recording_id,
            entity_set: entity_set.into(),
        }
    }
}

impl fmt::Display for BufferKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{}",
            self.alias,
            self.recording_id.as_deref().unwrap_or_default(),
            self.entity_set
        )
    }
}

/// Buffered records per [`BufferKey`], in first-touched order
#[derive(Debug, Default)]
pub struct EntityBuffers {
    buffers: IndexMap<BufferKey, Vec<EntityRecord>>,
}

impl EntityBuffers {
    /// Create empty buffers
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `records` into the buffer for `key`
    ///
    /// Returns the buffered record count afterwards.
    pub fn merge(&mut self, key: BufferKey, records: Vec<EntityRecord>, keys: &[String]) -> usize {
        let slot = self.buffers.entry(key).or_default();
        let existing = std::mem::take(slot);
        *slot = merge(existing, records, keys);
        slot.len()
    }

    /// Buffered records for `key`
    #[must_use]
    pub fn get(&self, key: &BufferKey) -> Option<&[EntityRecord]> {
        self.buffers.get(key).map(Vec::as_slice)
    }

    /// Buffer keys in first-touched order
    pub fn keys(&self) -> impl Iterator<Item = &BufferKey> {
        self.buffers.keys()
    }

    /// Number of buffered entity sets
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    /// Whether nothing is buffered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Take every buffer, leaving this empty
    pub fn drain(&mut self) -> Vec<(BufferKey, Vec<EntityRecord>)> {
        std::mem::take(&mut self.buffers).into_iter().collect()
    }

    /// Drop every buffer
    pub fn clear(&mut self) {
        self.buffers.clear();
    }
}
