//! Expanded navigation extraction
//!
//! [`extract`] pulls inline navigation data out of one record (single level)
//! and [`reinline`] puts it back in its original shape. [`ExpansionPolicy`]
//! decides per navigation whether data moves to its own entity set or stays
//! inline, and walks nested expansions with a bounded worklist.
//!
//! Classification is structural:
//!
//! | version | shape                                  | result            |
//! |---------|----------------------------------------|-------------------|
//! | V2      | object with `__deferred`               | untouched         |
//! | V2      | object with `results` array of objects | collection        |
//! | V2      | object with `__metadata`               | single entity     |
//! | V4      | non-empty array of objects             | collection        |
//! | V4      | object with ≥2 non-annotation fields   | single entity     |
//!
//! The V4 single-entity rule is a heuristic: a complex-type value with two
//! or more fields (amount + currency) is indistinguishable from an expanded
//! entity without consulting the schema, and is classified as an entity.

use crate::enrich::enrich;
use crate::error::PayloadError;
use odr_edm::{EntityRecord, MetadataIndex, ODataVersion};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Original container shape of an expanded navigation
#[derive(Debug, Clone, PartialEq)]
pub enum NavigationShape {
    /// Bare object
    Single,
    /// Bare array (V4)
    Collection,
    /// V2 `{"results": [...]}` wrapper; other wrapper fields are kept here
    Results(EntityRecord),
}

/// Navigation data removed from a record by [`extract`]
#[derive(Debug, Clone, PartialEq)]
pub struct ExpandedNavigation {
    /// Navigation property name
    pub navigation_property: String,
    /// Expanded records in wire order
    pub entities: Vec<EntityRecord>,
    /// Shape needed to restore the property
    pub shape: NavigationShape,
}

impl ExpandedNavigation {
    /// Rebuild the property value in its original shape
    #[must_use]
    pub fn into_value(self) -> Value {
        let mut entities = self.entities;
        match self.shape {
            NavigationShape::Single if entities.len() == 1 => {
                Value::Object(entities.remove(0))
            }
            NavigationShape::Single | NavigationShape::Collection => {
                Value::Array(entities.into_iter().map(Value::Object).collect())
            }
            NavigationShape::Results(mut wrapper) => {
                wrapper.insert(
                    "results".to_string(),
                    Value::Array(entities.into_iter().map(Value::Object).collect()),
                );
                Value::Object(wrapper)
            }
        }
    }
}

/// Remove every expanded navigation from `entity`
///
/// Metadata and annotation keys (`__*`, `@*`), nulls, deferred links and
/// primitive values stay in place. Field order of the remaining properties
/// is preserved.
pub fn extract(entity: &mut EntityRecord, version: ODataVersion) -> Vec<ExpandedNavigation> {
    let mut expanded = Vec::new();

    for (key, value) in std::mem::take(entity) {
        if key.starts_with("__") || key.starts_with('@') {
            entity.insert(key, value);
            continue;
        }

        let classified = match version {
            ODataVersion::V2 => classify_v2(value),
            ODataVersion::V4 => classify_v4(value),
        };
        match classified {
            Ok((entities, shape)) => expanded.push(ExpandedNavigation {
                navigation_property: key,
                entities,
                shape,
            }),
            Err(value) => {
                entity.insert(key, value);
            }
        }
    }

    expanded
}

/// Put an extracted navigation back into its parent record
pub fn reinline(entity: &mut EntityRecord, expanded: ExpandedNavigation) {
    let name = expanded.navigation_property.clone();
    entity.insert(name, expanded.into_value());
}

type Classified = Result<(Vec<EntityRecord>, NavigationShape), Value>;

fn classify_v2(value: Value) -> Classified {
    let Value::Object(mut wrapper) = value else {
        return Err(value);
    };
    if wrapper.contains_key("__deferred") {
        return Err(Value::Object(wrapper));
    }

    if let Some(Value::Array(results)) = wrapper.get_mut("results") {
        if results.iter().all(Value::is_object) {
            // empty placeholder keeps the key's position for reinlining
            let entities = objects(std::mem::take(results));
            return Ok((entities, NavigationShape::Results(wrapper)));
        }
    }

    if wrapper.contains_key("__metadata") {
        return Ok((vec![wrapper], NavigationShape::Single));
    }
    Err(Value::Object(wrapper))
}

fn classify_v4(value: Value) -> Classified {
    match value {
        Value::Array(items) if !items.is_empty() && items.iter().all(Value::is_object) => {
            Ok((objects(items), NavigationShape::Collection))
        }
        Value::Object(record) if plain_field_count(&record) >= 2 => {
            Ok((vec![record], NavigationShape::Single))
        }
        other => Err(other),
    }
}

fn plain_field_count(record: &EntityRecord) -> usize {
    record.keys().filter(|key| !key.contains('@')).count()
}

fn objects(values: Vec<Value>) -> Vec<EntityRecord> {
    values
        .into_iter()
        .filter_map(|value| match value {
            Value::Object(record) => Some(record),
            _ => None,
        })
        .collect()
}

/// How expanded navigations are persisted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NavigationStrategy {
    /// Extract only navigations with declared referential constraints
    #[default]
    Auto,
    /// Never extract
    AlwaysInline,
    /// Extract whenever a target entity set is known
    AlwaysSeparate,
}

impl NavigationStrategy {
    /// Configuration label
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            NavigationStrategy::Auto => "auto",
            NavigationStrategy::AlwaysInline => "always-inline",
            NavigationStrategy::AlwaysSeparate => "always-separate",
        }
    }
}

impl fmt::Display for NavigationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NavigationStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(NavigationStrategy::Auto),
            "always-inline" => Ok(NavigationStrategy::AlwaysInline),
            "always-separate" => Ok(NavigationStrategy::AlwaysSeparate),
            other => Err(format!("unknown navigation strategy: '{other}'")),
        }
    }
}

/// Records relocated from one navigation into their own entity set
#[derive(Debug, Clone, PartialEq)]
pub struct ExpansionResult {
    /// Navigation property the records came from
    pub navigation_property: String,
    /// Entity set the records belong to
    pub target_entity_set: String,
    /// Relocated records, nested expansions already processed
    pub entities: Vec<EntityRecord>,
}

/// Where one expanded navigation ends up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// Stays inside the parent record
    Inline,
    /// Moves to the named entity set
    Separate(String),
}

/// Per-navigation extraction policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpansionPolicy {
    strategy: NavigationStrategy,
    enrich_foreign_keys: bool,
    max_depth: usize,
}

impl Default for ExpansionPolicy {
    fn default() -> Self {
        Self::new(NavigationStrategy::Auto)
    }
}

impl ExpansionPolicy {
    /// Default nesting bound for expansion discovery
    pub const DEFAULT_MAX_DEPTH: usize = 8;

    /// Create policy for a strategy with enrichment on
    #[inline]
    #[must_use]
    pub fn new(strategy: NavigationStrategy) -> Self {
        Self {
            strategy,
            enrich_foreign_keys: true,
            max_depth: Self::DEFAULT_MAX_DEPTH,
        }
    }

    /// With foreign-key enrichment toggle
    #[must_use]
    pub fn with_enrich_foreign_keys(mut self, enabled: bool) -> Self {
        self.enrich_foreign_keys = enabled;
        self
    }

    /// With nesting bound; deeper expansions stay inline
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Configured strategy
    #[inline]
    #[must_use]
    pub fn strategy(&self) -> NavigationStrategy {
        self.strategy
    }

    /// Decide placement of one navigation of `entity_set`
    ///
    /// # Errors
    /// Returns [`PayloadError::UnmappedNavigation`] when extraction would be
    /// considered but no target entity set is known; callers keep the data
    /// inline.
    pub fn placement(
        &self,
        index: Option<&MetadataIndex>,
        entity_set: &str,
        navigation: &str,
    ) -> Result<Placement, PayloadError> {
        let targets = index
            .map(|index| index.navigation_targets(entity_set))
            .unwrap_or_default();
        self.placement_with(index, &targets, entity_set, navigation)
    }

    fn placement_with(
        &self,
        index: Option<&MetadataIndex>,
        targets: &BTreeMap<String, String>,
        entity_set: &str,
        navigation: &str,
    ) -> Result<Placement, PayloadError> {
        if self.strategy == NavigationStrategy::AlwaysInline {
            return Ok(Placement::Inline);
        }

        let target = targets
            .get(navigation)
            .ok_or_else(|| PayloadError::unmapped(entity_set, navigation))?;

        match self.strategy {
            NavigationStrategy::AlwaysSeparate => Ok(Placement::Separate(target.clone())),
            _ if index.is_some_and(|index| index.has_referential_constraints(entity_set, navigation)) => {
                Ok(Placement::Separate(target.clone()))
            }
            _ => Ok(Placement::Inline),
        }
    }

    /// Extract expanded navigations from `entities` and everything nested in them
    ///
    /// Records of `entities` are updated in place: relocated navigations are
    /// removed (with foreign keys enriched), the rest is reinlined. Returns
    /// the relocated records in discovery order, breadth first.
    pub fn apply(
        &self,
        entity_set: &str,
        entities: &mut [EntityRecord],
        version: ODataVersion,
        index: Option<&MetadataIndex>,
    ) -> Vec<ExpansionResult> {
        let mut results = Vec::new();
        if self.strategy == NavigationStrategy::AlwaysInline || self.max_depth == 0 {
            return results;
        }

        let mut worklist = VecDeque::new();
        self.expand_level(entity_set, entities, 1, version, index, &mut worklist);

        while let Some((mut result, depth)) = worklist.pop_front() {
            if depth < self.max_depth {
                let target = result.target_entity_set.clone();
                self.expand_level(&target, &mut result.entities, depth + 1, version, index, &mut worklist);
            } else {
                debug!(entity_set = %result.target_entity_set, depth, "expansion depth bound reached");
            }
            results.push(result);
        }

        results
    }

    fn expand_level(
        &self,
        entity_set: &str,
        entities: &mut [EntityRecord],
        depth: usize,
        version: ODataVersion,
        index: Option<&MetadataIndex>,
        worklist: &mut VecDeque<(ExpansionResult, usize)>,
    ) {
        let targets = index
            .map(|index| index.navigation_targets(entity_set))
            .unwrap_or_default();
        let mut reported = BTreeSet::new();

        for entity in entities.iter_mut() {
            for expanded in extract(entity, version) {
                let navigation = expanded.navigation_property.as_str();
                match self.placement_with(index, &targets, entity_set, navigation) {
                    Ok(Placement::Separate(target)) => {
                        let ExpandedNavigation {
                            navigation_property,
                            mut entities,
                            ..
                        } = expanded;

                        if self.enrich_foreign_keys {
                            if let Some(index) = index {
                                let constraints =
                                    index.referential_constraints(entity_set, &navigation_property);
                                enrich(entity, &mut entities, &constraints);
                            }
                        }

                        worklist.push_back((
                            ExpansionResult {
                                navigation_property,
                                target_entity_set: target,
                                entities,
                            },
                            depth,
                        ));
                    }
                    Ok(Placement::Inline) => {
                        if reported.insert(navigation.to_string()) {
                            info!(
                                entity_set,
                                navigation,
                                strategy = %self.strategy,
                                "no referential constraints, keeping expanded navigation inline"
                            );
                        }
                        reinline(entity, expanded);
                    }
                    Err(err) => {
                        if reported.insert(navigation.to_string()) {
                            warn!(%err, "keeping expanded navigation inline");
                        }
                        reinline(entity, expanded);
                    }
                }
            }
        }
    }
}
