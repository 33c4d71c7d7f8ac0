//! Parsed EDMX shape
//!
//! These types describe what an EDMX tokenizer hands over after reading a
//! `$metadata` document. V4 documents populate navigation bindings and
//! per-property referential constraints; V2 documents populate associations
//! and association sets instead.

use crate::record::ODataVersion;
use serde::{Deserialize, Serialize};

/// Strip a namespace qualifier (and a `Collection(...)` wrapper) from a type name
///
/// `"Svc.Orders"` becomes `"Orders"`, `"Collection(Svc.Items)"` becomes `"Items"`.
#[must_use]
pub fn simple_name(qualified: &str) -> &str {
    let trimmed = qualified
        .strip_prefix("Collection(")
        .and_then(|rest| rest.strip_suffix(')'))
        .unwrap_or(qualified);
    trimmed.rsplit('.').next().unwrap_or(trimmed)
}

/// Parsed metadata document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    /// Protocol generation the document was written for
    pub version: ODataVersion,
    /// Entity sets exposed by the entity container
    #[serde(default)]
    pub entity_sets: Vec<EntitySet>,
    /// Entity types declared by the schema
    #[serde(default)]
    pub entity_types: Vec<EntityType>,
    /// V2 associations
    #[serde(default)]
    pub associations: Vec<Association>,
    /// V2 association sets
    #[serde(default)]
    pub association_sets: Vec<AssociationSet>,
}

impl Schema {
    /// Create empty schema for a protocol version
    #[inline]
    #[must_use]
    pub fn new(version: ODataVersion) -> Self {
        Self {
            version,
            entity_sets: Vec::new(),
            entity_types: Vec::new(),
            associations: Vec::new(),
            association_sets: Vec::new(),
        }
    }

    /// With entity set
    #[must_use]
    pub fn with_entity_set(mut self, set: EntitySet) -> Self {
        self.entity_sets.push(set);
        self
    }

    /// With entity type
    #[must_use]
    pub fn with_entity_type(mut self, entity_type: EntityType) -> Self {
        self.entity_types.push(entity_type);
        self
    }

    /// With association (V2)
    #[must_use]
    pub fn with_association(mut self, association: Association) -> Self {
        self.associations.push(association);
        self
    }

    /// With association set (V2)
    #[must_use]
    pub fn with_association_set(mut self, set: AssociationSet) -> Self {
        self.association_sets.push(set);
        self
    }
}

/// Named collection exposed by the service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitySet {
    /// Entity set name (e.g. `Orders`)
    pub name: String,
    /// Possibly namespace-qualified entity type name
    pub entity_type_name: String,
    /// V4 navigation property bindings
    #[serde(default)]
    pub navigation_bindings: Vec<NavigationBinding>,
}

impl EntitySet {
    /// Create entity set
    #[must_use]
    pub fn new(name: impl Into<String>, entity_type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entity_type_name: entity_type_name.into(),
            navigation_bindings: Vec::new(),
        }
    }

    /// With navigation binding
    #[must_use]
    pub fn with_binding(mut self, path: impl Into<String>, target: impl Into<String>) -> Self {
        self.navigation_bindings.push(NavigationBinding {
            path: path.into(),
            target: target.into(),
        });
        self
    }
}

/// V4 `NavigationPropertyBinding`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationBinding {
    /// Binding path (navigation property name, possibly multi-segment)
    pub path: String,
    /// Target entity set, optionally container-qualified
    pub target: String,
}

/// Entity type declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityType {
    /// Type name (namespace optional)
    pub name: String,
    /// Ordered key property names
    #[serde(default)]
    pub keys: Vec<String>,
    /// Declared navigation properties
    #[serde(default)]
    pub navigation_properties: Vec<NavigationProperty>,
}

impl EntityType {
    /// Create entity type with keys
    #[must_use]
    pub fn new<I, S>(name: impl Into<String>, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            keys: keys.into_iter().map(Into::into).collect(),
            navigation_properties: Vec::new(),
        }
    }

    /// With navigation property
    #[must_use]
    pub fn with_navigation(mut self, navigation: NavigationProperty) -> Self {
        self.navigation_properties.push(navigation);
        self
    }
}

/// Navigation property declaration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NavigationProperty {
    /// Property name
    pub name: String,
    /// V4 target type (possibly qualified)
    pub target_type_name: Option<String>,
    /// Whether the navigation yields a collection
    pub is_collection: bool,
    /// V4 containment navigation
    pub contains_target: bool,
    /// V4 partner navigation on the target type
    pub partner: Option<String>,
    /// V4 referential constraints declared on this navigation
    pub referential_constraints: Vec<ReferentialConstraint>,
    /// V2 association name (possibly qualified)
    pub relationship: Option<String>,
    /// V2 role of the declaring type
    pub from_role: Option<String>,
    /// V2 role of the target type
    pub to_role: Option<String>,
}

impl NavigationProperty {
    /// Create V4 navigation property
    #[must_use]
    pub fn v4(name: impl Into<String>, target_type_name: impl Into<String>, is_collection: bool) -> Self {
        Self {
            name: name.into(),
            target_type_name: Some(target_type_name.into()),
            is_collection,
            ..Self::default()
        }
    }

    /// Create V2 navigation property
    #[must_use]
    pub fn v2(
        name: impl Into<String>,
        relationship: impl Into<String>,
        from_role: impl Into<String>,
        to_role: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            relationship: Some(relationship.into()),
            from_role: Some(from_role.into()),
            to_role: Some(to_role.into()),
            ..Self::default()
        }
    }

    /// With partner navigation
    #[must_use]
    pub fn with_partner(mut self, partner: impl Into<String>) -> Self {
        self.partner = Some(partner.into());
        self
    }

    /// With referential constraint
    #[must_use]
    pub fn with_constraint(mut self, source: impl Into<String>, target: impl Into<String>) -> Self {
        self.referential_constraints
            .push(ReferentialConstraint::new(source, target));
        self
    }

    /// Mark as containment navigation
    #[must_use]
    pub fn containing(mut self) -> Self {
        self.contains_target = true;
        self
    }
}

/// Foreign-key mapping: `source` on the navigation's owner, `target` on the related entity
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReferentialConstraint {
    /// Property on the owning side
    pub source: String,
    /// Property on the related side
    pub target: String,
}

impl ReferentialConstraint {
    /// Create constraint
    #[must_use]
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }

    /// Same mapping seen from the other end
    #[must_use]
    pub fn inverted(&self) -> Self {
        Self {
            source: self.target.clone(),
            target: self.source.clone(),
        }
    }
}

/// V2 association
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Association {
    /// Association name (namespace optional)
    pub name: String,
    /// Declared referential constraints
    #[serde(default)]
    pub referential_constraints: Vec<ReferentialConstraint>,
}

impl Association {
    /// Create association without constraints
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            referential_constraints: Vec::new(),
        }
    }

    /// With referential constraint
    #[must_use]
    pub fn with_constraint(mut self, source: impl Into<String>, target: impl Into<String>) -> Self {
        self.referential_constraints
            .push(ReferentialConstraint::new(source, target));
        self
    }
}

/// V2 association set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociationSet {
    /// Association set name
    pub name: String,
    /// Association this set instantiates (possibly qualified)
    pub association: String,
    /// Role-to-entity-set ends
    #[serde(default)]
    pub ends: Vec<AssociationSetEnd>,
}

impl AssociationSet {
    /// Create association set
    #[must_use]
    pub fn new(name: impl Into<String>, association: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            association: association.into(),
            ends: Vec::new(),
        }
    }

    /// With end
    #[must_use]
    pub fn with_end(mut self, role: impl Into<String>, entity_set: impl Into<String>) -> Self {
        self.ends.push(AssociationSetEnd {
            role: role.into(),
            entity_set: entity_set.into(),
        });
        self
    }
}

/// One end of a V2 association set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssociationSetEnd {
    /// Role name
    pub role: String,
    /// Entity set playing the role
    pub entity_set: String,
}
