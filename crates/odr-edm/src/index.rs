//! Metadata index over a parsed schema
//!
//! Provides [`MetadataIndex`] for the lookups the recorder pipeline needs:
//! key fields per entity set, navigation targets, and referential
//! constraints. All queries are total: unknown names yield empty results.

use crate::record::ODataVersion;
use crate::schema::{
    simple_name, Association, AssociationSet, EntitySet, EntityType, NavigationProperty,
    ReferentialConstraint, Schema,
};
use std::collections::{BTreeMap, HashMap};

/// Immutable lookup structure built once per successful metadata parse
///
/// Entity types and associations are indexed by their namespace-stripped
/// names, so qualified references from entity sets and navigations resolve
/// regardless of how the tokenizer spelled them.
#[derive(Debug, Clone)]
pub struct MetadataIndex {
    version: ODataVersion,
    entity_sets: HashMap<String, EntitySet>,
    entity_types: HashMap<String, EntityType>,
    associations: HashMap<String, Association>,
    association_sets: Vec<AssociationSet>,
}

impl MetadataIndex {
    /// Build index from a parsed schema
    #[must_use]
    pub fn new(schema: Schema) -> Self {
        let entity_sets = schema
            .entity_sets
            .into_iter()
            .map(|set| (set.name.clone(), set))
            .collect();
        let entity_types = schema
            .entity_types
            .into_iter()
            .map(|ty| (simple_name(&ty.name).to_string(), ty))
            .collect();
        let associations = schema
            .associations
            .into_iter()
            .map(|assoc| (simple_name(&assoc.name).to_string(), assoc))
            .collect();

        Self {
            version: schema.version,
            entity_sets,
            entity_types,
            associations,
            association_sets: schema.association_sets,
        }
    }

    /// Protocol generation of the indexed document
    #[inline]
    #[must_use]
    pub fn version(&self) -> ODataVersion {
        self.version
    }

    /// Number of indexed entity sets
    #[inline]
    #[must_use]
    pub fn entity_set_count(&self) -> usize {
        self.entity_sets.len()
    }

    /// Entity type name for an entity set, namespace stripped
    #[must_use]
    pub fn entity_type_name(&self, entity_set: &str) -> Option<&str> {
        self.entity_sets
            .get(entity_set)
            .map(|set| simple_name(&set.entity_type_name))
    }

    /// Ordered key fields for an entity set
    ///
    /// Returns an empty list when the set or its type is unknown.
    #[must_use]
    pub fn keys_for_entity_set(&self, entity_set: &str) -> Vec<String> {
        self.entity_type_for_set(entity_set)
            .map(|ty| ty.keys.clone())
            .unwrap_or_default()
    }

    /// Navigation property name → target entity set name
    ///
    /// V4 reads the set's navigation-property bindings and ignores
    /// multi-segment paths. V2 resolves navigation → association →
    /// association set → end selected by `toRole`. Navigations that do not
    /// resolve are absent from the result.
    #[must_use]
    pub fn navigation_targets(&self, entity_set: &str) -> BTreeMap<String, String> {
        match self.version {
            ODataVersion::V4 => self.v4_navigation_targets(entity_set),
            ODataVersion::V2 => self.v2_navigation_targets(entity_set),
        }
    }

    /// Referential constraints for one navigation of an entity set
    ///
    /// V4 uses constraints declared on the navigation itself, falling back
    /// to the partner navigation's constraints inverted. V2 returns the
    /// owning association's constraints as declared.
    #[must_use]
    pub fn referential_constraints(
        &self,
        entity_set: &str,
        navigation: &str,
    ) -> Vec<ReferentialConstraint> {
        let Some((owner, nav)) = self.navigation_property(entity_set, navigation) else {
            return Vec::new();
        };

        match self.version {
            ODataVersion::V4 => {
                if nav.referential_constraints.is_empty() {
                    self.partner_constraints(owner, nav)
                } else {
                    nav.referential_constraints.clone()
                }
            }
            ODataVersion::V2 => nav
                .relationship
                .as_deref()
                .and_then(|rel| self.associations.get(simple_name(rel)))
                .map(|assoc| assoc.referential_constraints.clone())
                .unwrap_or_default(),
        }
    }

    /// Whether a navigation carries a usable foreign-key declaration
    ///
    /// Containment navigations never qualify.
    #[must_use]
    pub fn has_referential_constraints(&self, entity_set: &str, navigation: &str) -> bool {
        match self.navigation_property(entity_set, navigation) {
            Some((_, nav)) if nav.contains_target => false,
            Some(_) => !self.referential_constraints(entity_set, navigation).is_empty(),
            None => false,
        }
    }

    fn entity_type_for_set(&self, entity_set: &str) -> Option<&EntityType> {
        let type_name = self.entity_type_name(entity_set)?;
        self.entity_types.get(type_name)
    }

    fn navigation_property(
        &self,
        entity_set: &str,
        navigation: &str,
    ) -> Option<(&EntityType, &NavigationProperty)> {
        let owner = self.entity_type_for_set(entity_set)?;
        owner
            .navigation_properties
            .iter()
            .find(|nav| nav.name == navigation)
            .map(|nav| (owner, nav))
    }

    fn v4_navigation_targets(&self, entity_set: &str) -> BTreeMap<String, String> {
        let Some(set) = self.entity_sets.get(entity_set) else {
            return BTreeMap::new();
        };

        set.navigation_bindings
            .iter()
            .filter(|binding| !binding.path.contains('/'))
            .map(|binding| {
                // Targets may be container-qualified: "Container/Customers"
                let target = binding.target.rsplit('/').next().unwrap_or(&binding.target);
                (binding.path.clone(), target.to_string())
            })
            .collect()
    }

    fn v2_navigation_targets(&self, entity_set: &str) -> BTreeMap<String, String> {
        let Some(owner) = self.entity_type_for_set(entity_set) else {
            return BTreeMap::new();
        };

        owner
            .navigation_properties
            .iter()
            .filter_map(|nav| {
                self.v2_target_set(entity_set, nav)
                    .map(|target| (nav.name.clone(), target))
            })
            .collect()
    }

    fn v2_target_set(&self, entity_set: &str, nav: &NavigationProperty) -> Option<String> {
        let association = self.associations.get(simple_name(nav.relationship.as_deref()?))?;
        let to_role = nav.to_role.as_deref()?;
        let association_name = simple_name(&association.name);

        let candidates: Vec<&AssociationSet> = self
            .association_sets
            .iter()
            .filter(|set| simple_name(&set.association) == association_name)
            .collect();

        // Self-referencing associations can be instantiated more than once;
        // prefer the set whose source end is the requesting entity set.
        let chosen = candidates
            .iter()
            .find(|set| {
                nav.from_role.as_deref().is_some_and(|from| {
                    set.ends
                        .iter()
                        .any(|end| end.role == from && end.entity_set == entity_set)
                })
            })
            .or_else(|| candidates.first())?;

        chosen
            .ends
            .iter()
            .find(|end| end.role == to_role)
            .map(|end| end.entity_set.clone())
    }

    fn partner_constraints(
        &self,
        owner: &EntityType,
        nav: &NavigationProperty,
    ) -> Vec<ReferentialConstraint> {
        let Some(target) = nav
            .target_type_name
            .as_deref()
            .and_then(|name| self.entity_types.get(simple_name(name)))
        else {
            return Vec::new();
        };

        let owner_name = simple_name(&owner.name);
        let partner = match nav.partner.as_deref() {
            Some(partner) => target
                .navigation_properties
                .iter()
                .find(|candidate| candidate.name == partner),
            None => target.navigation_properties.iter().find(|candidate| {
                candidate.partner.as_deref() == Some(nav.name.as_str())
                    && candidate
                        .target_type_name
                        .as_deref()
                        .is_some_and(|name| simple_name(name) == owner_name)
            }),
        };

        partner
            .map(|p| {
                p.referential_constraints
                    .iter()
                    .map(ReferentialConstraint::inverted)
                    .collect()
            })
            .unwrap_or_default()
    }
}
