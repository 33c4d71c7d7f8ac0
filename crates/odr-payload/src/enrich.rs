//! Foreign-key enrichment between a parent record and its extracted children

use odr_edm::{EntityRecord, ReferentialConstraint};
use tracing::debug;

/// Back-fill missing foreign-key fields using declared constraints
///
/// For every `{source, target}` constraint, both directions are attempted:
/// the parent's `source` is taken from the first child carrying `target`,
/// then every child missing `target` receives the parent's `source`.
/// Present fields are never overwritten.
pub fn enrich(
    parent: &mut EntityRecord,
    children: &mut [EntityRecord],
    constraints: &[ReferentialConstraint],
) {
    for constraint in constraints {
        if !parent.contains_key(&constraint.source) {
            if let Some(value) = children
                .iter()
                .find_map(|child| child.get(&constraint.target))
            {
                debug!(field = %constraint.source, "enriched parent foreign key");
                parent.insert(constraint.source.clone(), value.clone());
            }
        }

        let Some(value) = parent.get(&constraint.source) else {
            continue;
        };
        for child in children.iter_mut() {
            if !child.contains_key(&constraint.target) {
                child.insert(constraint.target.clone(), value.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn record(value: Value) -> EntityRecord {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn parent_receives_key_from_child() {
        let mut parent = EntityRecord::new();
        let mut children = vec![record(json!({"ID": 9}))];

        enrich(
            &mut parent,
            &mut children,
            &[ReferentialConstraint::new("custID", "ID")],
        );

        assert_eq!(parent["custID"], json!(9));
    }

    #[test]
    fn children_receive_key_from_parent() {
        let mut parent = record(json!({"ID": "O1"}));
        let mut children = vec![
            record(json!({"ItemID": 1})),
            record(json!({"ItemID": 2, "OrderID": "other"})),
        ];

        enrich(
            &mut parent,
            &mut children,
            &[ReferentialConstraint::new("ID", "OrderID")],
        );

        assert_eq!(children[0]["OrderID"], json!("O1"));
        // present values are left alone
        assert_eq!(children[1]["OrderID"], json!("other"));
    }

    #[test]
    fn both_directions_in_one_pass() {
        let mut parent = EntityRecord::new();
        let mut children = vec![record(json!({"name": "a"})), record(json!({"ID": 3}))];

        enrich(
            &mut parent,
            &mut children,
            &[ReferentialConstraint::new("custID", "ID")],
        );

        assert_eq!(parent["custID"], json!(3));
        assert_eq!(children[0]["ID"], json!(3));
        assert_eq!(children[1]["ID"], json!(3));
    }

    #[test]
    fn nothing_to_copy() {
        let mut parent = record(json!({"x": 1}));
        let mut children = vec![record(json!({"y": 2}))];

        enrich(
            &mut parent,
            &mut children,
            &[ReferentialConstraint::new("custID", "ID")],
        );

        assert!(!parent.contains_key("custID"));
        assert!(!children[0].contains_key("ID"));
    }
}
