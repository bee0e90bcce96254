// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Constraint validation over any view of the graph
//!
//! `validate` re-checks whole labels against the final state a commit would
//! produce. `check_node` is the cheaper per-operation probe used while a
//! transaction is still buffering writes.

use super::types::{Constraint, ConstraintKind, ConstraintViolation};
use crate::storage::{GraphStore, NodeValue, StorageError, Value};
use std::collections::HashMap;
use thiserror::Error;

/// Source of labelled nodes for validation
pub trait LabelScan {
    /// Every node visible in this view carrying `label`
    fn nodes_with_label(&self, label: &str) -> Result<Vec<NodeValue>, StorageError>;
}

impl LabelScan for GraphStore {
    fn nodes_with_label(&self, label: &str) -> Result<Vec<NodeValue>, StorageError> {
        Ok(self
            .nodes_by_label(label)?
            .iter()
            .map(NodeValue::from)
            .collect())
    }
}

/// Validation errors
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error(transparent)]
    Violation(#[from] ConstraintViolation),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Values of the constrained properties, null where absent
fn values_of(node: &NodeValue, constraint: &Constraint) -> Vec<Value> {
    constraint
        .properties
        .iter()
        .map(|p| node.properties.get(p).cloned().unwrap_or(Value::Null))
        .collect()
}

/// Equality key for a tuple, or None when any element is null
fn tuple_key(values: &[Value]) -> Option<String> {
    if values.iter().any(Value::is_null) {
        return None;
    }
    Some(
        values
            .iter()
            .map(Value::canonical_key)
            .collect::<Vec<_>>()
            .join("\u{1}"),
    )
}

/// Check every constraint against the view, returning the first violation
pub fn validate<V: LabelScan + ?Sized>(
    constraints: &[Constraint],
    view: &V,
) -> Result<(), ValidationError> {
    for constraint in constraints {
        let nodes = view.nodes_with_label(&constraint.label)?;
        check_label(constraint, &nodes)?;
    }
    Ok(())
}

fn check_label(constraint: &Constraint, nodes: &[NodeValue]) -> Result<(), ConstraintViolation> {
    match constraint.kind {
        ConstraintKind::Exists => {
            for node in nodes {
                let values = values_of(node, constraint);
                if values.iter().any(Value::is_null) {
                    return Err(ConstraintViolation::missing(constraint, node.id, values));
                }
            }
        }
        ConstraintKind::Unique | ConstraintKind::NodeKey => {
            let mut seen: HashMap<String, &NodeValue> = HashMap::with_capacity(nodes.len());
            for node in nodes {
                let values = values_of(node, constraint);
                let key = match tuple_key(&values) {
                    Some(key) => key,
                    None if constraint.kind == ConstraintKind::NodeKey => {
                        return Err(ConstraintViolation::missing(constraint, node.id, values));
                    }
                    None => continue,
                };
                if let Some(first) = seen.get(&key) {
                    return Err(ConstraintViolation::duplicate(constraint, first.id, values));
                }
                seen.insert(key, node);
            }
        }
    }
    Ok(())
}

/// Probe uniqueness of one candidate node against the rest of the view.
/// Existence rules are left to commit, since later clauses may still set them.
pub fn check_node<V: LabelScan + ?Sized>(
    node: &NodeValue,
    constraints: &[Constraint],
    view: &V,
) -> Result<(), ValidationError> {
    for constraint in constraints {
        if constraint.kind == ConstraintKind::Exists || !node.labels.contains(&constraint.label) {
            continue;
        }
        let values = values_of(node, constraint);
        let key = match tuple_key(&values) {
            Some(key) => key,
            None => continue,
        };
        for other in view.nodes_with_label(&constraint.label)? {
            if other.id == node.id {
                continue;
            }
            if tuple_key(&values_of(&other, constraint)).as_deref() == Some(key.as_str()) {
                return Err(ConstraintViolation::duplicate(constraint, other.id, values).into());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{EntityRef, PropertyMap};

    struct Fixed(Vec<NodeValue>);

    impl LabelScan for Fixed {
        fn nodes_with_label(&self, label: &str) -> Result<Vec<NodeValue>, StorageError> {
            Ok(self
                .0
                .iter()
                .filter(|n| n.labels.iter().any(|l| l == label))
                .cloned()
                .collect())
        }
    }

    fn node(id: i64, label: &str, props: &[(&str, Value)]) -> NodeValue {
        NodeValue {
            id: EntityRef::from_wire_id(id),
            labels: vec![label.to_string()],
            properties: props
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect::<PropertyMap>(),
        }
    }

    fn unique(label: &str, prop: &str) -> Constraint {
        Constraint::new(None, ConstraintKind::Unique, label, vec![prop.into()]).unwrap()
    }

    #[test]
    fn test_unique_ignores_nulls_and_compares_numerically() {
        let c = unique("N", "v");
        let view = Fixed(vec![
            node(1, "N", &[]),
            node(2, "N", &[]),
            node(3, "N", &[("v", Value::Integer(1))]),
        ]);
        assert!(validate(&[c.clone()], &view).is_ok());

        let view = Fixed(vec![
            node(1, "N", &[("v", Value::Integer(1))]),
            node(-1, "N", &[("v", Value::Float(1.0))]),
        ]);
        match validate(&[c], &view) {
            Err(ValidationError::Violation(v)) => assert_eq!(v.entity, EntityRef::Permanent(1)),
            other => panic!("expected violation, got {:?}", other),
        }
    }

    #[test]
    fn test_exists_requires_value() {
        let c = Constraint::new(None, ConstraintKind::Exists, "Person", vec!["name".into()]).unwrap();
        let view = Fixed(vec![node(-1, "Person", &[("age", Value::Integer(30))])]);
        assert!(matches!(
            validate(&[c], &view),
            Err(ValidationError::Violation(v)) if v.kind == ConstraintKind::Exists
        ));
    }

    #[test]
    fn test_node_key_tuples() {
        let c = Constraint::new(
            None,
            ConstraintKind::NodeKey,
            "P",
            vec!["a".into(), "b".into()],
        )
        .unwrap();
        let distinct = Fixed(vec![
            node(1, "P", &[("a", 1.into()), ("b", 1.into())]),
            node(2, "P", &[("a", 1.into()), ("b", 2.into())]),
        ]);
        assert!(validate(&[c.clone()], &distinct).is_ok());

        let same = Fixed(vec![
            node(1, "P", &[("a", 1.into()), ("b", 1.into())]),
            node(2, "P", &[("a", 1.into()), ("b", 1.into())]),
        ]);
        assert!(validate(&[c.clone()], &same).is_err());

        let partial = Fixed(vec![node(1, "P", &[("a", 1.into())])]);
        assert!(validate(&[c], &partial).is_err());
    }

    #[test]
    fn test_check_node_skips_self() {
        let c = unique("U", "email");
        let existing = node(1, "U", &[("email", "a@x.com".into())]);
        let view = Fixed(vec![existing.clone()]);
        assert!(check_node(&existing, &[c.clone()], &view).is_ok());

        let candidate = node(-1, "U", &[("email", "a@x.com".into())]);
        assert!(check_node(&candidate, &[c], &view).is_err());
    }
}
