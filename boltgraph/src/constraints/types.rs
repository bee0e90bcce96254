// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Constraint definitions and error types

use crate::storage::{EntityRef, StorageError, Value};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Kind of rule a constraint enforces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConstraintKind {
    /// No two nodes with the label share a non-null value
    Unique,
    /// Every node with the label has a non-null value
    Exists,
    /// Every node has all the properties, and the tuple is unique
    NodeKey,
}

impl ConstraintKind {
    /// Type name as reported by `SHOW CONSTRAINTS`
    pub fn as_str(&self) -> &'static str {
        match self {
            ConstraintKind::Unique => "UNIQUENESS",
            ConstraintKind::Exists => "NODE_PROPERTY_EXISTENCE",
            ConstraintKind::NodeKey => "NODE_KEY",
        }
    }

    fn name_suffix(&self) -> &'static str {
        match self {
            ConstraintKind::Unique => "unique",
            ConstraintKind::Exists => "exists",
            ConstraintKind::NodeKey => "node_key",
        }
    }
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Named rule over one label and an ordered property list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraint {
    pub name: String,
    pub kind: ConstraintKind,
    pub label: String,
    pub properties: Vec<String>,
}

impl Constraint {
    /// Build a constraint, checking arity and generating a name when none is given
    pub fn new(
        name: Option<String>,
        kind: ConstraintKind,
        label: impl Into<String>,
        properties: Vec<String>,
    ) -> Result<Self, ConstraintError> {
        let label = label.into();
        if label.is_empty() {
            return Err(ConstraintError::InvalidDefinition(
                "constraint label must not be empty".to_string(),
            ));
        }
        match kind {
            ConstraintKind::Unique | ConstraintKind::Exists if properties.len() != 1 => {
                return Err(ConstraintError::InvalidDefinition(format!(
                    "{} constraints take exactly one property, got {}",
                    kind,
                    properties.len()
                )));
            }
            ConstraintKind::NodeKey if properties.is_empty() => {
                return Err(ConstraintError::InvalidDefinition(
                    "NODE KEY constraints take at least one property".to_string(),
                ));
            }
            _ => {}
        }
        let mut seen = std::collections::HashSet::new();
        if let Some(dup) = properties.iter().find(|p| !seen.insert(p.as_str())) {
            return Err(ConstraintError::InvalidDefinition(format!(
                "property '{}' listed twice",
                dup
            )));
        }

        let name = match name {
            Some(name) if !name.is_empty() => name,
            _ => format!(
                "constraint_{}_{}_{}",
                label.to_lowercase(),
                properties.join("_").to_lowercase(),
                kind.name_suffix()
            ),
        };
        Ok(Self {
            name,
            kind,
            label,
            properties,
        })
    }

    /// Same rule, ignoring the name
    pub fn is_equivalent(&self, other: &Constraint) -> bool {
        self.kind == other.kind && self.label == other.label && self.properties == other.properties
    }

    /// Cypher-like description used by `SHOW CONSTRAINTS`
    pub fn description(&self) -> String {
        let props = if self.properties.len() == 1 {
            format!("n.{}", self.properties[0])
        } else {
            format!(
                "({})",
                self.properties
                    .iter()
                    .map(|p| format!("n.{}", p))
                    .collect::<Vec<_>>()
                    .join(", ")
            )
        };
        let predicate = match self.kind {
            ConstraintKind::Unique => "IS UNIQUE",
            ConstraintKind::Exists => "IS NOT NULL",
            ConstraintKind::NodeKey => "IS NODE KEY",
        };
        format!(
            "CONSTRAINT {} FOR (n:{}) REQUIRE {} {}",
            self.name, self.label, props, predicate
        )
    }
}

/// A node that breaks a constraint
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct ConstraintViolation {
    pub constraint: String,
    pub kind: ConstraintKind,
    pub label: String,
    pub properties: Vec<String>,
    pub entity: EntityRef,
    pub values: Vec<Value>,
    pub message: String,
}

impl ConstraintViolation {
    pub(crate) fn duplicate(constraint: &Constraint, entity: EntityRef, values: Vec<Value>) -> Self {
        let rendered = constraint
            .properties
            .iter()
            .zip(values.iter())
            .map(|(p, v)| format!("`{}` = {}", p, literal(v)))
            .collect::<Vec<_>>()
            .join(", ");
        let noun = if constraint.properties.len() == 1 {
            "property"
        } else {
            "properties"
        };
        let message = format!(
            "Node({}) already exists with label `{}` and {} {}",
            entity.wire_id(),
            constraint.label,
            noun,
            rendered
        );
        Self::build(constraint, entity, values, message)
    }

    pub(crate) fn missing(constraint: &Constraint, entity: EntityRef, values: Vec<Value>) -> Self {
        let message = if constraint.properties.len() == 1 {
            format!(
                "Node({}) with label `{}` must have the property `{}`",
                entity.wire_id(),
                constraint.label,
                constraint.properties[0]
            )
        } else {
            format!(
                "Node({}) with label `{}` must have the properties ({})",
                entity.wire_id(),
                constraint.label,
                constraint
                    .properties
                    .iter()
                    .map(|p| format!("`{}`", p))
                    .collect::<Vec<_>>()
                    .join(", ")
            )
        };
        Self::build(constraint, entity, values, message)
    }

    fn build(constraint: &Constraint, entity: EntityRef, values: Vec<Value>, message: String) -> Self {
        Self {
            constraint: constraint.name.clone(),
            kind: constraint.kind,
            label: constraint.label.clone(),
            properties: constraint.properties.clone(),
            entity,
            values,
            message,
        }
    }
}

fn literal(value: &Value) -> String {
    match value {
        Value::String(s) => format!("'{}'", s),
        other => other.to_string(),
    }
}

/// Errors from constraint administration
#[derive(Debug, Error)]
pub enum ConstraintError {
    #[error("An equivalent constraint already exists, '{0}'")]
    AlreadyExists(String),

    #[error("Constraint already exists: {existing} is equivalent to the requested constraint")]
    Equivalent { existing: String },

    #[error("No such constraint: '{0}'")]
    NotFound(String),

    #[error("Invalid constraint definition: {0}")]
    InvalidDefinition(String),

    #[error("Unable to create constraint '{name}': {violation}")]
    CreationFailed {
        name: String,
        violation: ConstraintViolation,
    },

    #[error("Schema changed concurrently, retry: {0}")]
    Conflict(String),

    #[error("Storage error: {0}")]
    Storage(StorageError),
}

impl From<StorageError> for ConstraintError {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::Conflict(key) => ConstraintError::Conflict(key),
            other => ConstraintError::Storage(other),
        }
    }
}

impl From<bincode::Error> for ConstraintError {
    fn from(error: bincode::Error) -> Self {
        ConstraintError::Storage(error.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arity_checks() {
        assert!(Constraint::new(None, ConstraintKind::Unique, "User", vec![]).is_err());
        assert!(Constraint::new(
            None,
            ConstraintKind::Exists,
            "User",
            vec!["a".into(), "b".into()]
        )
        .is_err());
        assert!(Constraint::new(None, ConstraintKind::NodeKey, "User", vec![]).is_err());
        assert!(Constraint::new(
            None,
            ConstraintKind::NodeKey,
            "User",
            vec!["a".into(), "a".into()]
        )
        .is_err());
    }

    #[test]
    fn test_generated_name() {
        let c = Constraint::new(None, ConstraintKind::Unique, "User", vec!["email".into()]).unwrap();
        assert_eq!(c.name, "constraint_user_email_unique");
        assert_eq!(
            c.description(),
            "CONSTRAINT constraint_user_email_unique FOR (n:User) REQUIRE n.email IS UNIQUE"
        );
    }

    #[test]
    fn test_violation_message() {
        let c = Constraint::new(None, ConstraintKind::Unique, "User", vec!["email".into()]).unwrap();
        let v = ConstraintViolation::duplicate(
            &c,
            EntityRef::Permanent(4),
            vec![Value::String("a@x.com".into())],
        );
        assert_eq!(
            v.to_string(),
            "Node(4) already exists with label `User` and property `email` = 'a@x.com'"
        );
    }
}
