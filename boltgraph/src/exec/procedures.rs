// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Built-in procedures reachable through `CALL`

use super::error::{ExecutionError, ExecutionResult};
use crate::constraints::{Constraint, ConstraintRegistry};
use crate::storage::Value;
use crate::txn::Transaction;
use std::collections::BTreeSet;

/// Rows produced by a procedure, with its output field names
#[derive(Debug, Clone, Default)]
pub struct ProcedureOutput {
    pub fields: Vec<&'static str>,
    pub rows: Vec<Vec<Value>>,
}

impl ProcedureOutput {
    fn new(fields: Vec<&'static str>, rows: Vec<Vec<Value>>) -> Self {
        Self { fields, rows }
    }

    fn single_column(field: &'static str, values: impl IntoIterator<Item = String>) -> Self {
        Self::new(
            vec![field],
            values.into_iter().map(|v| vec![Value::String(v)]).collect(),
        )
    }
}

pub fn call_procedure(
    name: &str,
    args: Vec<Value>,
    txn: &Transaction,
    registry: &ConstraintRegistry,
) -> ExecutionResult<ProcedureOutput> {
    let lowered = name.to_lowercase();
    let expect_args = |count: usize| -> ExecutionResult<()> {
        if args.len() == count {
            Ok(())
        } else {
            Err(ExecutionError::InvalidArgument(format!(
                "Procedure call does not provide the required number of arguments: got {} expected {} for {}",
                args.len(),
                count,
                name
            )))
        }
    };

    match lowered.as_str() {
        "tx.setmetadata" => {
            expect_args(1)?;
            let entries = match args.into_iter().next() {
                Some(Value::Map(map)) => map,
                Some(Value::Null) | None => Default::default(),
                Some(other) => {
                    return Err(ExecutionError::InvalidArgument(format!(
                        "tx.setMetaData expects a map but was {}",
                        other.type_name()
                    )))
                }
            };
            txn.set_metadata(entries)?;
            Ok(ProcedureOutput::default())
        }
        "tx.getmetadata" => {
            expect_args(0)?;
            let metadata = txn.get_metadata();
            Ok(ProcedureOutput::new(
                vec!["metadata"],
                vec![vec![Value::Map(metadata.entries().clone())]],
            ))
        }
        "db.labels" => {
            expect_args(0)?;
            Ok(ProcedureOutput::single_column("label", txn.labels()?))
        }
        "db.relationshiptypes" => {
            expect_args(0)?;
            Ok(ProcedureOutput::single_column(
                "relationshipType",
                txn.relationship_types()?,
            ))
        }
        "db.propertykeys" => {
            expect_args(0)?;
            let mut keys = BTreeSet::new();
            for node in txn.all_nodes()? {
                keys.extend(node.properties.into_keys());
            }
            for rel in txn.all_edges()? {
                keys.extend(rel.properties.into_keys());
            }
            Ok(ProcedureOutput::single_column("propertyKey", keys))
        }
        "db.constraints" => {
            expect_args(0)?;
            Ok(ProcedureOutput::new(
                vec!["name", "type", "labelsOrTypes", "properties", "description"],
                registry
                    .list()
                    .iter()
                    .map(|c| {
                        vec![
                            Value::String(c.name.clone()),
                            Value::String(c.kind.as_str().to_string()),
                            Value::List(vec![Value::String(c.label.clone())]),
                            Value::from(c.properties.clone()),
                            Value::String(c.description()),
                        ]
                    })
                    .collect(),
            ))
        }
        "dbms.components" => {
            expect_args(0)?;
            Ok(ProcedureOutput::new(
                vec!["name", "versions", "edition"],
                vec![vec![
                    Value::String("Neo4j Kernel".to_string()),
                    Value::List(vec![Value::String(crate::NEO4J_VERSION.to_string())]),
                    Value::String("community".to_string()),
                ]],
            ))
        }
        _ => Err(ExecutionError::UnknownProcedure(name.to_string())),
    }
}

/// Column names of `SHOW CONSTRAINTS`
pub const SHOW_CONSTRAINT_COLUMNS: [&str; 6] =
    ["id", "name", "type", "entityType", "labelsOrTypes", "properties"];

/// Rows of `SHOW CONSTRAINTS`, ordered by name
pub fn show_constraints(registry: &ConstraintRegistry) -> Vec<Vec<Value>> {
    registry
        .list()
        .iter()
        .enumerate()
        .map(|(i, c)| show_row(i, c))
        .collect()
}

fn show_row(index: usize, constraint: &Constraint) -> Vec<Value> {
    vec![
        Value::Integer(index as i64 + 1),
        Value::String(constraint.name.clone()),
        Value::String(constraint.kind.as_str().to_string()),
        Value::String("NODE".to_string()),
        Value::List(vec![Value::String(constraint.label.clone())]),
        Value::from(constraint.properties.clone()),
    ]
}
