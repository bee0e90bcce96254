// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Process-wide constraint registry
//!
//! Definitions are persisted under `c/` keys and cached in memory. Every
//! change bumps the schema epoch so commits validated against an older
//! constraint set fail their preconditions instead of slipping through.

use super::types::{Constraint, ConstraintError};
use super::validator::{validate, ValidationError};
use crate::storage::keys;
use crate::storage::persistent::decode_counter;
use crate::storage::{GraphStore, Precondition, StorageError, WriteBatch};
use log::{info, warn};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

/// Read-mostly map of constraint name to definition
#[derive(Debug, Default)]
pub struct ConstraintRegistry {
    constraints: RwLock<HashMap<String, Constraint>>,
}

impl ConstraintRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every persisted definition
    pub fn load(store: &GraphStore) -> Result<Self, ConstraintError> {
        let mut constraints = HashMap::new();
        let scan = store
            .tree()
            .scan_prefix(keys::CONSTRAINT_PREFIX)
            .map_err(StorageError::from)?;
        for item in scan {
            let (_, value) = item.map_err(StorageError::from)?;
            let constraint: Constraint = bincode::deserialize(&value)?;
            constraints.insert(constraint.name.clone(), constraint);
        }
        info!("Loaded {} constraints", constraints.len());
        Ok(Self {
            constraints: RwLock::new(constraints),
        })
    }

    /// Current schema epoch as stored
    pub fn schema_epoch(store: &GraphStore) -> Result<i64, ConstraintError> {
        Ok(decode_counter(
            store.read_raw(&keys::schema_epoch_key())?.as_deref(),
        ))
    }

    /// Register a constraint after checking committed data against it.
    /// Returns false when `if_not_exists` suppressed a duplicate.
    pub fn create(
        &self,
        store: &GraphStore,
        constraint: Constraint,
        if_not_exists: bool,
    ) -> Result<bool, ConstraintError> {
        let mut constraints = self.constraints.write();

        if let Some(existing) = constraints.get(&constraint.name) {
            if if_not_exists && existing.is_equivalent(&constraint) {
                return Ok(false);
            }
            return Err(ConstraintError::AlreadyExists(existing.name.clone()));
        }
        if let Some(existing) = constraints.values().find(|c| c.is_equivalent(&constraint)) {
            if if_not_exists {
                return Ok(false);
            }
            return Err(ConstraintError::Equivalent {
                existing: existing.name.clone(),
            });
        }

        // Guards are read before the scan so writes landing after it conflict
        let epoch = Self::schema_epoch(store)?;
        let guard_key = keys::label_guard_key(&constraint.label);
        let guard = decode_counter(store.read_raw(&guard_key)?.as_deref());

        match validate(std::slice::from_ref(&constraint), store) {
            Ok(()) => {}
            Err(ValidationError::Violation(violation)) => {
                warn!(
                    "Constraint {} rejected by existing data: {}",
                    constraint.name, violation
                );
                return Err(ConstraintError::CreationFailed {
                    name: constraint.name.clone(),
                    violation,
                });
            }
            Err(ValidationError::Storage(e)) => return Err(e.into()),
        }

        let key = keys::constraint_key(&constraint.name);
        let mut batch = WriteBatch::new();
        batch.put(key.clone(), bincode::serialize(&constraint)?);
        batch.add(keys::schema_epoch_key(), 1);
        let preconditions = [
            Precondition::Absent(key),
            Precondition::counter(keys::schema_epoch_key(), epoch),
            Precondition::counter(guard_key, guard),
        ];
        store.commit(&preconditions, &batch)?;

        info!("Created constraint {}", constraint.description());
        constraints.insert(constraint.name.clone(), constraint);
        Ok(true)
    }

    /// Remove a constraint. Returns false when `if_exists` suppressed a miss.
    pub fn drop_constraint(&self, store: &GraphStore, name: &str, if_exists: bool) -> Result<bool, ConstraintError> {
        let mut constraints = self.constraints.write();
        if !constraints.contains_key(name) {
            if if_exists {
                return Ok(false);
            }
            return Err(ConstraintError::NotFound(name.to_string()));
        }

        let key = keys::constraint_key(name);
        let mut batch = WriteBatch::new();
        batch.delete(key.clone());
        batch.add(keys::schema_epoch_key(), 1);
        store.commit(&[Precondition::Present(key)], &batch)?;

        constraints.remove(name);
        info!("Dropped constraint {}", name);
        Ok(true)
    }

    /// All constraints, ordered by name
    pub fn list(&self) -> Vec<Constraint> {
        let mut all: Vec<_> = self.constraints.read().values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    pub fn get(&self, name: &str) -> Option<Constraint> {
        self.constraints.read().get(name).cloned()
    }

    /// Constraints on any of `labels`, ordered by name
    pub fn for_labels<'a, I>(&self, labels: I) -> Vec<Constraint>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let wanted: HashSet<&String> = labels.into_iter().collect();
        let mut found: Vec<_> = self
            .constraints
            .read()
            .values()
            .filter(|c| wanted.contains(&c.label))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        found
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.read().is_empty()
    }

    pub fn len(&self) -> usize {
        self.constraints.read().len()
    }
}
