// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Client-supplied transaction metadata
//!
//! Metadata is opaque to the engine. It is attached to log lines on commit
//! and rollback, and returned by `tx.getMetaData()`.

use super::error::TransactionError;
use crate::storage::Value;
use std::collections::BTreeMap;

/// Upper bound on the serialized size of all keys and values
pub const MAX_METADATA_SIZE: usize = 2048;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionMetadata {
    entries: BTreeMap<String, Value>,
}

impl TransactionMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build metadata from a map, enforcing the size limit
    pub fn from_map(entries: BTreeMap<String, Value>) -> Result<Self, TransactionError> {
        let size = serialized_size(&entries);
        if size > MAX_METADATA_SIZE {
            return Err(TransactionError::MetadataTooLarge {
                size,
                limit: MAX_METADATA_SIZE,
            });
        }
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &BTreeMap<String, Value> {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.entries
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }
}

/// Characters in the keys plus the JSON rendering of each value
fn serialized_size(entries: &BTreeMap<String, Value>) -> usize {
    entries
        .iter()
        .map(|(k, v)| k.chars().count() + v.to_json().to_string().chars().count())
        .sum()
}
