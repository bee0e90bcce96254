// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Storage driver types and error handling
//!
//! This module defines the types, enums, and error handling used throughout
//! the storage driver system, including the write batch and precondition
//! types consumed by atomic commits.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Debug;
use thiserror::Error;

/// Storage driver type configuration
///
/// Specifies which underlying key-value engine backs the graph.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    /// Sled - pure Rust embedded database with its own WAL and optimistic transactions
    #[default]
    Sled,

    /// Memory - ephemeral ordered map, for tests and throwaway instances
    Memory,
}

impl std::str::FromStr for StorageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sled" => Ok(StorageType::Sled),
            "memory" => Ok(StorageType::Memory),
            _ => Err(format!(
                "Unknown storage type: {}. Valid options: sled, memory",
                s
            )),
        }
    }
}

impl std::fmt::Display for StorageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StorageType::Sled => "sled",
            StorageType::Memory => "memory",
        };
        write!(f, "{}", name)
    }
}

/// Error type for storage driver operations
#[derive(Error, Debug)]
pub enum StorageDriverError {
    /// I/O related errors
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Data serialization or deserialization failed
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// A commit precondition no longer holds because another writer got there first
    #[error("Write conflict on key {0}")]
    Conflict(String),

    /// Driver-specific error (Sled, ...)
    #[error("Storage driver error: {0}")]
    BackendSpecific(String),
}

impl From<bincode::Error> for StorageDriverError {
    fn from(e: bincode::Error) -> Self {
        StorageDriverError::SerializationError(e.to_string())
    }
}

/// Result type for storage driver operations
pub type StorageResult<T> = Result<T, StorageDriverError>;

/// A single mutation inside a [`WriteBatch`]
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOp {
    Put(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

/// Ordered set of mutations applied all-or-nothing by [`super::StorageTree::transact`]
///
/// Counter deltas are aggregated per key so that a batch touching the same
/// counter several times still performs a single read-modify-write.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
    counters: BTreeMap<Vec<u8>, i64>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.ops.push(BatchOp::Put(key, value));
    }

    pub fn delete(&mut self, key: Vec<u8>) {
        self.ops.push(BatchOp::Delete(key));
    }

    /// Add `delta` to the big-endian i64 counter stored at `key`.
    /// A counter that reaches zero is removed.
    pub fn add(&mut self, key: Vec<u8>, delta: i64) {
        *self.counters.entry(key).or_insert(0) += delta;
    }

    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    pub fn counters(&self) -> impl Iterator<Item = (&Vec<u8>, i64)> {
        self.counters
            .iter()
            .filter(|(_, delta)| **delta != 0)
            .map(|(k, d)| (k, *d))
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty() && self.counters.values().all(|d| *d == 0)
    }

    pub fn len(&self) -> usize {
        self.ops.len() + self.counters.len()
    }
}

/// Condition that must hold on the committed store for a batch to apply
#[derive(Debug, Clone, PartialEq)]
pub enum Precondition {
    /// Key must not exist
    Absent(Vec<u8>),
    /// Key must exist, with any value
    Present(Vec<u8>),
    /// Key must hold exactly these bytes
    Equals(Vec<u8>, Vec<u8>),
}

impl Precondition {
    pub fn key(&self) -> &[u8] {
        match self {
            Precondition::Absent(k) | Precondition::Present(k) | Precondition::Equals(k, _) => k,
        }
    }

    /// Evaluate against the current value of [`Self::key`]
    pub fn holds(&self, current: Option<&[u8]>) -> bool {
        match self {
            Precondition::Absent(_) => current.is_none(),
            Precondition::Present(_) => current.is_some(),
            Precondition::Equals(_, expected) => current == Some(expected.as_slice()),
        }
    }

    /// Expect a counter written by [`WriteBatch::add`] to hold `observed`.
    /// Zero counters are never stored, so zero means absent.
    pub fn counter(key: Vec<u8>, observed: i64) -> Self {
        if observed == 0 {
            Precondition::Absent(key)
        } else {
            Precondition::Equals(key, encode_counter(observed))
        }
    }

    /// Conflict error naming the offending key
    pub fn conflict(&self) -> StorageDriverError {
        StorageDriverError::Conflict(String::from_utf8_lossy(self.key()).into_owned())
    }
}

/// Encode a counter value the way [`WriteBatch::add`] stores it
pub fn encode_counter(value: i64) -> Vec<u8> {
    value.to_be_bytes().to_vec()
}

/// Decode a stored counter; missing or malformed values read as zero
pub fn decode_counter(bytes: Option<&[u8]>) -> i64 {
    match bytes {
        Some(b) if b.len() == 8 => {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(b);
            i64::from_be_bytes(buf)
        }
        _ => 0,
    }
}
