// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Graph data structures and error types
//!
//! Defines the committed Node and Edge records, entity identities,
//! traversal direction, and the error types for storage operations.

use crate::storage::persistent::StorageDriverError;
use crate::storage::value::{PropertyMap, Value};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Error types for storage operations
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Relationship not found: {0}")]
    EdgeNotFound(String),

    #[error("Cannot delete node {0}, because it still has relationships. To delete this node, you must first delete its relationships.")]
    NodeHasRelationships(String),

    #[error("Invalid property '{key}': {reason}")]
    InvalidProperty { key: String, reason: String },

    #[error("Concurrent write conflict: {0}")]
    Conflict(String),

    #[error("Storage fault: {0}")]
    Fault(String),
}

impl From<StorageDriverError> for StorageError {
    fn from(error: StorageDriverError) -> Self {
        match error {
            StorageDriverError::Conflict(key) => StorageError::Conflict(key),
            other => StorageError::Fault(other.to_string()),
        }
    }
}

impl From<bincode::Error> for StorageError {
    fn from(error: bincode::Error) -> Self {
        StorageError::Fault(format!("corrupt record: {}", error))
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Identity of a committed node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

/// Identity of a committed relationship
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of an entity as seen from inside a transaction
///
/// Entities created by a transaction carry a transaction-local index until
/// commit resolves them to permanent identities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityRef {
    Temporary(u32),
    Permanent(u64),
}

impl EntityRef {
    /// Integer identity exposed to clients. Temporary refs map to negative numbers.
    pub fn wire_id(&self) -> i64 {
        match self {
            EntityRef::Permanent(id) => *id as i64,
            EntityRef::Temporary(index) => -(*index as i64) - 1,
        }
    }

    /// String identity returned by `elementId()` and Bolt 5 structures
    pub fn element_id(&self) -> String {
        self.wire_id().to_string()
    }

    /// Inverse of [`Self::wire_id`]
    pub fn from_wire_id(id: i64) -> Self {
        if id < 0 {
            EntityRef::Temporary((-(id + 1)) as u32)
        } else {
            EntityRef::Permanent(id as u64)
        }
    }

    pub fn permanent(&self) -> Option<u64> {
        match self {
            EntityRef::Permanent(id) => Some(*id),
            EntityRef::Temporary(_) => None,
        }
    }

    pub fn is_temporary(&self) -> bool {
        matches!(self, EntityRef::Temporary(_))
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityRef::Permanent(id) => write!(f, "{}", id),
            EntityRef::Temporary(index) => write!(f, "tmp:{}", index),
        }
    }
}

impl From<NodeId> for EntityRef {
    fn from(id: NodeId) -> Self {
        EntityRef::Permanent(id.0)
    }
}

impl From<EdgeId> for EntityRef {
    fn from(id: EdgeId) -> Self {
        EntityRef::Permanent(id.0)
    }
}

/// Relationship direction relative to a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Direction {
    Outgoing,
    Incoming,
    #[default]
    Both,
}

impl Direction {
    pub fn reverse(self) -> Self {
        match self {
            Direction::Outgoing => Direction::Incoming,
            Direction::Incoming => Direction::Outgoing,
            Direction::Both => Direction::Both,
        }
    }
}

/// Graph node with id, labels, and properties
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub labels: Vec<String>,
    pub properties: PropertyMap,
}

impl Node {
    /// Create a node, deduplicating labels while keeping their first-seen order
    pub fn new(id: NodeId, labels: Vec<String>, properties: PropertyMap) -> Self {
        let mut node = Self {
            id,
            labels: Vec::with_capacity(labels.len()),
            properties,
        };
        for label in labels {
            node.add_label(label);
        }
        node
    }

    /// Add a label to this node; returns false when it was already present
    pub fn add_label(&mut self, label: String) -> bool {
        if self.labels.contains(&label) {
            return false;
        }
        self.labels.push(label);
        true
    }

    /// Remove a label; returns false when it was absent
    pub fn remove_label(&mut self, label: &str) -> bool {
        let before = self.labels.len();
        self.labels.retain(|l| l != label);
        before != self.labels.len()
    }

    /// Check if node has a specific label
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    /// Get a property value
    pub fn get_property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }
}

/// Graph relationship with id, endpoints, type, and properties
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub rel_type: String,
    pub start: NodeId,
    pub end: NodeId,
    pub properties: PropertyMap,
}

impl Edge {
    /// Endpoint opposite to `node`; self-loops return the node itself
    pub fn other_node(&self, node: NodeId) -> NodeId {
        if self.start == node {
            self.end
        } else {
            self.start
        }
    }

    /// Check if this edge goes from `from` to `to`
    pub fn goes_from_to(&self, from: NodeId, to: NodeId) -> bool {
        self.start == from && self.end == to
    }

    /// Get a property value
    pub fn get_property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }
}

/// Committed path: `nodes.len() == edges.len() + 1`
#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl Path {
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}
