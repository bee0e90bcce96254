// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Graph storage over a pluggable key-value backend
//!
//! This module provides:
//! - Value type system for graph properties and results
//! - Node and relationship records with permanent identities
//! - Key layout for records, label indexes and adjacency lists
//! - `GraphStore`, the storage adapter applying atomic batches
//! - Breadth-first traversal shared with transaction views

pub mod graph_store;
pub mod keys;
pub mod persistent;
pub mod traversal;
pub mod types;
pub mod value;

pub use graph_store::{GraphStore, Versioned};
pub use persistent::{Precondition, StorageType, WriteBatch};
pub use traversal::{RawPath, Traversable};
pub use types::{
    Direction, Edge, EdgeId, EntityRef, Node, NodeId, Path, StorageError, StorageResult,
};
pub use value::{NodeValue, PathValue, PropertyMap, RelationshipValue, Value};
