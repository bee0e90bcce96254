// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Persistent storage backends
//!
//! Trait-based abstractions over an ordered key-value store, so the graph
//! layer can run over sled on disk or over an in-memory map.
//!
//! # Architecture
//!
//! ```text
//! GraphStore (nodes, edges, indexes, traversal)
//!     ↓
//! StorageDriver / StorageTree (key-value abstraction, atomic transact)
//!     ↓
//! Concrete Implementations (Sled, Memory)
//! ```

pub mod factory;
pub mod traits;
pub mod types;

pub mod memory;
#[cfg(feature = "sled-backend")]
pub mod sled;

pub use factory::{create_storage_driver, BoxedDriver};
pub use traits::{KvIter, StorageDriver, StorageTree};
pub use types::{
    decode_counter, encode_counter, BatchOp, Precondition, StorageDriverError, StorageResult,
    StorageType, WriteBatch,
};
