// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Sled storage driver implementation
//!
//! Atomic commits run inside a sled transaction. Sled re-executes the closure
//! when a concurrent writer touched the same keys, so preconditions are always
//! evaluated against the latest committed state before anything is written.

use super::traits::{KvIter, StorageDriver, StorageTree};
use super::types::{
    decode_counter, encode_counter, BatchOp, Precondition, StorageDriverError, StorageResult,
    StorageType, WriteBatch,
};
use sled::transaction::{ConflictableTransactionError, TransactionError, TransactionResult};
use std::path::Path;

fn backend(e: sled::Error) -> StorageDriverError {
    StorageDriverError::BackendSpecific(e.to_string())
}

/// Sled driver implementation
pub struct SledDriver {
    db: sled::Db,
}

impl SledDriver {
    /// Open a throwaway database that is removed when dropped
    pub fn temporary() -> StorageResult<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(backend)?;
        Ok(SledDriver { db })
    }
}

/// Sled tree wrapper that implements StorageTree trait
pub struct SledTree {
    tree: sled::Tree,
}

impl StorageTree for SledTree {
    fn insert(&self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        self.tree.insert(key, value).map_err(backend)?;
        Ok(())
    }

    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        self.tree
            .get(key)
            .map_err(backend)
            .map(|opt| opt.map(|v| v.to_vec()))
    }

    fn remove(&self, key: &[u8]) -> StorageResult<()> {
        self.tree.remove(key).map_err(backend)?;
        Ok(())
    }

    fn contains_key(&self, key: &[u8]) -> StorageResult<bool> {
        self.tree.contains_key(key).map_err(backend)
    }

    fn clear(&self) -> StorageResult<()> {
        self.tree.clear().map_err(backend)
    }

    fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.tree.is_empty())
    }

    fn iter(&self) -> StorageResult<KvIter<'_>> {
        let iter = self.tree.iter().map(|result| {
            result
                .map(|(k, v)| (k.to_vec(), v.to_vec()))
                .map_err(backend)
        });
        Ok(Box::new(iter))
    }

    fn scan_prefix(&self, prefix: &[u8]) -> StorageResult<KvIter<'_>> {
        let iter = self.tree.scan_prefix(prefix).map(|result| {
            result
                .map(|(k, v)| (k.to_vec(), v.to_vec()))
                .map_err(backend)
        });
        Ok(Box::new(iter))
    }

    fn transact(&self, preconditions: &[Precondition], batch: &WriteBatch) -> StorageResult<()> {
        let result: TransactionResult<(), StorageDriverError> = self.tree.transaction(|tx| {
            for pre in preconditions {
                let current = tx.get(pre.key())?;
                if !pre.holds(current.as_deref()) {
                    return Err(ConflictableTransactionError::Abort(pre.conflict()));
                }
            }

            for op in batch.ops() {
                match op {
                    BatchOp::Put(key, value) => {
                        tx.insert(key.as_slice(), value.as_slice())?;
                    }
                    BatchOp::Delete(key) => {
                        tx.remove(key.as_slice())?;
                    }
                }
            }

            for (key, delta) in batch.counters() {
                let current = decode_counter(tx.get(key.as_slice())?.as_deref());
                let next = current + delta;
                if next == 0 {
                    tx.remove(key.as_slice())?;
                } else {
                    tx.insert(key.as_slice(), encode_counter(next))?;
                }
            }

            Ok(())
        });

        match result {
            Ok(()) => Ok(()),
            Err(TransactionError::Abort(e)) => Err(e),
            Err(TransactionError::Storage(e)) => Err(backend(e)),
        }
    }

    fn flush(&self) -> StorageResult<()> {
        self.tree.flush().map_err(backend)?;
        Ok(())
    }
}

impl StorageDriver for SledDriver {
    type Tree = Box<dyn StorageTree>;

    fn open<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        let db = sled::open(path).map_err(backend)?;
        Ok(SledDriver { db })
    }

    fn open_tree(&self, name: &str) -> StorageResult<Self::Tree> {
        let tree = self.db.open_tree(name).map_err(backend)?;
        Ok(Box::new(SledTree { tree }) as Box<dyn StorageTree>)
    }

    fn list_trees(&self) -> StorageResult<Vec<String>> {
        let tree_names = self
            .db
            .tree_names()
            .into_iter()
            .map(|name| String::from_utf8_lossy(&name).to_string())
            .collect();
        Ok(tree_names)
    }

    fn flush(&self) -> StorageResult<()> {
        self.db.flush().map_err(backend)?;
        Ok(())
    }

    fn storage_type(&self) -> StorageType {
        StorageType::Sled
    }

    fn generate_id(&self) -> StorageResult<u64> {
        self.db.generate_id().map_err(backend)
    }

    fn shutdown(&mut self) -> StorageResult<()> {
        self.db.flush().map_err(backend)?;
        Ok(())
    }
}
