// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! In-memory storage driver implementation for tests and ephemeral databases

use super::traits::{KvIter, StorageDriver, StorageTree};
use super::types::{
    decode_counter, encode_counter, BatchOp, Precondition, StorageResult, StorageType, WriteBatch,
};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// In-memory storage driver
pub struct MemoryStorageDriver {
    trees: Arc<RwLock<HashMap<String, Arc<MemoryTree>>>>,
    next_id: AtomicU64,
}

/// In-memory tree implementation, ordered so prefix scans match sled
pub struct MemoryTree {
    data: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStorageDriver {
    /// Create a new memory storage driver
    pub fn new() -> Self {
        Self {
            trees: Arc::new(RwLock::new(HashMap::new())),
            next_id: AtomicU64::new(0),
        }
    }
}

impl Default for MemoryStorageDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageTree for MemoryTree {
    fn insert(&self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        self.data.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.data.read().get(key).cloned())
    }

    fn remove(&self, key: &[u8]) -> StorageResult<()> {
        self.data.write().remove(key);
        Ok(())
    }

    fn contains_key(&self, key: &[u8]) -> StorageResult<bool> {
        Ok(self.data.read().contains_key(key))
    }

    fn clear(&self) -> StorageResult<()> {
        self.data.write().clear();
        Ok(())
    }

    fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.data.read().is_empty())
    }

    fn iter(&self) -> StorageResult<KvIter<'_>> {
        let data = self.data.read();
        let items: Vec<_> = data
            .iter()
            .map(|(k, v)| Ok((k.clone(), v.clone())))
            .collect();
        Ok(Box::new(items.into_iter()))
    }

    fn scan_prefix(&self, prefix: &[u8]) -> StorageResult<KvIter<'_>> {
        let data = self.data.read();
        let items: Vec<_> = data
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| Ok((k.clone(), v.clone())))
            .collect();
        Ok(Box::new(items.into_iter()))
    }

    fn transact(&self, preconditions: &[Precondition], batch: &WriteBatch) -> StorageResult<()> {
        let mut data = self.data.write();

        for pre in preconditions {
            if !pre.holds(data.get(pre.key()).map(|v| v.as_slice())) {
                return Err(pre.conflict());
            }
        }

        for op in batch.ops() {
            match op {
                BatchOp::Put(key, value) => {
                    data.insert(key.clone(), value.clone());
                }
                BatchOp::Delete(key) => {
                    data.remove(key);
                }
            }
        }

        for (key, delta) in batch.counters() {
            let next = decode_counter(data.get(key).map(|v| v.as_slice())) + delta;
            if next == 0 {
                data.remove(key);
            } else {
                data.insert(key.clone(), encode_counter(next));
            }
        }

        Ok(())
    }

    fn flush(&self) -> StorageResult<()> {
        Ok(())
    }
}

impl StorageDriver for MemoryStorageDriver {
    type Tree = Box<dyn StorageTree>;

    fn open<P: AsRef<Path>>(_path: P) -> StorageResult<Self> {
        Ok(Self::new())
    }

    fn open_tree(&self, name: &str) -> StorageResult<Self::Tree> {
        let tree = self
            .trees
            .write()
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(MemoryTree {
                    data: RwLock::new(BTreeMap::new()),
                })
            })
            .clone();
        Ok(Box::new(SharedMemoryTree(tree)))
    }

    fn list_trees(&self) -> StorageResult<Vec<String>> {
        Ok(self.trees.read().keys().cloned().collect())
    }

    fn flush(&self) -> StorageResult<()> {
        Ok(())
    }

    fn storage_type(&self) -> StorageType {
        StorageType::Memory
    }

    fn generate_id(&self) -> StorageResult<u64> {
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst))
    }
}

/// Handle onto a tree owned by the driver, so reopening a tree sees the same data
struct SharedMemoryTree(Arc<MemoryTree>);

impl StorageTree for SharedMemoryTree {
    fn insert(&self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        self.0.insert(key, value)
    }

    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        self.0.get(key)
    }

    fn remove(&self, key: &[u8]) -> StorageResult<()> {
        self.0.remove(key)
    }

    fn contains_key(&self, key: &[u8]) -> StorageResult<bool> {
        self.0.contains_key(key)
    }

    fn clear(&self) -> StorageResult<()> {
        self.0.clear()
    }

    fn is_empty(&self) -> StorageResult<bool> {
        self.0.is_empty()
    }

    fn iter(&self) -> StorageResult<KvIter<'_>> {
        self.0.iter()
    }

    fn scan_prefix(&self, prefix: &[u8]) -> StorageResult<KvIter<'_>> {
        self.0.scan_prefix(prefix)
    }

    fn transact(&self, preconditions: &[Precondition], batch: &WriteBatch) -> StorageResult<()> {
        self.0.transact(preconditions, batch)
    }

    fn flush(&self) -> StorageResult<()> {
        self.0.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_prefix_is_ordered() {
        let driver = MemoryStorageDriver::new();
        let tree = driver.open_tree("graph").unwrap();
        tree.insert(b"n/2", b"b").unwrap();
        tree.insert(b"n/1", b"a").unwrap();
        tree.insert(b"o/1", b"x").unwrap();

        let keys: Vec<Vec<u8>> = tree
            .scan_prefix(b"n/")
            .unwrap()
            .map(|r| r.unwrap().0)
            .collect();
        assert_eq!(keys, vec![b"n/1".to_vec(), b"n/2".to_vec()]);
    }

    #[test]
    fn test_reopened_tree_shares_data() {
        let driver = MemoryStorageDriver::new();
        driver.open_tree("graph").unwrap().insert(b"k", b"v").unwrap();
        assert!(driver.open_tree("graph").unwrap().contains_key(b"k").unwrap());
    }

    #[test]
    fn test_failed_precondition_writes_nothing() {
        let driver = MemoryStorageDriver::new();
        let tree = driver.open_tree("graph").unwrap();
        let mut batch = WriteBatch::new();
        batch.put(b"a".to_vec(), b"1".to_vec());
        let result = tree.transact(&[Precondition::Present(b"missing".to_vec())], &batch);
        assert!(result.is_err());
        assert!(tree.is_empty().unwrap());
    }
}
