// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Transaction manager implementation
//!
//! Allocates transactions, tracks the ones that are still open, and keeps
//! lifetime counters for monitoring.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::{debug, info};
use parking_lot::RwLock;

use super::error::{TransactionError, TransactionResult};
use super::metadata::TransactionMetadata;
use super::state::{TransactionId, TransactionIdGenerator, TransactionStatus};
use super::transaction::{CommitSummary, Transaction};
use crate::constraints::ConstraintRegistry;
use crate::storage::GraphStore;

/// Shared handle to an open transaction
pub type TransactionHandle = Arc<Transaction>;

/// Transaction manager handles the lifecycle of all transactions
pub struct TransactionManager {
    store: Arc<GraphStore>,
    registry: Arc<ConstraintRegistry>,
    /// Map of registered transactions by ID
    active_transactions: RwLock<HashMap<TransactionId, TransactionHandle>>,
    ids: TransactionIdGenerator,
    started: AtomicU64,
    committed: AtomicU64,
    rolled_back: AtomicU64,
    conflicts: AtomicU64,
}

impl TransactionManager {
    pub fn new(store: Arc<GraphStore>, registry: Arc<ConstraintRegistry>) -> Self {
        Self {
            store,
            registry,
            active_transactions: RwLock::new(HashMap::new()),
            ids: TransactionIdGenerator::new(),
            started: AtomicU64::new(0),
            committed: AtomicU64::new(0),
            rolled_back: AtomicU64::new(0),
            conflicts: AtomicU64::new(0),
        }
    }

    /// Start a new transaction
    pub fn begin(&self, metadata: TransactionMetadata) -> TransactionHandle {
        let id = self.ids.next_id();
        let txn = Arc::new(Transaction::new(
            id,
            self.store.clone(),
            self.registry.clone(),
            metadata,
        ));
        self.active_transactions.write().insert(id, txn.clone());
        self.started.fetch_add(1, Ordering::Relaxed);
        debug!("Began {}", id);
        txn
    }

    pub fn get(&self, id: TransactionId) -> Option<TransactionHandle> {
        self.active_transactions.read().get(&id).cloned()
    }

    fn take(&self, id: TransactionId) -> TransactionResult<TransactionHandle> {
        self.active_transactions
            .write()
            .remove(&id)
            .ok_or_else(|| TransactionError::NotFound(id.to_string()))
    }

    /// Commit a registered transaction and forget it
    pub fn commit(&self, id: TransactionId) -> TransactionResult<CommitSummary> {
        let txn = self.take(id)?;
        let result = txn.commit();
        match &result {
            Ok(_) => {
                self.committed.fetch_add(1, Ordering::Relaxed);
            }
            Err(TransactionError::Closed(_)) => {}
            Err(e) => {
                if matches!(e, TransactionError::Conflict(_)) {
                    self.conflicts.fetch_add(1, Ordering::Relaxed);
                }
                self.rolled_back.fetch_add(1, Ordering::Relaxed);
            }
        }
        result
    }

    /// Roll back a registered transaction and forget it
    pub fn rollback(&self, id: TransactionId) -> TransactionResult<()> {
        let txn = self.take(id)?;
        txn.rollback()?;
        self.rolled_back.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Get all active transaction IDs
    pub fn active_transaction_ids(&self) -> Vec<TransactionId> {
        let mut ids: Vec<_> = self
            .active_transactions
            .read()
            .values()
            .filter(|t| t.is_active())
            .map(|t| t.id())
            .collect();
        ids.sort();
        ids
    }

    /// Forget transactions that terminated without going through the manager
    pub fn cleanup_completed(&self) -> usize {
        let mut active_txns = self.active_transactions.write();
        let before = active_txns.len();
        active_txns.retain(|_, txn| !txn.status().is_terminated());
        let removed = before - active_txns.len();
        if removed > 0 {
            info!("Cleaned up {} completed transactions", removed);
        }
        removed
    }

    /// Cancel every open transaction; used at shutdown
    pub fn cancel_all(&self) {
        for txn in self.active_transactions.read().values() {
            txn.cancel();
        }
    }

    pub fn statistics(&self) -> TransactionStatistics {
        let active = self
            .active_transactions
            .read()
            .values()
            .filter(|t| t.status() == TransactionStatus::Active)
            .count() as u64;
        TransactionStatistics {
            total_transactions: self.started.load(Ordering::Relaxed),
            active_transactions: active,
            committed_transactions: self.committed.load(Ordering::Relaxed),
            rolled_back_transactions: self.rolled_back.load(Ordering::Relaxed),
            conflicted_transactions: self.conflicts.load(Ordering::Relaxed),
        }
    }
}

/// Transaction statistics for monitoring
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionStatistics {
    pub total_transactions: u64,
    pub active_transactions: u64,
    pub committed_transactions: u64,
    pub rolled_back_transactions: u64,
    pub conflicted_transactions: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::PropertyMap;

    fn manager() -> TransactionManager {
        TransactionManager::new(
            Arc::new(GraphStore::memory().unwrap()),
            Arc::new(ConstraintRegistry::new()),
        )
    }

    #[test]
    fn test_lifecycle_and_statistics() {
        let mgr = manager();
        let t1 = mgr.begin(TransactionMetadata::new());
        let t2 = mgr.begin(TransactionMetadata::new());
        assert_ne!(t1.id(), t2.id());
        assert_eq!(mgr.active_transaction_ids(), vec![t1.id(), t2.id()]);

        t1.create_node(vec!["A".into()], PropertyMap::new()).unwrap();
        mgr.commit(t1.id()).unwrap();
        mgr.rollback(t2.id()).unwrap();

        assert!(matches!(
            mgr.rollback(t2.id()),
            Err(TransactionError::NotFound(_))
        ));
        let stats = mgr.statistics();
        assert_eq!(stats.total_transactions, 2);
        assert_eq!(stats.committed_transactions, 1);
        assert_eq!(stats.rolled_back_transactions, 1);
        assert_eq!(stats.active_transactions, 0);
    }

    #[test]
    fn test_cleanup_removes_terminated() {
        let mgr = manager();
        let t = mgr.begin(TransactionMetadata::new());
        t.rollback().unwrap();
        assert!(mgr.get(t.id()).is_some());
        assert_eq!(mgr.cleanup_completed(), 1);
        assert!(mgr.get(t.id()).is_none());
    }
}
