// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Database handle shared by every connection
//!
//! `GraphDatabase` owns the store, the constraint registry, the transaction
//! manager and the statement executor. Bolt sessions, the HTTP endpoint and
//! the CLI all go through one instance.

use crate::config::DatabaseConfig;
use crate::constraints::{Constraint, ConstraintError, ConstraintRegistry};
use crate::exec::{ExecutionResult, QueryResult, SessionTransactionState, StatementExecutor};
use crate::storage::{GraphStore, PropertyMap, StorageError, StorageType};
use crate::txn::{TransactionHandle, TransactionManager, TransactionMetadata};
use log::{debug, info};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Failed to open storage: {0}")]
    Storage(#[from] StorageError),

    #[error("Failed to load constraints: {0}")]
    Constraints(#[from] ConstraintError),
}

pub struct GraphDatabase {
    name: String,
    store: Arc<GraphStore>,
    registry: Arc<ConstraintRegistry>,
    manager: Arc<TransactionManager>,
    executor: Arc<StatementExecutor>,
}

impl GraphDatabase {
    /// Open the database described by `config`, loading its constraints
    pub fn open(config: &DatabaseConfig) -> Result<Arc<Self>, DatabaseError> {
        let store = match config.storage {
            StorageType::Memory => GraphStore::memory()?,
            storage => GraphStore::open(storage, &config.data_dir, config.sync_commits)?,
        };
        let db = Self::with_store(config.database_name.clone(), store)?;
        info!(
            "Opened database '{}' ({} constraints)",
            db.name,
            db.registry.len()
        );
        Ok(db)
    }

    /// Throwaway in-memory database
    pub fn memory() -> Result<Arc<Self>, DatabaseError> {
        Self::with_store("neo4j".to_string(), GraphStore::memory()?)
    }

    fn with_store(name: String, store: GraphStore) -> Result<Arc<Self>, DatabaseError> {
        let store = Arc::new(store);
        let registry = Arc::new(ConstraintRegistry::load(&store)?);
        let manager = Arc::new(TransactionManager::new(store.clone(), registry.clone()));
        let executor = Arc::new(StatementExecutor::new(
            store.clone(),
            registry.clone(),
            manager.clone(),
        ));
        Ok(Arc::new(Self {
            name,
            store,
            registry,
            manager,
            executor,
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn store(&self) -> &Arc<GraphStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<ConstraintRegistry> {
        &self.registry
    }

    pub fn manager(&self) -> &Arc<TransactionManager> {
        &self.manager
    }

    pub fn executor(&self) -> &Arc<StatementExecutor> {
        &self.executor
    }

    /// Fresh per-client transaction state
    pub fn session(&self) -> SessionTransactionState {
        SessionTransactionState::new(self.executor.clone())
    }

    /// Run one statement in an implicit transaction
    pub fn execute(&self, query: &str, params: &PropertyMap) -> ExecutionResult<QueryResult> {
        self.executor.execute(query, params, None)
    }

    pub fn begin(&self, metadata: TransactionMetadata) -> TransactionHandle {
        self.manager.begin(metadata)
    }

    pub fn constraints(&self) -> Vec<Constraint> {
        self.registry.list()
    }

    pub fn flush(&self) -> Result<(), StorageError> {
        self.store.flush()
    }

    /// Terminate open transactions and flush the store
    pub fn shutdown(&self) -> Result<(), StorageError> {
        let open = self.manager.active_transaction_ids().len();
        self.manager.cancel_all();
        for id in self.manager.active_transaction_ids() {
            if let Err(e) = self.manager.rollback(id) {
                debug!("Shutdown rollback of {} skipped: {}", id, e);
            }
        }
        info!("Shutting down database '{}' ({} open transactions terminated)", self.name, open);
        self.store.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Value;

    #[test]
    fn test_reopen_keeps_data_and_constraints() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = DatabaseConfig {
            data_dir: dir.path().join("graph"),
            ..DatabaseConfig::default()
        };
        {
            let db = GraphDatabase::open(&config).unwrap();
            db.execute(
                "CREATE CONSTRAINT user_email FOR (u:User) REQUIRE u.email IS UNIQUE",
                &PropertyMap::new(),
            )
            .unwrap();
            db.execute("CREATE (:User {email: 'a@x.com'})", &PropertyMap::new())
                .unwrap();
            db.shutdown().unwrap();
        }
        let db = GraphDatabase::open(&config).unwrap();
        assert_eq!(db.constraints().len(), 1);
        let result = db
            .execute("MATCH (u:User) RETURN u.email AS email", &PropertyMap::new())
            .unwrap();
        assert_eq!(result.rows, vec![vec![Value::from("a@x.com")]]);
        assert!(db
            .execute("CREATE (:User {email: 'a@x.com'})", &PropertyMap::new())
            .is_err());
    }

    #[test]
    fn test_shutdown_terminates_open_transactions() {
        let db = GraphDatabase::memory().unwrap();
        let txn = db.begin(TransactionMetadata::new());
        db.shutdown().unwrap();
        assert!(!txn.is_active());
    }
}
