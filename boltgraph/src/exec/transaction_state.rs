// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Session-scoped transaction state management
//!
//! Tracks the explicit transaction a client opened, if any, and decides
//! whether each statement joins it or runs in its own implicit transaction.
//! A statement that fails inside an explicit transaction marks it
//! rollback-only; the following COMMIT rolls back and reports that failure.

use super::error::{ExecutionError, ExecutionResult};
use super::executor::StatementExecutor;
use super::result::QueryResult;
use crate::cypher::{parse_statement, Statement};
use crate::error::Neo4jStatus;
use crate::storage::PropertyMap;
use crate::txn::{CommitSummary, TransactionHandle, TransactionMetadata};
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::sync::Arc;

struct OpenTransaction {
    handle: TransactionHandle,
    /// Status code and message of the statement that poisoned the transaction
    failure: Option<(&'static str, String)>,
}

/// Session-scoped transaction state
pub struct SessionTransactionState {
    executor: Arc<StatementExecutor>,
    /// Explicit transaction opened by BEGIN, if any
    current: Mutex<Option<OpenTransaction>>,
    /// Implicit transaction of the statement currently running
    running: Mutex<Running>,
}

/// Guarded together so an interrupt cannot slip in before a statement
/// registers its transaction
#[derive(Default)]
struct Running {
    handle: Option<TransactionHandle>,
    interrupted: bool,
}

impl SessionTransactionState {
    pub fn new(executor: Arc<StatementExecutor>) -> Self {
        Self {
            executor,
            current: Mutex::new(None),
            running: Mutex::new(Running::default()),
        }
    }

    pub fn executor(&self) -> &Arc<StatementExecutor> {
        &self.executor
    }

    pub fn has_active_transaction(&self) -> bool {
        self.current.lock().is_some()
    }

    pub fn current_transaction(&self) -> Option<TransactionHandle> {
        self.current.lock().as_ref().map(|t| t.handle.clone())
    }

    pub fn is_rollback_only(&self) -> bool {
        self.current
            .lock()
            .as_ref()
            .map_or(false, |t| t.failure.is_some())
    }

    /// Begin a new explicit transaction
    pub fn begin_transaction(&self, metadata: TransactionMetadata) -> ExecutionResult<TransactionHandle> {
        let mut current = self.current.lock();
        if current.is_some() {
            return Err(ExecutionError::TransactionState(
                "transaction already active".to_string(),
            ));
        }
        let handle = self.executor.manager().begin(metadata);
        info!("Session began transaction: {}", handle.id());
        *current = Some(OpenTransaction {
            handle: handle.clone(),
            failure: None,
        });
        Ok(handle)
    }

    /// Commit the current transaction, or roll it back when an earlier
    /// statement failed
    pub fn commit_transaction(&self) -> ExecutionResult<CommitSummary> {
        let open = self
            .current
            .lock()
            .take()
            .ok_or_else(|| ExecutionError::TransactionState("no active transaction".to_string()))?;
        let manager = self.executor.manager();
        let id = open.handle.id();

        if let Some((code, message)) = open.failure {
            if let Err(e) = manager.rollback(id) {
                debug!("Rollback of failed {} skipped: {}", id, e);
            }
            warn!("Session transaction {} was rollback-only: {}", id, message);
            return Err(ExecutionError::RolledBack { code, message });
        }

        let summary = manager.commit(id)?;
        info!("Session committed transaction: {}", id);
        Ok(summary)
    }

    /// Roll back the current transaction
    pub fn rollback_transaction(&self) -> ExecutionResult<()> {
        let open = self
            .current
            .lock()
            .take()
            .ok_or_else(|| ExecutionError::TransactionState("no active transaction".to_string()))?;
        let id = open.handle.id();
        self.executor.manager().rollback(id)?;
        info!("Session rolled back transaction: {}", id);
        Ok(())
    }

    /// Parse and run a statement, honouring BEGIN / COMMIT / ROLLBACK
    pub fn execute(&self, query: &str, params: &PropertyMap) -> ExecutionResult<QueryResult> {
        let statement = parse_statement(query)?;
        self.execute_statement(&statement, params, TransactionMetadata::new())
    }

    pub fn execute_statement(
        &self,
        statement: &Statement,
        params: &PropertyMap,
        metadata: TransactionMetadata,
    ) -> ExecutionResult<QueryResult> {
        match statement {
            Statement::Begin => {
                self.begin_transaction(metadata)?;
                Ok(QueryResult::status("Transaction started"))
            }
            Statement::Commit => {
                let summary = self.commit_transaction()?;
                let mut result = QueryResult::status("Transaction committed");
                result.bookmark = Some(summary.bookmark);
                Ok(result)
            }
            Statement::Rollback => {
                self.rollback_transaction()?;
                Ok(QueryResult::status("Transaction rolled back"))
            }
            _ if self.has_active_transaction() => self.execute_in_transaction(statement, params),
            _ => self.run_auto_commit(statement, params, metadata),
        }
    }

    /// Run a statement in its own implicit transaction, ignoring any open one
    pub fn execute_with_auto_commit(&self, query: &str, params: &PropertyMap) -> ExecutionResult<QueryResult> {
        let statement = parse_statement(query)?;
        self.run_auto_commit(&statement, params, TransactionMetadata::new())
    }

    pub fn run_auto_commit(
        &self,
        statement: &Statement,
        params: &PropertyMap,
        metadata: TransactionMetadata,
    ) -> ExecutionResult<QueryResult> {
        let result = self
            .executor
            .execute_implicit(statement, params, metadata, |handle| {
                let mut running = self.running.lock();
                if running.interrupted {
                    handle.cancel();
                }
                running.handle = Some(handle.clone());
            });
        self.running.lock().handle.take();
        result
    }

    /// Run a statement inside the open transaction
    pub fn execute_in_transaction(
        &self,
        statement: &Statement,
        params: &PropertyMap,
    ) -> ExecutionResult<QueryResult> {
        let handle = {
            let current = self.current.lock();
            let open = current
                .as_ref()
                .ok_or_else(|| ExecutionError::TransactionState("no active transaction".to_string()))?;
            if let Some((code, message)) = &open.failure {
                return Err(ExecutionError::RolledBack {
                    code,
                    message: message.clone(),
                });
            }
            open.handle.clone()
        };

        let result = self.executor.execute_in(statement, params, &handle);
        if let Err(e) = &result {
            if let Some(open) = self.current.lock().as_mut() {
                if open.handle.id() == handle.id() && open.failure.is_none() {
                    debug!("{} marked rollback-only: {}", handle.id(), e);
                    open.failure = Some((e.status_code(), e.to_string()));
                }
            }
        }
        result
    }

    /// Cancel whatever this session is running; used for timeouts. A
    /// statement that has not started yet is cancelled as soon as it begins,
    /// until the next [`Self::reset`].
    pub fn interrupt(&self) {
        let mut running = self.running.lock();
        running.interrupted = true;
        if let Some(handle) = running.handle.as_ref() {
            handle.cancel();
        }
        if let Some(open) = self.current.lock().as_ref() {
            open.handle.cancel();
        }
    }

    /// Roll back any open transaction and forget it
    pub fn reset(&self) {
        {
            let mut running = self.running.lock();
            running.interrupted = false;
            if let Some(handle) = running.handle.as_ref() {
                handle.cancel();
            }
        }
        if let Some(open) = self.current.lock().take() {
            let id = open.handle.id();
            open.handle.cancel();
            match self.executor.manager().rollback(id) {
                Ok(()) => info!("Session reset rolled back transaction: {}", id),
                Err(e) => debug!("Session reset found {} already closed: {}", id, e),
            }
        }
    }
}

impl Drop for SessionTransactionState {
    fn drop(&mut self) {
        self.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::ConstraintRegistry;
    use crate::storage::{GraphStore, Value};
    use crate::txn::TransactionManager;

    fn state() -> SessionTransactionState {
        let store = Arc::new(GraphStore::memory().unwrap());
        let registry = Arc::new(ConstraintRegistry::new());
        let manager = Arc::new(TransactionManager::new(store.clone(), registry.clone()));
        SessionTransactionState::new(Arc::new(StatementExecutor::new(store, registry, manager)))
    }

    fn count(state: &SessionTransactionState, label: &str) -> Value {
        state
            .execute_with_auto_commit(
                &format!("MATCH (n:{}) RETURN count(n) AS c", label),
                &PropertyMap::new(),
            )
            .unwrap()
            .rows[0][0]
            .clone()
    }

    #[test]
    fn test_begin_twice_and_commit_without_begin() {
        let state = state();
        state.begin_transaction(TransactionMetadata::new()).unwrap();
        let err = state.begin_transaction(TransactionMetadata::new()).unwrap_err();
        assert_eq!(err.to_string(), "transaction already active");
        state.rollback_transaction().unwrap();

        let err = state.commit_transaction().unwrap_err();
        assert_eq!(err.to_string(), "no active transaction");
        let err = state.rollback_transaction().unwrap_err();
        assert_eq!(err.to_string(), "no active transaction");
    }

    #[test]
    fn test_statement_level_control() {
        let state = state();
        let params = PropertyMap::new();
        let begun = state.execute("BEGIN", &params).unwrap();
        assert_eq!(begun.get(0, "status"), Some(&Value::from("Transaction started")));
        state.execute("CREATE (:Person {name: 'Ann'})", &params).unwrap();
        assert_eq!(count(&state, "Person"), Value::Integer(0));

        let committed = state.execute("COMMIT", &params).unwrap();
        assert_eq!(
            committed.get(0, "status"),
            Some(&Value::from("Transaction committed"))
        );
        assert!(committed.bookmark.is_some());
        assert_eq!(count(&state, "Person"), Value::Integer(1));

        state.execute("BEGIN", &params).unwrap();
        state.execute("CREATE (:Person {name: 'Bob'})", &params).unwrap();
        let rolled = state.execute("ROLLBACK", &params).unwrap();
        assert_eq!(
            rolled.get(0, "status"),
            Some(&Value::from("Transaction rolled back"))
        );
        assert_eq!(count(&state, "Person"), Value::Integer(1));
    }

    #[test]
    fn test_failed_statement_makes_transaction_rollback_only() {
        let state = state();
        let params = PropertyMap::new();
        state.begin_transaction(TransactionMetadata::new()).unwrap();
        state.execute("CREATE (:Item {n: 1})", &params).unwrap();
        assert!(state.execute("RETURN 1 / 0", &params).is_err());
        assert!(state.is_rollback_only());

        let err = state.execute("CREATE (:Item {n: 2})", &params).unwrap_err();
        assert!(matches!(err, ExecutionError::RolledBack { .. }));

        let err = state.commit_transaction().unwrap_err();
        assert!(matches!(err, ExecutionError::RolledBack { .. }));
        assert!(!state.has_active_transaction());
        assert_eq!(count(&state, "Item"), Value::Integer(0));
    }

    #[test]
    fn test_reset_discards_open_transaction() {
        let state = state();
        let params = PropertyMap::new();
        let handle = state.begin_transaction(TransactionMetadata::new()).unwrap();
        state.execute("CREATE (:Temp)", &params).unwrap();
        state.reset();
        assert!(!state.has_active_transaction());
        assert!(!handle.is_active());
        assert_eq!(count(&state, "Temp"), Value::Integer(0));
    }

    #[test]
    fn test_interrupt_terminates_open_transaction() {
        let state = state();
        let params = PropertyMap::new();
        state.begin_transaction(TransactionMetadata::new()).unwrap();
        state.interrupt();
        let err = state.execute("CREATE (:Late)", &params).unwrap_err();
        assert!(matches!(
            err,
            ExecutionError::Transaction(crate::txn::TransactionError::Terminated(_))
        ));
        state.reset();
        assert_eq!(count(&state, "Late"), Value::Integer(0));
    }

    #[test]
    fn test_interrupt_before_auto_commit_starts() {
        let state = state();
        let params = PropertyMap::new();
        state.interrupt();
        let err = state.execute("CREATE (:Late)", &params).unwrap_err();
        assert!(matches!(
            err,
            ExecutionError::Transaction(crate::txn::TransactionError::Terminated(_))
        ));
        state.reset();
        state.execute("CREATE (:OnTime)", &params).unwrap();
        assert_eq!(count(&state, "Late"), Value::Integer(0));
        assert_eq!(count(&state, "OnTime"), Value::Integer(1));
    }
}
