// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Transaction state management
//!
//! This module defines the transaction identity, lifecycle states and the
//! per-transaction operation log.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

/// Unique identifier for a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransactionId(u64);

impl TransactionId {
    /// Get the underlying ID value
    pub fn id(&self) -> u64 {
        self.0
    }

    pub fn from_u64(id: u64) -> Self {
        TransactionId(id)
    }

    /// Parse the `txn_<n>` rendering or a bare number
    pub fn parse(text: &str) -> Option<Self> {
        text.strip_prefix("txn_")
            .unwrap_or(text)
            .parse()
            .ok()
            .map(TransactionId)
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "txn_{}", self.0)
    }
}

/// Process-local monotonic source of transaction ids
#[derive(Debug)]
pub struct TransactionIdGenerator {
    next: AtomicU64,
}

impl TransactionIdGenerator {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    pub fn next_id(&self) -> TransactionId {
        TransactionId(self.next.fetch_add(1, Ordering::SeqCst))
    }
}

impl Default for TransactionIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Transaction lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
    /// Transaction is active and can perform operations
    Active,
    /// Commit is validating and applying the buffer
    Committing,
    /// Transaction has been committed successfully
    Committed,
    /// Transaction has been rolled back
    RolledBack,
}

impl TransactionStatus {
    pub fn is_terminated(&self) -> bool {
        matches!(self, TransactionStatus::Committed | TransactionStatus::RolledBack)
    }
}

/// Record of an operation performed within a transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionOperation {
    /// Type of operation
    pub operation_type: OperationType,
    /// Timestamp when operation was performed
    pub timestamp: SystemTime,
    /// Description of the operation
    pub description: String,
    /// Sequence number of this operation within the transaction
    pub sequence_number: u64,
}

/// Types of buffered operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationType {
    CreateNode,
    UpdateNode,
    SetLabels,
    DeleteNode,
    CreateRelationship,
    UpdateRelationship,
    DeleteRelationship,
}

/// Ordered log of the operations buffered by one transaction
#[derive(Debug, Clone, Default)]
pub struct OperationLog {
    operations: Vec<TransactionOperation>,
    sequence_number: u64,
}

impl OperationLog {
    /// Add an operation to this transaction
    pub fn record(&mut self, operation_type: OperationType, description: String) {
        self.sequence_number += 1;
        self.operations.push(TransactionOperation {
            operation_type,
            timestamp: SystemTime::now(),
            description,
            sequence_number: self.sequence_number,
        });
    }

    pub fn operations(&self) -> &[TransactionOperation] {
        &self.operations
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn clear(&mut self) {
        self.operations.clear();
    }
}
