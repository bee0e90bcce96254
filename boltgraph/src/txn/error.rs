// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Transaction error types

use super::state::TransactionId;
use crate::constraints::{ConstraintViolation, ValidationError};
use crate::storage::StorageError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransactionError {
    #[error("Transaction {0} has already been terminated")]
    Closed(TransactionId),

    #[error("Transaction {0} not found")]
    NotFound(String),

    #[error("Transaction {0} has been terminated by a reset or timeout")]
    Terminated(TransactionId),

    #[error("Transaction metadata is {size} characters, the limit is {limit}")]
    MetadataTooLarge { size: usize, limit: usize },

    #[error("Transaction conflicted with a concurrent commit on {0}")]
    Conflict(String),

    #[error(transparent)]
    Constraint(#[from] ConstraintViolation),

    #[error(transparent)]
    Storage(StorageError),
}

impl From<StorageError> for TransactionError {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::Conflict(key) => TransactionError::Conflict(key),
            other => TransactionError::Storage(other),
        }
    }
}

impl From<ValidationError> for TransactionError {
    fn from(error: ValidationError) -> Self {
        match error {
            ValidationError::Violation(v) => TransactionError::Constraint(v),
            ValidationError::Storage(e) => e.into(),
        }
    }
}

pub type TransactionResult<T> = Result<T, TransactionError>;
