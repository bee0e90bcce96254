// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Execution error types

use crate::constraints::{ConstraintError, ConstraintViolation};
use crate::cypher::ParseError;
use crate::storage::StorageError;
use crate::txn::TransactionError;
use thiserror::Error;

/// Execution errors
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error(transparent)]
    Syntax(#[from] ParseError),

    #[error(transparent)]
    Transaction(#[from] TransactionError),

    #[error(transparent)]
    Schema(#[from] ConstraintError),

    #[error("Type mismatch: {0}")]
    TypeError(String),

    #[error("Expected parameter(s): {0}")]
    MissingParameter(String),

    #[error("Variable `{0}` not defined")]
    UndefinedVariable(String),

    #[error("Unknown function '{0}'")]
    UnknownFunction(String),

    #[error("There is no procedure with the name `{0}` registered for this database instance")]
    UnknownProcedure(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Arithmetic error: {0}")]
    Arithmetic(String),

    /// Session-level misuse such as COMMIT without BEGIN
    #[error("{0}")]
    TransactionState(String),

    /// A statement failed earlier in this explicit transaction
    #[error("Transaction rolled back because an earlier statement failed: {message}")]
    RolledBack { code: &'static str, message: String },
}

impl ExecutionError {
    /// Violation carried by this error, if any
    pub fn violation(&self) -> Option<&ConstraintViolation> {
        match self {
            ExecutionError::Transaction(TransactionError::Constraint(v)) => Some(v),
            ExecutionError::Schema(ConstraintError::CreationFailed { violation, .. }) => {
                Some(violation)
            }
            _ => None,
        }
    }
}

impl From<StorageError> for ExecutionError {
    fn from(error: StorageError) -> Self {
        ExecutionError::Transaction(error.into())
    }
}

impl From<ConstraintViolation> for ExecutionError {
    fn from(violation: ConstraintViolation) -> Self {
        ExecutionError::Transaction(TransactionError::Constraint(violation))
    }
}

pub type ExecutionResult<T> = Result<T, ExecutionError>;
