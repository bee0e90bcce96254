// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Neo4j status codes
//!
//! Every error a client can see is mapped to one of the status codes Neo4j
//! drivers understand. Bolt sends them in FAILURE metadata and the HTTP
//! endpoint in its `errors` array. Drivers decide whether to retry from the
//! classification, so conflicts must stay transient.

use crate::constraints::{ConstraintError, ConstraintViolation};
use crate::cypher::ParseError;
use crate::exec::ExecutionError;
use crate::storage::StorageError;
use crate::txn::TransactionError;
use serde::Serialize;
use std::fmt;

pub mod codes {
    pub const REQUEST_INVALID: &str = "Neo.ClientError.Request.Invalid";
    pub const REQUEST_INVALID_FORMAT: &str = "Neo.ClientError.Request.InvalidFormat";
    pub const UNAUTHORIZED: &str = "Neo.ClientError.Security.Unauthorized";
    pub const CONSTRAINT_VALIDATION_FAILED: &str =
        "Neo.ClientError.Schema.ConstraintValidationFailed";
    pub const CONSTRAINT_ALREADY_EXISTS: &str = "Neo.ClientError.Schema.ConstraintAlreadyExists";
    pub const EQUIVALENT_SCHEMA_RULE: &str =
        "Neo.ClientError.Schema.EquivalentSchemaRuleAlreadyExists";
    pub const CONSTRAINT_DROP_FAILED: &str = "Neo.ClientError.Schema.ConstraintDropFailed";
    pub const CONSTRAINT_DEFINITION_INVALID: &str =
        "Neo.ClientError.Schema.ConstraintCreationFailed";
    pub const CONSTRAINT_CREATION_FAILED: &str = "Neo.DatabaseError.Schema.ConstraintCreationFailed";
    pub const ENTITY_NOT_FOUND: &str = "Neo.ClientError.Statement.EntityNotFound";
    pub const UNKNOWN_ERROR: &str = "Neo.DatabaseError.General.UnknownError";
    pub const OUTDATED: &str = "Neo.TransientError.Transaction.Outdated";
    pub const TRANSACTION_NOT_FOUND: &str = "Neo.ClientError.Transaction.TransactionNotFound";
    pub const TERMINATED: &str = "Neo.ClientError.Transaction.Terminated";
    pub const TRANSACTION_TIMED_OUT: &str = "Neo.ClientError.Transaction.TransactionTimedOut";
    pub const FORBIDDEN_DUE_TO_TRANSACTION_TYPE: &str =
        "Neo.ClientError.Transaction.ForbiddenDueToTransactionType";
    pub const SYNTAX_ERROR: &str = "Neo.ClientError.Statement.SyntaxError";
    pub const SEMANTIC_ERROR: &str = "Neo.ClientError.Statement.SemanticError";
    pub const ARGUMENT_ERROR: &str = "Neo.ClientError.Statement.ArgumentError";
    pub const TYPE_ERROR: &str = "Neo.ClientError.Statement.TypeError";
    pub const PARAMETER_MISSING: &str = "Neo.ClientError.Statement.ParameterMissing";
    pub const ARITHMETIC_ERROR: &str = "Neo.ClientError.Statement.ArithmeticError";
    pub const PROCEDURE_NOT_FOUND: &str = "Neo.ClientError.Procedure.ProcedureNotFound";
    pub const DATABASE_NOT_FOUND: &str = "Neo.ClientError.Database.DatabaseNotFound";
}

/// The three Neo4j error classes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    ClientError,
    TransientError,
    DatabaseError,
}

impl Classification {
    pub fn of(code: &str) -> Self {
        match code.split('.').nth(1) {
            Some("TransientError") => Classification::TransientError,
            Some("DatabaseError") => Classification::DatabaseError,
            _ => Classification::ClientError,
        }
    }
}

/// Code and message pair sent to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub code: String,
    pub message: String,
}

impl Failure {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Maps an error onto its Neo4j status code
pub trait Neo4jStatus: fmt::Display {
    fn status_code(&self) -> &'static str;

    fn classification(&self) -> Classification {
        Classification::of(self.status_code())
    }

    fn failure(&self) -> Failure {
        Failure::new(self.status_code(), self.to_string())
    }
}

impl Neo4jStatus for StorageError {
    fn status_code(&self) -> &'static str {
        match self {
            StorageError::NodeNotFound(_) | StorageError::EdgeNotFound(_) => {
                codes::ENTITY_NOT_FOUND
            }
            StorageError::NodeHasRelationships(_) => codes::CONSTRAINT_VALIDATION_FAILED,
            StorageError::InvalidProperty { .. } => codes::TYPE_ERROR,
            StorageError::Conflict(_) => codes::OUTDATED,
            StorageError::Fault(_) => codes::UNKNOWN_ERROR,
        }
    }
}

impl Neo4jStatus for ConstraintViolation {
    fn status_code(&self) -> &'static str {
        codes::CONSTRAINT_VALIDATION_FAILED
    }
}

impl Neo4jStatus for ConstraintError {
    fn status_code(&self) -> &'static str {
        match self {
            ConstraintError::AlreadyExists(_) => codes::CONSTRAINT_ALREADY_EXISTS,
            ConstraintError::Equivalent { .. } => codes::EQUIVALENT_SCHEMA_RULE,
            ConstraintError::NotFound(_) => codes::CONSTRAINT_DROP_FAILED,
            ConstraintError::InvalidDefinition(_) => codes::CONSTRAINT_DEFINITION_INVALID,
            ConstraintError::CreationFailed { .. } => codes::CONSTRAINT_CREATION_FAILED,
            ConstraintError::Conflict(_) => codes::OUTDATED,
            ConstraintError::Storage(e) => e.status_code(),
        }
    }
}

impl Neo4jStatus for TransactionError {
    fn status_code(&self) -> &'static str {
        match self {
            TransactionError::Closed(_) | TransactionError::NotFound(_) => {
                codes::TRANSACTION_NOT_FOUND
            }
            TransactionError::Terminated(_) => codes::TERMINATED,
            TransactionError::MetadataTooLarge { .. } => codes::REQUEST_INVALID,
            TransactionError::Conflict(_) => codes::OUTDATED,
            TransactionError::Constraint(v) => v.status_code(),
            TransactionError::Storage(e) => e.status_code(),
        }
    }
}

impl Neo4jStatus for ParseError {
    fn status_code(&self) -> &'static str {
        codes::SYNTAX_ERROR
    }
}

impl Neo4jStatus for ExecutionError {
    fn status_code(&self) -> &'static str {
        match self {
            ExecutionError::Syntax(e) => e.status_code(),
            ExecutionError::Transaction(e) => e.status_code(),
            ExecutionError::Schema(e) => e.status_code(),
            ExecutionError::TypeError(_) => codes::TYPE_ERROR,
            ExecutionError::MissingParameter(_) => codes::PARAMETER_MISSING,
            ExecutionError::UndefinedVariable(_) | ExecutionError::UnknownFunction(_) => {
                codes::SYNTAX_ERROR
            }
            ExecutionError::UnknownProcedure(_) => codes::PROCEDURE_NOT_FOUND,
            ExecutionError::InvalidArgument(_) => codes::ARGUMENT_ERROR,
            ExecutionError::InvalidQuery(message) => {
                if message.starts_with("Tried to execute Schema modification") {
                    codes::FORBIDDEN_DUE_TO_TRANSACTION_TYPE
                } else {
                    codes::SEMANTIC_ERROR
                }
            }
            ExecutionError::Arithmetic(_) => codes::ARITHMETIC_ERROR,
            ExecutionError::TransactionState(_) => codes::TRANSACTION_NOT_FOUND,
            ExecutionError::RolledBack { code, .. } => code,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::txn::TransactionId;

    #[test]
    fn test_classification() {
        assert_eq!(Classification::of(codes::OUTDATED), Classification::TransientError);
        assert_eq!(Classification::of(codes::UNKNOWN_ERROR), Classification::DatabaseError);
        assert_eq!(Classification::of(codes::SYNTAX_ERROR), Classification::ClientError);
    }

    #[test]
    fn test_conflicts_are_transient() {
        let err = TransactionError::from(StorageError::Conflict("n:1".to_string()));
        assert_eq!(err.status_code(), codes::OUTDATED);
        assert_eq!(err.classification(), Classification::TransientError);
    }

    #[test]
    fn test_execution_errors_delegate() {
        let err = ExecutionError::from(TransactionError::Terminated(TransactionId::from_u64(7)));
        assert_eq!(err.status_code(), codes::TERMINATED);

        let err = ExecutionError::from(StorageError::NodeHasRelationships("3".to_string()));
        assert_eq!(err.status_code(), codes::CONSTRAINT_VALIDATION_FAILED);

        let err = ExecutionError::from(ParseError::UnexpectedEnd);
        let failure = err.failure();
        assert_eq!(failure.code, codes::SYNTAX_ERROR);
        assert_eq!(failure.message, "Unexpected end of input");
    }

    #[test]
    fn test_rolled_back_keeps_original_code() {
        let err = ExecutionError::RolledBack {
            code: codes::ARITHMETIC_ERROR,
            message: "/ by zero".to_string(),
        };
        assert_eq!(err.status_code(), codes::ARITHMETIC_ERROR);
    }
}
