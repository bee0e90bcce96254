// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Statement execution engine
//!
//! This module turns parsed statements into reads and buffered writes on a
//! transaction, and tracks the explicit transaction a session has open.

pub mod aggregate;
pub mod error;
pub mod eval;
pub mod executor;
pub mod matcher;
pub mod procedures;
pub mod result;
pub mod transaction_state;

// Re-export the main types for convenience
pub use error::{ExecutionError, ExecutionResult};
pub use eval::{EvalContext, Row};
pub use executor::StatementExecutor;
pub use matcher::MAX_VARIABLE_LENGTH;
pub use procedures::ProcedureOutput;
pub use result::{QueryResult, QueryStatistics, QueryType};
pub use transaction_state::SessionTransactionState;
