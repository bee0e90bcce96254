// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Transaction management
//!
//! Transactions buffer every mutation locally, offer read-your-writes over
//! the buffer, and apply all changes in one atomic batch at commit.
//!
//! # Features
//! - Transaction lifecycle (begin, commit, rollback) with terminal states
//! - Temporary identities resolved to permanent ids only at commit
//! - Optimistic conflict detection through batch preconditions
//! - Cooperative cancellation for resets and timeouts
//! - Client metadata attached to lifecycle logs

mod buffer;
pub mod cancel;
pub mod error;
pub mod manager;
pub mod metadata;
pub mod state;
pub mod transaction;

pub use cancel::CancellationToken;
pub use error::{TransactionError, TransactionResult};
pub use manager::{TransactionHandle, TransactionManager, TransactionStatistics};
pub use metadata::{TransactionMetadata, MAX_METADATA_SIZE};
pub use state::{TransactionId, TransactionStatus};
pub use transaction::{CommitSummary, IdMap, Transaction};
