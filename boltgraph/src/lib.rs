// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! BoltGraph - a transactional graph database speaking the Bolt protocol
//!
//! BoltGraph stores a labelled property graph in sled and serves it to
//! unmodified Neo4j drivers over Bolt 4.4 and 5.x, plus the Neo4j HTTP
//! transaction endpoint.
//!
//! # Features
//!
//! - **ACID transactions**: writes are buffered per transaction and applied
//!   in one optimistic commit; concurrent conflicting commits are rejected
//! - **Constraints**: UNIQUE, EXISTS and NODE KEY, checked at commit
//! - **Cypher subset**: MATCH / CREATE / MERGE / SET / DELETE / RETURN and
//!   constraint DDL
//! - **Bolt server**: handshake, PackStream, session state machine
//!
//! # Usage
//!
//! ```bash
//! # Serve Bolt on 7687 and HTTP on 7474
//! boltgraph serve --data-dir ./data
//!
//! # One-off query
//! boltgraph query --data-dir ./data "MATCH (n:Person) RETURN n.name"
//! ```
//!
//! Embedded use goes through [`GraphDatabase`]:
//!
//! ```ignore
//! let db = GraphDatabase::memory()?;
//! db.execute("CREATE (:Person {name: 'Ann'})", &PropertyMap::new())?;
//! ```

pub mod bolt;
pub mod config;
pub mod constraints;
pub mod cypher;
pub mod database;
pub mod error;
pub mod exec;
pub mod http;
pub mod storage;
pub mod txn;

pub use config::{Config, ConfigError};
pub use database::{DatabaseError, GraphDatabase};
pub use error::{Failure, Neo4jStatus};
pub use exec::{ExecutionError, QueryResult, QueryType, SessionTransactionState};
pub use storage::{PropertyMap, StorageType, Value};
pub use txn::{TransactionHandle, TransactionMetadata};

/// BoltGraph version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// BoltGraph crate name
pub const CRATE_NAME: &str = env!("CARGO_PKG_NAME");

/// Neo4j server version reported to drivers
pub const NEO4J_VERSION: &str = "5.13.0";
