// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! CLI module for BoltGraph
//!
//! Runs the server, a Cypher console (REPL) and one-off statements against
//! a local database directory.

pub mod commands;
pub mod handlers;
pub mod output;

pub use commands::{Cli, Commands};
pub use handlers::{handle_constraints, handle_query, handle_serve, handle_shell, load_config};
