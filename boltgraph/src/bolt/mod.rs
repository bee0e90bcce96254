// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Bolt protocol server
//!
//! Wire layers from the bottom up: [`packstream`] values, [`chunk`]
//! framing, [`message`] structures. [`session`] drives one connection
//! through the [`state`] table and [`server`] owns the listener.

pub mod auth;
pub mod chunk;
pub mod error;
pub mod handshake;
pub mod message;
pub mod packstream;
pub mod server;
pub mod session;
pub mod state;

pub use auth::{AllowAll, AuthError, AuthToken, Authenticator, Principal, StaticAuthenticator};
pub use error::BoltError;
pub use handshake::{BoltVersion, SUPPORTED_VERSIONS};
pub use message::{Request, Response};
pub use server::BoltServer;
pub use session::{BoltSession, Reply, SessionOptions};
pub use state::SessionState;
