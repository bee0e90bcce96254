// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Bolt connection errors

use super::auth::AuthError;
use super::packstream::PackStreamError;
use crate::error::{codes, Neo4jStatus};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BoltError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed message: {0}")]
    PackStream(#[from] PackStreamError),

    #[error("Protocol violation: {0}")]
    Protocol(String),

    #[error("Invalid handshake preamble")]
    BadMagic,

    #[error("No mutually supported protocol version")]
    UnsupportedVersion,

    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl BoltError {
    /// Errors after which the connection cannot continue
    pub fn is_fatal(&self) -> bool {
        !matches!(self, BoltError::Auth(_))
    }
}

impl Neo4jStatus for BoltError {
    fn status_code(&self) -> &'static str {
        match self {
            BoltError::Auth(_) => codes::UNAUTHORIZED,
            _ => codes::REQUEST_INVALID,
        }
    }
}
