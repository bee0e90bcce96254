// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! HTTP endpoint errors

use super::types::TransactionResponse;
use crate::error::{codes, Neo4jStatus};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Request-level failures. Statement failures are not errors at this
/// level; they are reported in the `errors` array of a 200 response.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("Unable to deserialize request: {0}")]
    InvalidFormat(String),

    #[error("Unrecognized transaction id. Transaction may have timed out and been rolled back. ({0})")]
    TransactionNotFound(String),

    #[error("Database does not exist. Database name: '{0}'.")]
    DatabaseNotFound(String),

    #[error("internal task failure: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl HttpError {
    fn status(&self) -> StatusCode {
        match self {
            HttpError::InvalidFormat(_) => StatusCode::BAD_REQUEST,
            HttpError::TransactionNotFound(_) | HttpError::DatabaseNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            HttpError::Join(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl Neo4jStatus for HttpError {
    fn status_code(&self) -> &'static str {
        match self {
            HttpError::InvalidFormat(_) => codes::REQUEST_INVALID_FORMAT,
            HttpError::TransactionNotFound(_) => codes::TRANSACTION_NOT_FOUND,
            HttpError::DatabaseNotFound(_) => codes::DATABASE_NOT_FOUND,
            HttpError::Join(_) => codes::UNKNOWN_ERROR,
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let body = TransactionResponse {
            errors: vec![self.failure()],
            ..Default::default()
        };
        (self.status(), Json(body)).into_response()
    }
}
