// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Route handlers for the transaction endpoint

use super::error::HttpError;
use super::transactions::format_expiry;
use super::types::{StatementRequest, StatementResult, TransactionInfo, TransactionRequest, TransactionResponse};
use super::AppState;
use crate::database::GraphDatabase;
use crate::error::{Failure, Neo4jStatus};
use crate::exec::QueryResult;
use crate::txn::{TransactionHandle, TransactionId, TransactionMetadata};
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use log::{debug, warn};
use tokio::task;

type Outcome = (Vec<(QueryResult, bool)>, Option<Failure>);

/// `POST /db/{db}/tx/commit`
pub async fn commit_implicit(
    State(state): State<AppState>,
    Path(db): Path<String>,
    body: Bytes,
) -> Result<Json<TransactionResponse>, HttpError> {
    state.check_database(&db)?;
    let request = parse(&body)?;
    let database = state.db.clone();
    let response = task::spawn_blocking(move || match request.statements.as_slice() {
        [single] => run_alone(&database, single),
        statements => {
            let handle = database.begin(TransactionMetadata::new());
            finish(&database, &handle, run_statements(&database, &handle, statements))
        }
    })
    .await?;
    Ok(Json(response))
}

/// `POST /db/{db}/tx`
pub async fn open(
    State(state): State<AppState>,
    Path(db): Path<String>,
    body: Bytes,
) -> Result<(StatusCode, Json<TransactionResponse>), HttpError> {
    state.check_database(&db)?;
    let request = parse(&body)?;
    let database = state.db.clone();
    let handle = database.begin(TransactionMetadata::new());
    let worker = handle.clone();
    let (results, failure) =
        task::spawn_blocking(move || run_statements(&database, &worker, &request.statements)).await?;

    if let Some(failure) = failure {
        rollback_quietly(&state.db, &handle);
        return Ok((StatusCode::OK, Json(response(results, Some(failure)))));
    }

    let expires = state.transactions.register(handle.clone());
    debug!("HTTP transaction {} opened", handle.id());
    let mut body = response(results, None);
    state.describe_open(&mut body, &db, handle.id(), expires);
    Ok((StatusCode::CREATED, Json(body)))
}

/// `POST /db/{db}/tx/{id}`
pub async fn execute(
    State(state): State<AppState>,
    Path((db, id)): Path<(String, String)>,
    body: Bytes,
) -> Result<Json<TransactionResponse>, HttpError> {
    state.check_database(&db)?;
    let request = parse(&body)?;
    let id = parse_id(&id)?;
    let (handle, expires) = state
        .transactions
        .touch(id)
        .ok_or_else(|| HttpError::TransactionNotFound(id.to_string()))?;

    let database = state.db.clone();
    let worker = handle.clone();
    let (results, failure) =
        task::spawn_blocking(move || run_statements(&database, &worker, &request.statements)).await?;

    if let Some(failure) = failure {
        state.transactions.remove(id);
        rollback_quietly(&state.db, &handle);
        return Ok(Json(response(results, Some(failure))));
    }
    let mut body = response(results, None);
    state.describe_open(&mut body, &db, id, expires);
    Ok(Json(body))
}

/// `POST /db/{db}/tx/{id}/commit`
pub async fn commit(
    State(state): State<AppState>,
    Path((db, id)): Path<(String, String)>,
    body: Bytes,
) -> Result<Json<TransactionResponse>, HttpError> {
    state.check_database(&db)?;
    let request = parse(&body)?;
    let id = parse_id(&id)?;
    let handle = state
        .transactions
        .remove(id)
        .ok_or_else(|| HttpError::TransactionNotFound(id.to_string()))?;
    let database = state.db.clone();
    let response = task::spawn_blocking(move || {
        finish(&database, &handle, run_statements(&database, &handle, &request.statements))
    })
    .await?;
    Ok(Json(response))
}

/// `DELETE /db/{db}/tx/{id}`
pub async fn rollback(
    State(state): State<AppState>,
    Path((db, id)): Path<(String, String)>,
) -> Result<Json<TransactionResponse>, HttpError> {
    state.check_database(&db)?;
    let id = parse_id(&id)?;
    let handle = state
        .transactions
        .remove(id)
        .ok_or_else(|| HttpError::TransactionNotFound(id.to_string()))?;
    let mut body = TransactionResponse::default();
    if let Err(e) = state.db.manager().rollback(handle.id()) {
        body.errors.push(e.failure());
    }
    Ok(Json(body))
}

/// `GET /`
pub async fn discovery(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "bolt_direct": format!("bolt://{}", state.options.bolt_address),
        "bolt_routing": format!("neo4j://{}", state.options.bolt_address),
        "transaction": format!("{}/db/{{databaseName}}/tx", state.options.base_url),
        "neo4j_version": crate::NEO4J_VERSION,
        "neo4j_edition": "community",
    }))
}

impl super::HttpState {
    fn check_database(&self, name: &str) -> Result<(), HttpError> {
        if name == self.db.name() {
            Ok(())
        } else {
            Err(HttpError::DatabaseNotFound(name.to_string()))
        }
    }

    fn describe_open(
        &self,
        body: &mut TransactionResponse,
        db: &str,
        id: TransactionId,
        expires: DateTime<Utc>,
    ) {
        body.commit = Some(format!(
            "{}/db/{}/tx/{}/commit",
            self.options.base_url,
            db,
            id.id()
        ));
        body.transaction = Some(TransactionInfo {
            expires: format_expiry(expires),
        });
    }
}

fn parse(body: &[u8]) -> Result<TransactionRequest, HttpError> {
    TransactionRequest::from_body(body).map_err(|e| HttpError::InvalidFormat(e.to_string()))
}

fn parse_id(id: &str) -> Result<TransactionId, HttpError> {
    TransactionId::parse(id).ok_or_else(|| HttpError::TransactionNotFound(id.to_string()))
}

/// Run statements in order, stopping at the first failure
fn run_statements(
    db: &GraphDatabase,
    handle: &TransactionHandle,
    statements: &[StatementRequest],
) -> Outcome {
    let mut results = Vec::with_capacity(statements.len());
    for statement in statements {
        let params = statement.parameter_map();
        match db
            .executor()
            .execute(&statement.statement, &params, Some(handle))
        {
            Ok(result) => results.push((result, statement.include_stats)),
            Err(e) => {
                debug!("HTTP statement failed in {}: {}", handle.id(), e);
                return (results, Some(e.failure()));
            }
        }
    }
    (results, None)
}

/// A lone statement runs as an auto-commit query
fn run_alone(db: &GraphDatabase, statement: &StatementRequest) -> TransactionResponse {
    let params = statement.parameter_map();
    match db.executor().execute(&statement.statement, &params, None) {
        Ok(mut result) => {
            let bookmark = result.bookmark.take();
            let mut body = response(vec![(result, statement.include_stats)], None);
            body.last_bookmarks.extend(bookmark);
            body
        }
        Err(e) => {
            debug!("HTTP auto-commit statement failed: {}", e);
            response(Vec::new(), Some(e.failure()))
        }
    }
}

/// Commit after a clean run, roll back after a failed one
fn finish(db: &GraphDatabase, handle: &TransactionHandle, outcome: Outcome) -> TransactionResponse {
    let (mut results, failure) = outcome;
    if let Some(failure) = failure {
        rollback_quietly(db, handle);
        return response(results, Some(failure));
    }
    match db.manager().commit(handle.id()) {
        Ok(summary) => {
            for (result, _) in &mut results {
                result.rewrite_ids(&summary.id_map);
            }
            let mut body = response(results, None);
            body.last_bookmarks.push(summary.bookmark);
            body
        }
        Err(e) => {
            warn!("HTTP commit of {} failed: {}", handle.id(), e);
            response(Vec::new(), Some(e.failure()))
        }
    }
}

fn rollback_quietly(db: &GraphDatabase, handle: &TransactionHandle) {
    if let Err(e) = db.manager().rollback(handle.id()) {
        debug!("rollback of {} skipped: {}", handle.id(), e);
    }
}

fn response(results: Vec<(QueryResult, bool)>, failure: Option<Failure>) -> TransactionResponse {
    TransactionResponse {
        results: results
            .into_iter()
            .map(|(result, stats)| StatementResult::from_result(result, stats))
            .collect(),
        errors: failure.into_iter().collect(),
        ..Default::default()
    }
}
