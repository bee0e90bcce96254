// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Bolt session state machine
//!
//! One `BoltSession` per connection. It is independent of the socket: the
//! server feeds it decoded requests and writes back whatever it answers.
//! Every request is first checked against the transition table; statements
//! then run on the blocking pool so a slow query never stalls the runtime.

use super::auth::{AuthToken, Authenticator, Principal};
use super::handshake::BoltVersion;
use super::message::{Extra, MessageKind, Request, Response};
use super::state::{transition, SessionState, Transition};
use crate::database::GraphDatabase;
use crate::error::{codes, Failure, Neo4jStatus};
use crate::exec::{ExecutionResult, QueryResult, SessionTransactionState};
use crate::storage::Value;
use crate::txn::TransactionMetadata;
use log::{debug, info, warn};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Per-server settings every session shares
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Reported in HELLO as `server`
    pub server_agent: String,
    pub database_name: String,
    pub query_timeout: Option<Duration>,
    /// `host:port` handed out in routing tables
    pub advertised_address: String,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            server_agent: format!("Neo4j/{}", crate::NEO4J_VERSION),
            database_name: "neo4j".to_string(),
            query_timeout: None,
            advertised_address: "localhost:7687".to_string(),
        }
    }
}

/// Responses for one request, and whether to hang up afterwards
#[derive(Debug, Default)]
pub struct Reply {
    pub responses: Vec<Response>,
    pub close: bool,
}

impl Reply {
    fn one(response: Response) -> Self {
        Self {
            responses: vec![response],
            close: false,
        }
    }
}

/// Rows of one RUN waiting to be pulled
struct ResultStream {
    qid: i64,
    rows: VecDeque<Vec<Value>>,
    summary: Extra,
    started: Instant,
}

/// A failed request and the state it leaves the session in
struct Rejection {
    failure: Failure,
    next: SessionState,
}

impl Rejection {
    fn failed(failure: Failure) -> Self {
        Self {
            failure,
            next: SessionState::Failed,
        }
    }
}

impl<E: Neo4jStatus> From<E> for Rejection {
    fn from(error: E) -> Self {
        Rejection::failed(error.failure())
    }
}

type Handled = Result<Vec<Response>, Rejection>;

enum Blocking<T> {
    Done(T),
    TimedOut,
    Crashed(String),
}

pub struct BoltSession {
    version: BoltVersion,
    connection_id: String,
    db: Arc<GraphDatabase>,
    authenticator: Arc<dyn Authenticator>,
    options: Arc<SessionOptions>,
    state: SessionState,
    principal: Option<Principal>,
    transactions: Arc<SessionTransactionState>,
    streams: Vec<ResultStream>,
    next_qid: i64,
    tx_timeout: Option<Duration>,
}

impl BoltSession {
    pub fn new(
        version: BoltVersion,
        connection_id: String,
        db: Arc<GraphDatabase>,
        authenticator: Arc<dyn Authenticator>,
        options: Arc<SessionOptions>,
    ) -> Self {
        let transactions = Arc::new(db.session());
        Self {
            version,
            connection_id,
            db,
            authenticator,
            options,
            state: SessionState::Connected,
            principal: None,
            transactions,
            streams: Vec::new(),
            next_qid: 0,
            tx_timeout: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn version(&self) -> BoltVersion {
        self.version
    }

    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    pub async fn handle(&mut self, request: Request) -> Reply {
        let kind = request.kind();
        debug!("{} {:?} in {}", self.connection_id, kind, self.state);
        match transition(self.state, kind) {
            Transition::Ignore => return Reply::one(Response::Ignored),
            Transition::Violation => return self.violation(kind),
            Transition::Handle => {}
        }

        let outcome = match request {
            Request::Hello { extra } => self.hello(extra).await,
            Request::Logon { auth } => self.logon(auth).await,
            Request::Logoff => self.logoff(),
            Request::Goodbye => {
                self.clear();
                self.state = SessionState::Closed;
                return Reply {
                    responses: Vec::new(),
                    close: true,
                };
            }
            Request::Reset => self.reset(),
            Request::Run {
                query,
                parameters,
                extra,
            } => self.run(query, parameters, extra).await,
            Request::Begin { extra } => self.begin(extra),
            Request::Commit => self.commit().await,
            Request::Rollback => self.rollback(),
            Request::Pull { extra } => self.pull(extra, true),
            Request::Discard { extra } => self.pull(extra, false),
            Request::Route { extra, .. } => self.route(extra),
        };

        match outcome {
            Ok(responses) => Reply {
                responses,
                close: false,
            },
            Err(rejection) => {
                debug!(
                    "{} {:?} failed: {}",
                    self.connection_id, kind, rejection.failure
                );
                if rejection.next != SessionState::Authenticating {
                    self.streams.clear();
                }
                self.state = rejection.next;
                Reply::one(Response::Failure(rejection.failure))
            }
        }
    }

    fn violation(&mut self, kind: MessageKind) -> Reply {
        warn!(
            "{} protocol violation: {:?} in state {}",
            self.connection_id, kind, self.state
        );
        let failure = Failure::new(
            codes::REQUEST_INVALID,
            format!(
                "Message {:?} cannot be handled by a session in the {} state",
                kind, self.state
            ),
        );
        self.clear();
        self.state = SessionState::Closed;
        Reply {
            responses: vec![Response::Failure(failure)],
            close: true,
        }
    }

    /// Session-ending cleanup shared by GOODBYE, violations and disconnects
    pub fn clear(&mut self) {
        self.streams.clear();
        self.tx_timeout = None;
        self.transactions.reset();
    }

    async fn hello(&mut self, extra: Extra) -> Handled {
        let mut metadata = Extra::new();
        metadata.insert(
            "server".to_string(),
            Value::String(self.options.server_agent.clone()),
        );
        metadata.insert(
            "connection_id".to_string(),
            Value::String(self.connection_id.clone()),
        );
        metadata.insert("hints".to_string(), Value::Map(Extra::new()));

        if self.version.uses_logon() {
            self.state = SessionState::Authenticating;
            return Ok(vec![Response::Success(metadata)]);
        }
        self.authenticate(&extra).await?;
        self.state = SessionState::Ready;
        Ok(vec![Response::Success(metadata)])
    }

    async fn logon(&mut self, auth: Extra) -> Handled {
        self.authenticate(&auth).await?;
        self.state = SessionState::Ready;
        Ok(vec![Response::success()])
    }

    async fn authenticate(&mut self, fields: &Extra) -> Result<(), Rejection> {
        let token = AuthToken::from_map(fields);
        match self.authenticator.authenticate(&token).await {
            Ok(principal) => {
                info!(
                    "{} authenticated as {} (Bolt {})",
                    self.connection_id, principal.username, self.version
                );
                self.principal = Some(principal);
                Ok(())
            }
            Err(e) => {
                warn!("{} authentication failed for {}: {}", self.connection_id, token, e);
                Err(Rejection {
                    failure: e.failure(),
                    next: SessionState::Authenticating,
                })
            }
        }
    }

    fn logoff(&mut self) -> Handled {
        if !self.version.uses_logon() {
            return Err(Rejection {
                failure: Failure::new(codes::REQUEST_INVALID, "LOGOFF requires Bolt 5.1"),
                next: SessionState::Closed,
            });
        }
        self.principal = None;
        self.state = SessionState::Authenticating;
        Ok(vec![Response::success()])
    }

    fn reset(&mut self) -> Handled {
        self.clear();
        self.state = SessionState::Ready;
        Ok(vec![Response::success()])
    }

    async fn run(&mut self, query: String, parameters: Extra, extra: Extra) -> Handled {
        let in_transaction = self.state.in_transaction();
        let metadata = if in_transaction {
            TransactionMetadata::new()
        } else {
            transaction_metadata(&extra)?
        };
        let timeout = if in_transaction {
            self.tx_timeout
        } else {
            timeout_from(&extra)
        }
        .or(self.options.query_timeout);

        let started = Instant::now();
        let outcome = self
            .blocking(timeout, move |transactions| -> ExecutionResult<QueryResult> {
                let statement = crate::cypher::parse_statement(&query)?;
                transactions.execute_statement(&statement, &parameters, metadata)
            })
            .await?;
        let result = outcome?;

        let qid = if self.transactions.has_active_transaction() {
            let qid = self.next_qid;
            self.next_qid += 1;
            self.state = SessionState::TxStreaming;
            Some(qid)
        } else {
            self.state = SessionState::Streaming;
            None
        };

        let mut metadata = Extra::new();
        metadata.insert(
            "fields".to_string(),
            Value::List(result.columns.iter().cloned().map(Value::String).collect()),
        );
        metadata.insert(
            "t_first".to_string(),
            Value::Integer(started.elapsed().as_millis() as i64),
        );
        if let Some(qid) = qid {
            metadata.insert("qid".to_string(), Value::Integer(qid));
        }

        let summary = self.summary(&result);
        self.streams.push(ResultStream {
            qid: qid.unwrap_or(-1),
            rows: result.rows.into(),
            summary,
            started: Instant::now(),
        });
        Ok(vec![Response::Success(metadata)])
    }

    fn summary(&self, result: &QueryResult) -> Extra {
        let mut summary = Extra::new();
        if let Some(bookmark) = &result.bookmark {
            summary.insert("bookmark".to_string(), Value::String(bookmark.clone()));
        }
        summary.insert(
            "type".to_string(),
            Value::String(result.query_type.as_str().to_string()),
        );
        summary.insert(
            "db".to_string(),
            Value::String(self.options.database_name.clone()),
        );
        if result.stats.contains_updates() || result.stats.contains_system_updates() {
            summary.insert("stats".to_string(), Value::Map(result.stats.to_map()));
        }
        summary
    }

    /// PULL when `emit` is set, DISCARD otherwise
    fn pull(&mut self, extra: Extra, emit: bool) -> Handled {
        let n = extra.get("n").and_then(Value::as_integer).unwrap_or(-1);
        let qid = extra.get("qid").and_then(Value::as_integer).unwrap_or(-1);
        let index = if qid == -1 {
            self.streams.len().checked_sub(1)
        } else {
            self.streams.iter().position(|s| s.qid == qid)
        }
        .ok_or_else(|| {
            Rejection::failed(Failure::new(
                codes::REQUEST_INVALID,
                format!("No result available for qid {}", qid),
            ))
        })?;

        let stream = &mut self.streams[index];
        let take = if n < 0 {
            stream.rows.len()
        } else {
            (n as usize).min(stream.rows.len())
        };
        let mut responses = Vec::with_capacity(take + 1);
        for row in stream.rows.drain(..take) {
            if emit {
                responses.push(Response::Record(row));
            }
        }

        if !stream.rows.is_empty() {
            let mut metadata = Extra::new();
            metadata.insert("has_more".to_string(), Value::Boolean(true));
            responses.push(Response::Success(metadata));
            return Ok(responses);
        }

        let stream = self.streams.remove(index);
        let mut summary = stream.summary;
        summary.insert(
            "t_last".to_string(),
            Value::Integer(stream.started.elapsed().as_millis() as i64),
        );
        responses.push(Response::Success(summary));
        self.state = match (self.state.in_transaction(), self.streams.is_empty()) {
            (true, true) => SessionState::InTransaction,
            (true, false) => SessionState::TxStreaming,
            (false, true) => SessionState::Ready,
            (false, false) => SessionState::Streaming,
        };
        Ok(responses)
    }

    fn begin(&mut self, extra: Extra) -> Handled {
        let metadata = transaction_metadata(&extra)?;
        let handle = self.transactions.begin_transaction(metadata)?;
        debug!("{} began {}", self.connection_id, handle.id());
        self.tx_timeout = timeout_from(&extra);
        self.next_qid = 0;
        self.state = SessionState::InTransaction;
        Ok(vec![Response::success()])
    }

    async fn commit(&mut self) -> Handled {
        self.streams.clear();
        self.tx_timeout = None;
        let outcome = self
            .blocking(None, |transactions| transactions.commit_transaction())
            .await?;
        let summary = outcome?;
        self.state = SessionState::Ready;
        let mut metadata = Extra::new();
        metadata.insert("bookmark".to_string(), Value::String(summary.bookmark));
        Ok(vec![Response::Success(metadata)])
    }

    fn rollback(&mut self) -> Handled {
        self.streams.clear();
        self.tx_timeout = None;
        if self.transactions.has_active_transaction() {
            self.transactions.rollback_transaction()?;
        }
        self.state = SessionState::Ready;
        Ok(vec![Response::success()])
    }

    fn route(&mut self, extra: Extra) -> Handled {
        let db = extra
            .get("db")
            .and_then(Value::as_str)
            .unwrap_or(&self.options.database_name)
            .to_string();
        let server = |role: &str| {
            let mut entry = Extra::new();
            entry.insert(
                "addresses".to_string(),
                Value::List(vec![Value::String(self.options.advertised_address.clone())]),
            );
            entry.insert("role".to_string(), Value::String(role.to_string()));
            Value::Map(entry)
        };
        let mut table = Extra::new();
        table.insert("ttl".to_string(), Value::Integer(300));
        table.insert("db".to_string(), Value::String(db));
        table.insert(
            "servers".to_string(),
            Value::List(vec![server("ROUTE"), server("READ"), server("WRITE")]),
        );
        let mut metadata = Extra::new();
        metadata.insert("rt".to_string(), Value::Map(table));
        Ok(vec![Response::Success(metadata)])
    }

    /// Run `job` on the blocking pool. On timeout the running statement is
    /// cancelled, awaited, and the session is reset.
    async fn blocking<F, T>(&mut self, timeout: Option<Duration>, job: F) -> Result<T, Rejection>
    where
        F: FnOnce(&SessionTransactionState) -> T + Send + 'static,
        T: Send + 'static,
    {
        let transactions = self.transactions.clone();
        let mut task = tokio::task::spawn_blocking(move || job(&transactions));
        let outcome = match timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut task).await {
                Ok(joined) => joined.map_or_else(|e| Blocking::Crashed(e.to_string()), Blocking::Done),
                Err(_) => {
                    self.transactions.interrupt();
                    if let Err(e) = task.await {
                        warn!("{} cancelled statement crashed: {}", self.connection_id, e);
                    }
                    Blocking::TimedOut
                }
            },
            None => task
                .await
                .map_or_else(|e| Blocking::Crashed(e.to_string()), Blocking::Done),
        };
        match outcome {
            Blocking::Done(value) => Ok(value),
            Blocking::TimedOut => {
                warn!("{} statement timed out", self.connection_id);
                self.clear();
                Err(Rejection {
                    failure: Failure::new(
                        codes::TRANSACTION_TIMED_OUT,
                        "The transaction has not completed within the timeout specified at its start by the client",
                    ),
                    next: SessionState::Interrupted,
                })
            }
            Blocking::Crashed(message) => {
                self.clear();
                Err(Rejection::failed(Failure::new(codes::UNKNOWN_ERROR, message)))
            }
        }
    }
}

impl Drop for BoltSession {
    fn drop(&mut self) {
        if self.transactions.has_active_transaction() {
            info!("{} closed with an open transaction, rolling back", self.connection_id);
        }
        self.transactions.reset();
    }
}

fn transaction_metadata(extra: &Extra) -> Result<TransactionMetadata, Rejection> {
    match extra.get("tx_metadata") {
        Some(Value::Map(map)) => Ok(TransactionMetadata::from_map(map.clone())?),
        Some(Value::Null) | None => Ok(TransactionMetadata::new()),
        Some(other) => Err(Rejection::failed(Failure::new(
            codes::REQUEST_INVALID,
            format!("tx_metadata must be a map, was {}", other.type_name()),
        ))),
    }
}

fn timeout_from(extra: &Extra) -> Option<Duration> {
    extra
        .get("tx_timeout")
        .and_then(Value::as_integer)
        .filter(|ms| *ms > 0)
        .map(|ms| Duration::from_millis(ms as u64))
}
