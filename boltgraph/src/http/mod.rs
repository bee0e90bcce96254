// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Neo4j-compatible HTTP transaction endpoint
//!
//! Routes:
//! - `POST /db/{db}/tx/commit` runs statements in one implicit transaction
//! - `POST /db/{db}/tx` opens a transaction
//! - `POST /db/{db}/tx/{id}` runs more statements in it
//! - `POST /db/{db}/tx/{id}/commit` runs final statements and commits
//! - `DELETE /db/{db}/tx/{id}` rolls back
//! - `GET /` discovery document

pub mod error;
mod handlers;
pub mod transactions;
pub mod types;

pub use error::HttpError;
pub use transactions::HttpTransactions;
pub use types::{StatementRequest, TransactionRequest, TransactionResponse};

use crate::config::ServerConfig;
use crate::database::GraphDatabase;
use axum::routing::{get, post};
use axum::Router;
use log::info;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;

#[derive(Debug, Clone)]
pub struct HttpOptions {
    /// Prefix of the `commit` URLs handed back to clients
    pub base_url: String,
    /// Bolt address advertised by discovery
    pub bolt_address: String,
    /// Idle time after which an open transaction is rolled back
    pub tx_timeout: Duration,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:7474".to_string(),
            bolt_address: "localhost:7687".to_string(),
            tx_timeout: Duration::from_secs(60),
        }
    }
}

pub struct HttpState {
    db: Arc<GraphDatabase>,
    transactions: Arc<HttpTransactions>,
    options: HttpOptions,
}

type AppState = Arc<HttpState>;

pub struct HttpServer {
    db: Arc<GraphDatabase>,
    transactions: Arc<HttpTransactions>,
    options: HttpOptions,
}

impl HttpServer {
    pub fn new(db: Arc<GraphDatabase>, config: &ServerConfig) -> Self {
        let options = HttpOptions {
            base_url: format!("http://{}", localhost(&config.http_listen)),
            bolt_address: localhost(&config.bolt_listen),
            tx_timeout: config.http_tx_timeout(),
        };
        Self::with_options(db, options)
    }

    pub fn with_options(db: Arc<GraphDatabase>, options: HttpOptions) -> Self {
        let transactions = Arc::new(HttpTransactions::new(db.manager().clone(), options.tx_timeout));
        Self {
            db,
            transactions,
            options,
        }
    }

    pub fn transactions(&self) -> &Arc<HttpTransactions> {
        &self.transactions
    }

    pub fn router(&self) -> Router {
        let state = Arc::new(HttpState {
            db: self.db.clone(),
            transactions: self.transactions.clone(),
            options: self.options.clone(),
        });
        Router::new()
            .route("/", get(handlers::discovery))
            .route("/db/:db/tx", post(handlers::open))
            .route("/db/:db/tx/commit", post(handlers::commit_implicit))
            .route(
                "/db/:db/tx/:id",
                post(handlers::execute).delete(handlers::rollback),
            )
            .route("/db/:db/tx/:id/commit", post(handlers::commit))
            .with_state(state)
    }

    pub async fn run(self, addr: SocketAddr, shutdown: watch::Receiver<bool>) -> std::io::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve until `shutdown` flips to true, then roll back open transactions
    pub async fn serve(
        mut self,
        listener: TcpListener,
        shutdown: watch::Receiver<bool>,
    ) -> std::io::Result<()> {
        let local = listener.local_addr()?;
        if self.options.base_url.ends_with(":0") {
            self.options.base_url = format!("http://localhost:{}", local.port());
        }
        info!("HTTP endpoint listening on {}", local);

        let reaper = tokio::spawn(reap(self.transactions.clone(), shutdown.clone()));
        let mut stop = shutdown;
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                while !*stop.borrow() {
                    if stop.changed().await.is_err() {
                        break;
                    }
                }
            })
            .await?;

        reaper.abort();
        self.transactions.close_all();
        info!("HTTP endpoint on {} stopped", local);
        Ok(())
    }
}

async fn reap(transactions: Arc<HttpTransactions>, mut shutdown: watch::Receiver<bool>) {
    let mut tick = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = tick.tick() => {
                transactions.reap(chrono::Utc::now());
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return;
                }
            }
        }
    }
}

/// `0.0.0.0:port` is not something a client can dial
fn localhost(listen: &str) -> String {
    match listen.strip_prefix("0.0.0.0:") {
        Some(port) => format!("localhost:{}", port),
        None => listen.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request, StatusCode};
    use tower::ServiceExt;

    fn server() -> HttpServer {
        HttpServer::with_options(GraphDatabase::memory().unwrap(), HttpOptions::default())
    }

    async fn call(router: Router, method: Method, uri: &str, body: &str) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_implicit_commit() {
        let server = server();
        let (status, body) = call(
            server.router(),
            Method::POST,
            "/db/neo4j/tx/commit",
            r#"{"statements":[{"statement":"CREATE (n:Person {name: $name}) RETURN n.name AS name","parameters":{"name":"Ann"}}]}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["errors"].as_array().unwrap().len(), 0);
        assert_eq!(body["results"][0]["columns"][0], "name");
        assert_eq!(body["results"][0]["data"][0]["row"][0], "Ann");
        assert_eq!(body["lastBookmarks"].as_array().unwrap().len(), 1);

        let (_, body) = call(
            server.router(),
            Method::POST,
            "/db/neo4j/tx/commit",
            r#"{"statements":[{"statement":"CREATE (n:Person) RETURN id(n) AS id"}]}"#,
        )
        .await;
        let id = body["results"][0]["data"][0]["row"][0].as_i64().unwrap();
        assert!(id >= 0, "{}", body);
        let (_, body) = call(
            server.router(),
            Method::POST,
            "/db/neo4j/tx/commit",
            r#"{"statements":[{"statement":"MATCH (n:Person) WHERE n.name IS NULL RETURN id(n) AS id"}]}"#,
        )
        .await;
        assert_eq!(body["results"][0]["data"][0]["row"][0].as_i64(), Some(id));
    }

    #[tokio::test]
    async fn test_open_execute_commit() {
        let server = server();
        let (status, body) = call(server.router(), Method::POST, "/db/neo4j/tx", "").await;
        assert_eq!(status, StatusCode::CREATED);
        let commit = body["commit"].as_str().unwrap().to_string();
        assert!(body["transaction"]["expires"].as_str().unwrap().ends_with("GMT"));
        let path = commit.trim_start_matches("http://localhost:7474").to_string();
        let tx_path = path.trim_end_matches("/commit").to_string();

        let (status, body) = call(
            server.router(),
            Method::POST,
            &tx_path,
            r#"{"statements":[{"statement":"CREATE (:Item)"}]}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["errors"].as_array().unwrap().len(), 0);

        let (_, body) = call(
            server.router(),
            Method::POST,
            "/db/neo4j/tx/commit",
            r#"{"statements":[{"statement":"MATCH (n:Item) RETURN count(n) AS c"}]}"#,
        )
        .await;
        assert_eq!(body["results"][0]["data"][0]["row"][0], 0);

        let (_, body) = call(server.router(), Method::POST, &path, "").await;
        assert_eq!(body["errors"].as_array().unwrap().len(), 0);
        assert!(server.transactions().is_empty());

        let (_, body) = call(
            server.router(),
            Method::POST,
            "/db/neo4j/tx/commit",
            r#"{"statements":[{"statement":"MATCH (n:Item) RETURN count(n) AS c"}]}"#,
        )
        .await;
        assert_eq!(body["results"][0]["data"][0]["row"][0], 1);
    }

    #[tokio::test]
    async fn test_error_stops_and_rolls_back() {
        let server = server();
        let (_, body) = call(
            server.router(),
            Method::POST,
            "/db/neo4j/tx/commit",
            r#"{"statements":[{"statement":"CREATE (:Temp)"},{"statement":"RETURN"},{"statement":"CREATE (:Temp)"}]}"#,
        )
        .await;
        assert_eq!(body["results"].as_array().unwrap().len(), 1);
        assert_eq!(body["errors"][0]["code"], "Neo.ClientError.Statement.SyntaxError");

        let (_, body) = call(
            server.router(),
            Method::POST,
            "/db/neo4j/tx/commit",
            r#"{"statements":[{"statement":"MATCH (n:Temp) RETURN count(n)"}]}"#,
        )
        .await;
        assert_eq!(body["results"][0]["data"][0]["row"][0], 0);
    }

    #[tokio::test]
    async fn test_request_errors() {
        let server = server();
        let (status, body) = call(server.router(), Method::POST, "/db/neo4j/tx/commit", "{oops").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["errors"][0]["code"], "Neo.ClientError.Request.InvalidFormat");

        let (status, body) = call(server.router(), Method::DELETE, "/db/neo4j/tx/999", "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["errors"][0]["code"], "Neo.ClientError.Transaction.TransactionNotFound");

        let (status, body) = call(server.router(), Method::POST, "/db/other/tx/commit", "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["errors"][0]["code"], "Neo.ClientError.Database.DatabaseNotFound");
    }

    #[tokio::test]
    async fn test_rollback_and_discovery() {
        let server = server();
        let (_, body) = call(server.router(), Method::POST, "/db/neo4j/tx", "").await;
        let commit = body["commit"].as_str().unwrap();
        let tx_path = commit
            .trim_start_matches("http://localhost:7474")
            .trim_end_matches("/commit")
            .to_string();
        let (status, _) = call(server.router(), Method::DELETE, &tx_path, "").await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = call(server.router(), Method::DELETE, &tx_path, "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = call(server.router(), Method::GET, "/", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["bolt_routing"], "neo4j://localhost:7687");
        assert_eq!(body["neo4j_version"], crate::NEO4J_VERSION);
    }
}
