//! Bolt server tests over real TCP connections
//!
//! Each test starts a server on an ephemeral port and talks to it with the
//! minimal client in testutils.

#[path = "testutils/mod.rs"]
mod testutils;

use boltgraph::bolt::message::{self, Extra, Response};
use boltgraph::bolt::{AllowAll, Authenticator, BoltServer, BoltVersion, SessionOptions, StaticAuthenticator};
use boltgraph::error::codes;
use boltgraph::{GraphDatabase, Value};
use serial_test::serial;
use std::net::SocketAddr;
use std::sync::Arc;
use testutils::bolt_client::{basic_auth, BoltClient};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;

struct RunningServer {
    addr: SocketAddr,
    db: Arc<GraphDatabase>,
    stop: watch::Sender<bool>,
    task: JoinHandle<std::io::Result<()>>,
}

impl RunningServer {
    async fn start(authenticator: Arc<dyn Authenticator>) -> Self {
        let db = GraphDatabase::memory().unwrap();
        let server = BoltServer::with_options(db.clone(), SessionOptions::default(), 16, authenticator);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop, shutdown) = watch::channel(false);
        let task = tokio::spawn(server.serve(listener, shutdown));
        Self {
            addr,
            db,
            stop,
            task,
        }
    }

    async fn client(&self) -> BoltClient {
        let mut client = BoltClient::connect(self.addr).await.unwrap();
        match client.hello(basic_auth("neo4j", "secret")).await {
            Response::Success(_) => client,
            other => panic!("HELLO failed: {:?}", other),
        }
    }

    async fn stop(self) {
        self.stop.send(true).unwrap();
        self.task.await.unwrap().unwrap();
    }
}

fn code(response: &Response) -> &str {
    match response {
        Response::Failure(failure) => &failure.code,
        other => panic!("expected FAILURE, got {:?}", other),
    }
}

#[tokio::test]
#[serial]
async fn test_hello_run_pull() {
    let server = RunningServer::start(Arc::new(AllowAll)).await;
    let mut client = BoltClient::connect(server.addr).await.unwrap();
    assert_eq!(client.version, BoltVersion::new(5, 4));

    client
        .send(message::HELLO, &[Value::Map(basic_auth("neo4j", "any"))])
        .await;
    match client.recv().await {
        Some(Response::Success(meta)) => {
            let agent = meta.get("server").and_then(Value::as_str).unwrap();
            assert!(agent.starts_with("Neo4j/"), "{}", agent);
            assert_eq!(meta.get("connection_id"), Some(&Value::from("bolt-1")));
        }
        other => panic!("HELLO failed: {:?}", other),
    }
    client
        .send(message::LOGON, &[Value::Map(basic_auth("neo4j", "any"))])
        .await;
    assert!(matches!(client.recv().await, Some(Response::Success(_))));

    let fields = match client.run("UNWIND [1, 2, 3] AS x RETURN x * 2 AS y", Extra::new()).await {
        Response::Success(meta) => meta.get("fields").cloned(),
        other => panic!("RUN failed: {:?}", other),
    };
    assert_eq!(fields, Some(Value::List(vec![Value::from("y")])));

    let (records, summary) = client.pull_all().await;
    assert_eq!(
        records,
        vec![
            vec![Value::Integer(2)],
            vec![Value::Integer(4)],
            vec![Value::Integer(6)]
        ]
    );
    match summary {
        Response::Success(meta) => {
            assert_eq!(meta.get("type"), Some(&Value::from("r")));
            assert!(meta.contains_key("bookmark"));
        }
        other => panic!("PULL failed: {:?}", other),
    }

    server.stop().await;
}

#[tokio::test]
#[serial]
async fn test_parameters_and_writes() {
    let server = RunningServer::start(Arc::new(AllowAll)).await;
    let mut client = server.client().await;

    let mut params = Extra::new();
    params.insert("name".to_string(), Value::from("Ann"));
    params.insert("age".to_string(), Value::Integer(30));
    match client
        .run("CREATE (p:Person {name: $name, age: $age})", params)
        .await
    {
        Response::Success(_) => {}
        other => panic!("RUN failed: {:?}", other),
    }
    match client.pull_all().await {
        (records, Response::Success(meta)) => {
            assert!(records.is_empty());
            assert_eq!(meta.get("type"), Some(&Value::from("w")));
            let stats = meta.get("stats").and_then(Value::as_map).unwrap();
            assert_eq!(stats.get("nodes-created"), Some(&Value::Integer(1)));
        }
        other => panic!("PULL failed: {:?}", other),
    }

    let rows = client
        .query("MATCH (p:Person) RETURN p.name AS name, p.age AS age")
        .await;
    assert_eq!(rows, vec![vec![Value::from("Ann"), Value::Integer(30)]]);
    server.stop().await;
}

#[tokio::test]
#[serial]
async fn test_explicit_transaction() {
    let server = RunningServer::start(Arc::new(AllowAll)).await;
    let mut writer = server.client().await;
    let mut reader = server.client().await;

    assert!(matches!(
        writer.simple(message::BEGIN).await,
        Some(Response::Success(_))
    ));
    writer.query("CREATE (:Item {n: 1})").await;
    writer.query("CREATE (:Item {n: 2})").await;

    let inside = writer.query("MATCH (i:Item) RETURN count(i) AS c").await;
    assert_eq!(inside, vec![vec![Value::Integer(2)]]);
    let outside = reader.query("MATCH (i:Item) RETURN count(i) AS c").await;
    assert_eq!(outside, vec![vec![Value::Integer(0)]]);

    match writer.simple(message::COMMIT).await {
        Some(Response::Success(meta)) => assert!(meta.contains_key("bookmark")),
        other => panic!("COMMIT failed: {:?}", other),
    }
    let after = reader.query("MATCH (i:Item) RETURN count(i) AS c").await;
    assert_eq!(after, vec![vec![Value::Integer(2)]]);

    // Rolled back work never shows up
    writer.simple(message::BEGIN).await;
    writer.query("CREATE (:Item {n: 3})").await;
    assert!(matches!(
        writer.simple(message::ROLLBACK).await,
        Some(Response::Success(_))
    ));
    let count = server
        .db
        .execute("MATCH (i:Item) RETURN count(i) AS c", &Default::default())
        .unwrap();
    assert_eq!(count.get(0, "c"), Some(&Value::Integer(2)));

    server.stop().await;
}

#[tokio::test]
#[serial]
async fn test_failure_ignored_until_reset() {
    let server = RunningServer::start(Arc::new(AllowAll)).await;
    let mut client = server.client().await;

    let failure = client.run("MATCH (n RETURN n", Extra::new()).await;
    assert_eq!(code(&failure), codes::SYNTAX_ERROR);

    assert!(matches!(client.run("RETURN 1", Extra::new()).await, Response::Ignored));
    let (records, last) = client.pull_all().await;
    assert!(records.is_empty());
    assert!(matches!(last, Response::Ignored));

    assert!(matches!(
        client.simple(message::RESET).await,
        Some(Response::Success(_))
    ));
    assert_eq!(client.query("RETURN 1 AS one").await, vec![vec![Value::Integer(1)]]);
    server.stop().await;
}

#[tokio::test]
#[serial]
async fn test_reset_rolls_back_open_transaction() {
    let server = RunningServer::start(Arc::new(AllowAll)).await;
    let mut client = server.client().await;

    client.simple(message::BEGIN).await;
    client.query("CREATE (:Draft)").await;
    assert!(matches!(
        client.simple(message::RESET).await,
        Some(Response::Success(_))
    ));
    assert_eq!(
        client.query("MATCH (d:Draft) RETURN count(d) AS c").await,
        vec![vec![Value::Integer(0)]]
    );
    assert_eq!(server.db.manager().statistics().active_transactions, 0);
    server.stop().await;
}

#[tokio::test]
#[serial]
async fn test_bad_credentials() {
    let server = RunningServer::start(Arc::new(StaticAuthenticator::new("neo4j", "secret"))).await;

    // 5.x: LOGON fails and may be retried
    let mut client = BoltClient::connect(server.addr).await.unwrap();
    let denied = client.hello(basic_auth("neo4j", "wrong")).await;
    assert_eq!(code(&denied), codes::UNAUTHORIZED);
    client
        .send(message::LOGON, &[Value::Map(basic_auth("neo4j", "secret"))])
        .await;
    assert!(matches!(client.recv().await, Some(Response::Success(_))));
    assert_eq!(client.query("RETURN 1 AS one").await, vec![vec![Value::Integer(1)]]);

    // 4.4: credentials travel in HELLO; anything but a retry closes
    let mut legacy = BoltClient::connect_with(server.addr, [[0, 0, 4, 4], [0; 4], [0; 4], [0; 4]])
        .await
        .unwrap();
    assert_eq!(legacy.version, BoltVersion::new(4, 4));
    let denied = legacy.hello(basic_auth("neo4j", "wrong")).await;
    assert_eq!(code(&denied), codes::UNAUTHORIZED);
    let refused = legacy.run("RETURN 1", Extra::new()).await;
    assert_eq!(code(&refused), codes::REQUEST_INVALID);
    assert!(legacy.recv().await.is_none());

    server.stop().await;
}

#[tokio::test]
#[serial]
async fn test_version_mismatch_closes() {
    let server = RunningServer::start(Arc::new(AllowAll)).await;
    let mut client = BoltClient::connect_with(server.addr, [[0, 0, 0, 3], [0; 4], [0; 4], [0; 4]])
        .await
        .unwrap();
    assert_eq!(client.version, BoltVersion::new(0, 0));
    assert!(client.recv().await.is_none());
    server.stop().await;
}

#[tokio::test]
#[serial]
async fn test_goodbye_closes_connection() {
    let server = RunningServer::start(Arc::new(AllowAll)).await;
    let mut client = server.client().await;
    client.simple(message::BEGIN).await;
    client.query("CREATE (:Gone)").await;

    client.send(message::GOODBYE, &[]).await;
    assert!(client.recv().await.is_none());

    let count = server
        .db
        .execute("MATCH (g:Gone) RETURN count(g) AS c", &Default::default())
        .unwrap();
    assert_eq!(count.get(0, "c"), Some(&Value::Integer(0)));
    server.stop().await;
}

#[tokio::test]
#[serial]
async fn test_protocol_violation_closes() {
    let server = RunningServer::start(Arc::new(AllowAll)).await;
    let mut client = BoltClient::connect(server.addr).await.unwrap();

    // RUN before HELLO
    let refused = client.run("RETURN 1", Extra::new()).await;
    assert_eq!(code(&refused), codes::REQUEST_INVALID);
    assert!(client.recv().await.is_none());
    server.stop().await;
}

#[tokio::test]
#[serial]
async fn test_malformed_frames_close_only_that_connection() {
    let server = RunningServer::start(Arc::new(AllowAll)).await;
    let mut bystander = server.client().await;
    bystander.simple(message::BEGIN).await;
    bystander.query("CREATE (:Kept)").await;

    // Unknown marker where the query string should be
    let mut garbage = server.client().await;
    garbage.send_raw(&[0xB3, message::RUN, 0xE0, 0xE0, 0xE0]).await;
    let refused = garbage.recv().await.expect("FAILURE before close");
    assert_eq!(code(&refused), codes::REQUEST_INVALID);
    assert!(garbage.recv().await.is_none());

    // Parameters nested far deeper than any client needs
    let mut nested = server.client().await;
    let mut body = vec![0xB3, message::RUN, 0x88];
    body.extend_from_slice(b"RETURN 1");
    body.extend_from_slice(&[0xA1, 0x81, b'p']);
    body.extend(std::iter::repeat(0x91).take(100_000));
    body.push(0x01);
    body.push(0xA0);
    nested.send_raw(&body).await;
    let refused = nested.recv().await.expect("FAILURE before close");
    assert_eq!(code(&refused), codes::REQUEST_INVALID);
    assert!(nested.recv().await.is_none());

    // Everyone else carries on
    bystander.simple(message::COMMIT).await;
    let mut late = server.client().await;
    assert_eq!(
        late.query("MATCH (k:Kept) RETURN count(k) AS c").await,
        vec![vec![Value::Integer(1)]]
    );
    server.stop().await;
}

#[tokio::test]
#[serial]
async fn test_deeply_nested_query_is_a_syntax_error() {
    let server = RunningServer::start(Arc::new(AllowAll)).await;
    let mut client = server.client().await;
    let query = format!("RETURN {}1{}", "(".repeat(20_000), ")".repeat(20_000));
    let failure = client.run(&query, Extra::new()).await;
    assert_eq!(code(&failure), codes::SYNTAX_ERROR);
    client.simple(message::RESET).await;
    assert_eq!(client.query("RETURN 1 AS one").await, vec![vec![Value::Integer(1)]]);
    server.stop().await;
}
