// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Bolt TCP server
//!
//! Accepts connections, performs the version handshake and then shuttles
//! chunked messages between the socket and a [`BoltSession`].

use super::auth::Authenticator;
use super::chunk::{read_message, write_message};
use super::error::BoltError;
use super::handshake::{negotiate, BoltVersion, MAGIC, NO_VERSION};
use super::message::{Request, Response};
use super::session::{BoltSession, SessionOptions};
use crate::config::ServerConfig;
use crate::database::GraphDatabase;
use crate::error::{codes, Failure};
use log::{debug, error, info, warn};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Semaphore};

pub struct BoltServer {
    db: Arc<GraphDatabase>,
    authenticator: Arc<dyn Authenticator>,
    options: Arc<SessionOptions>,
    limit: Arc<Semaphore>,
    next_connection: AtomicU64,
}

impl BoltServer {
    pub fn new(
        db: Arc<GraphDatabase>,
        config: &ServerConfig,
        authenticator: Arc<dyn Authenticator>,
    ) -> Self {
        let options = SessionOptions {
            database_name: db.name().to_string(),
            query_timeout: config.query_timeout(),
            advertised_address: config.bolt_listen.clone(),
            ..SessionOptions::default()
        };
        Self::with_options(db, options, config.max_connections, authenticator)
    }

    pub fn with_options(
        db: Arc<GraphDatabase>,
        options: SessionOptions,
        max_connections: usize,
        authenticator: Arc<dyn Authenticator>,
    ) -> Self {
        Self {
            db,
            authenticator,
            options: Arc::new(options),
            limit: Arc::new(Semaphore::new(max_connections.max(1))),
            next_connection: AtomicU64::new(0),
        }
    }

    /// Bind `addr` and serve until `shutdown` flips to true
    pub async fn run(self, addr: SocketAddr, shutdown: watch::Receiver<bool>) -> std::io::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener, shutdown).await
    }

    pub async fn serve(
        mut self,
        listener: TcpListener,
        mut shutdown: watch::Receiver<bool>,
    ) -> std::io::Result<()> {
        let local = listener.local_addr()?;
        if self.options.advertised_address.starts_with("0.0.0.0") || local.port() == 0 {
            let mut options = (*self.options).clone();
            options.advertised_address = local.to_string();
            self.options = Arc::new(options);
        }
        info!("Bolt server listening on {}", local);
        let server = Arc::new(self);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Bolt server on {} shutting down", local);
                        return Ok(());
                    }
                }
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            warn!("accept failed: {}", e);
                            continue;
                        }
                    };
                    let permit = match server.limit.clone().try_acquire_owned() {
                        Ok(permit) => permit,
                        Err(_) => {
                            warn!("rejecting {}: connection limit reached", peer);
                            drop(stream);
                            continue;
                        }
                    };
                    let id = server.next_connection.fetch_add(1, Ordering::Relaxed) + 1;
                    let connection_id = format!("bolt-{}", id);
                    let server = server.clone();
                    let shutdown = shutdown.clone();
                    tokio::spawn(async move {
                        debug!("{} connected from {}", connection_id, peer);
                        match server.connection(stream, connection_id.clone(), shutdown).await {
                            Ok(()) => debug!("{} closed", connection_id),
                            Err(BoltError::Io(e)) => debug!("{} dropped: {}", connection_id, e),
                            Err(e) => warn!("{} closed: {}", connection_id, e),
                        }
                        drop(permit);
                    });
                }
            }
        }
    }

    async fn connection(
        &self,
        stream: TcpStream,
        connection_id: String,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), BoltError> {
        stream.set_nodelay(true)?;
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);

        let version = match handshake(&mut reader, &mut writer).await? {
            Some(version) => version,
            None => return Err(BoltError::UnsupportedVersion),
        };
        debug!("{} negotiated Bolt {}", connection_id, version);

        let mut session = BoltSession::new(
            version,
            connection_id,
            self.db.clone(),
            self.authenticator.clone(),
            self.options.clone(),
        );

        loop {
            let body = tokio::select! {
                read = read_message(&mut reader) => read?,
                _ = shutdown.changed() => None,
            };
            let Some(body) = body else {
                session.clear();
                return Ok(());
            };

            let request = match Request::decode(&body) {
                Ok(request) => request,
                Err(e) => {
                    let failure = Response::Failure(Failure::new(codes::REQUEST_INVALID, e.to_string()));
                    send(&mut writer, version, &failure).await?;
                    session.clear();
                    return Err(e);
                }
            };

            let reply = session.handle(request).await;
            for response in &reply.responses {
                send(&mut writer, version, response).await?;
            }
            writer.flush().await?;
            if reply.close {
                session.clear();
                return Ok(());
            }
        }
    }
}

async fn handshake<R, W>(reader: &mut R, writer: &mut W) -> Result<Option<BoltVersion>, BoltError>
where
    R: AsyncReadExt + Unpin,
    W: AsyncWriteExt + Unpin,
{
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic).await?;
    if magic != MAGIC {
        return Err(BoltError::BadMagic);
    }
    let mut proposals = [0u8; 16];
    reader.read_exact(&mut proposals).await?;
    match negotiate(&proposals) {
        Some(version) => {
            writer.write_all(&version.to_bytes()).await?;
            writer.flush().await?;
            Ok(Some(version))
        }
        None => {
            writer.write_all(&NO_VERSION).await?;
            writer.flush().await?;
            Ok(None)
        }
    }
}

async fn send<W>(writer: &mut W, version: BoltVersion, response: &Response) -> Result<(), BoltError>
where
    W: AsyncWriteExt + Unpin,
{
    let body = match response.encode(version) {
        Ok(body) => body,
        Err(e) => {
            error!("failed to encode {:?} response: {}", response.signature(), e);
            Response::Failure(Failure::new(codes::UNKNOWN_ERROR, e.to_string())).encode(version)?
        }
    };
    write_message(writer, &body).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bolt::auth::AllowAll;

    #[tokio::test]
    async fn test_handshake_picks_version() {
        let mut input = MAGIC.to_vec();
        input.extend_from_slice(&[0, 0, 4, 5, 0, 0, 4, 4, 0, 0, 0, 0, 0, 0, 0, 0]);
        let mut output = Vec::new();
        let version = handshake(&mut input.as_slice(), &mut output).await.unwrap();
        assert_eq!(version, Some(BoltVersion::new(5, 4)));
        assert_eq!(output, vec![0, 0, 4, 5]);
    }

    #[tokio::test]
    async fn test_handshake_rejects() {
        let mut bad = vec![1, 2, 3, 4];
        bad.extend_from_slice(&[0; 16]);
        let mut output = Vec::new();
        assert!(matches!(
            handshake(&mut bad.as_slice(), &mut output).await,
            Err(BoltError::BadMagic)
        ));

        let mut old = MAGIC.to_vec();
        old.extend_from_slice(&[0, 0, 0, 3, 0, 0, 0, 2, 0, 0, 0, 0, 0, 0, 0, 0]);
        let mut output = Vec::new();
        assert_eq!(handshake(&mut old.as_slice(), &mut output).await.unwrap(), None);
        assert_eq!(output, NO_VERSION.to_vec());
    }

    #[tokio::test]
    async fn test_server_stops_on_shutdown() {
        let db = GraphDatabase::memory().unwrap();
        let server = BoltServer::with_options(db, SessionOptions::default(), 4, Arc::new(AllowAll));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(server.serve(listener, rx));
        tx.send(true).unwrap();
        task.await.unwrap().unwrap();
    }
}
