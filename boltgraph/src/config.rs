// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Server and database configuration
//!
//! Settings are layered: built-in defaults, then an optional TOML file, then
//! `BOLTGRAPH_*` environment variables. Command-line flags are applied last
//! by the binary.
//!
//! ```toml
//! [database]
//! data_dir = "./data"
//! storage = "sled"
//! sync_commits = true
//!
//! [server]
//! bolt_listen = "0.0.0.0:7687"
//! http_listen = "0.0.0.0:7474"
//! max_connections = 100
//!
//! [server.auth]
//! enabled = true
//! username = "neo4j"
//! password = "secret"
//! ```

use crate::storage::StorageType;
use log::warn;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Prefix of the environment variables that override file settings
pub const ENV_PREFIX: &str = "BOLTGRAPH_";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub data_dir: PathBuf,
    pub storage: StorageType,
    /// Flush every commit to disk before acknowledging it
    pub sync_commits: bool,
    /// Name reported to clients as `db`
    pub database_name: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            storage: StorageType::Sled,
            sync_commits: true,
            database_name: "neo4j".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bolt_listen: String,
    pub http_listen: String,
    pub max_connections: usize,
    /// Statement timeout in milliseconds, 0 disables it
    pub query_timeout_ms: u64,
    /// Idle lifetime of an HTTP transaction
    pub http_tx_timeout_secs: u64,
    pub auth: AuthConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bolt_listen: "0.0.0.0:7687".to_string(),
            http_listen: "0.0.0.0:7474".to_string(),
            max_connections: 100,
            query_timeout_ms: 0,
            http_tx_timeout_secs: 60,
            auth: AuthConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn query_timeout(&self) -> Option<Duration> {
        (self.query_timeout_ms > 0).then(|| Duration::from_millis(self.query_timeout_ms))
    }

    pub fn http_tx_timeout(&self) -> Duration {
        Duration::from_secs(self.http_tx_timeout_secs)
    }

    pub fn bolt_addr(&self) -> Result<SocketAddr, ConfigError> {
        parse_addr("server.bolt_listen", &self.bolt_listen)
    }

    pub fn http_addr(&self) -> Result<SocketAddr, ConfigError> {
        parse_addr("server.http_listen", &self.http_listen)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub enabled: bool,
    pub username: String,
    pub password: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            username: "neo4j".to_string(),
            password: String::new(),
        }
    }
}

impl Config {
    /// Defaults, overlaid with `path` when given, then the environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(std::env::vars())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `BOLTGRAPH_*` overrides; unrelated variables are ignored
    pub fn apply_env<I>(&mut self, vars: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            let Some(name) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            match name {
                "DATA_DIR" => self.database.data_dir = PathBuf::from(&value),
                "STORAGE" => {
                    self.database.storage = value.parse().map_err(|reason| {
                        ConfigError::InvalidValue {
                            key: key.clone(),
                            value: value.clone(),
                            reason,
                        }
                    })?
                }
                "SYNC_COMMITS" => self.database.sync_commits = parse_env(&key, &value)?,
                "DATABASE_NAME" => self.database.database_name = value,
                "BOLT_LISTEN" => self.server.bolt_listen = value,
                "HTTP_LISTEN" => self.server.http_listen = value,
                "MAX_CONNECTIONS" => self.server.max_connections = parse_env(&key, &value)?,
                "QUERY_TIMEOUT_MS" => self.server.query_timeout_ms = parse_env(&key, &value)?,
                "HTTP_TX_TIMEOUT_SECS" => {
                    self.server.http_tx_timeout_secs = parse_env(&key, &value)?
                }
                "AUTH_ENABLED" => self.server.auth.enabled = parse_env(&key, &value)?,
                "AUTH_USERNAME" => self.server.auth.username = value,
                "AUTH_PASSWORD" => self.server.auth.password = value,
                _ => warn!("Ignoring unknown setting {}", key),
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.max_connections == 0 {
            return Err(ConfigError::InvalidValue {
                key: "server.max_connections".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.server.http_tx_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "server.http_tx_timeout_secs".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        self.server.bolt_addr()?;
        self.server.http_addr()?;
        Ok(())
    }
}

fn parse_env<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: e.to_string(),
        })
}

fn parse_addr(key: &str, value: &str) -> Result<SocketAddr, ConfigError> {
    value.parse().map_err(|e: std::net::AddrParseError| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason: e.to_string(),
    })
}
