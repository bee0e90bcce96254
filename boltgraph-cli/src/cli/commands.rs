// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Command-line arguments

use boltgraph::{Config, StorageType};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "boltgraph", version, about = "Transactional graph database speaking Bolt")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Debug logging (shorthand for --log-level debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, value_enum)]
    pub log_level: Option<LogLevel>,

    /// TOML configuration file
    #[arg(short, long, global = true, env = "BOLTGRAPH_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Serve Bolt and HTTP until interrupted
    Serve {
        #[command(flatten)]
        database: DatabaseArgs,

        /// Bolt listen address, e.g. 0.0.0.0:7687
        #[arg(long)]
        bolt_listen: Option<String>,

        /// HTTP listen address, e.g. 0.0.0.0:7474
        #[arg(long)]
        http_listen: Option<String>,

        /// Do not start the HTTP endpoint
        #[arg(long)]
        no_http: bool,
    },

    /// Run one statement in its own transaction
    Query {
        query: String,

        #[command(flatten)]
        database: DatabaseArgs,

        /// Parameter as name=json, may be repeated
        #[arg(short, long = "param", value_name = "NAME=JSON")]
        params: Vec<String>,

        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Interactive Cypher console
    Shell {
        #[command(flatten)]
        database: DatabaseArgs,
    },

    /// List constraints
    Constraints {
        #[command(flatten)]
        database: DatabaseArgs,
    },

    /// Show version information
    Version,
}

#[derive(Debug, Clone, Args)]
pub struct DatabaseArgs {
    /// Database directory
    #[arg(short, long)]
    pub data_dir: Option<PathBuf>,

    /// Storage backend (sled or memory)
    #[arg(long)]
    pub storage: Option<StorageType>,
}

impl DatabaseArgs {
    /// Command-line flags win over file and environment settings
    pub fn apply(&self, config: &mut Config) {
        if let Some(dir) = &self.data_dir {
            config.database.data_dir = dir.clone();
        }
        if let Some(storage) = self.storage {
            config.database.storage = storage;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query_command() {
        let cli = Cli::parse_from([
            "boltgraph",
            "query",
            "RETURN $x",
            "--data-dir",
            "/tmp/db",
            "-p",
            "x=1",
            "--format",
            "json",
        ]);
        match cli.command {
            Commands::Query {
                query,
                database,
                params,
                format,
            } => {
                assert_eq!(query, "RETURN $x");
                assert_eq!(database.data_dir, Some(PathBuf::from("/tmp/db")));
                assert_eq!(params, vec!["x=1"]);
                assert_eq!(format, OutputFormat::Json);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::parse_from(["boltgraph", "-v", "shell", "--storage", "memory"]);
        assert!(cli.verbose);
        let Commands::Shell { database } = cli.command else {
            panic!("expected shell");
        };
        let mut config = Config::default();
        database.apply(&mut config);
        assert_eq!(config.database.storage, StorageType::Memory);
    }
}
