// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! BoltGraph CLI entry point

use clap::Parser;
use colored::Colorize;

mod cli;
use cli::{Cli, Commands};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments first to get log level
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        log::LevelFilter::Debug
    } else if let Some(level) = cli.log_level {
        level.to_level_filter()
    } else {
        // Default to Warn, Info for serve
        match cli.command {
            Commands::Serve { .. } => log::LevelFilter::Info,
            _ => log::LevelFilter::Warn,
        }
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Version => {
            println!("{} {}", "BoltGraph".bold().green(), boltgraph::VERSION);
            println!("Bolt {} / Neo4j {} compatible", "4.4-5.4", boltgraph::NEO4J_VERSION);
            Ok(())
        }

        Commands::Serve {
            database,
            bolt_listen,
            http_listen,
            no_http,
        } => {
            let config = cli::load_config(config_path, &database)?;
            cli::handle_serve(config, bolt_listen, http_listen, no_http)
        }

        Commands::Query {
            query,
            database,
            params,
            format,
        } => {
            let config = cli::load_config(config_path, &database)?;
            cli::handle_query(config, query, params, format)
        }

        Commands::Shell { database } => {
            let config = cli::load_config(config_path, &database)?;
            cli::handle_shell(config)
        }

        Commands::Constraints { database } => {
            let config = cli::load_config(config_path, &database)?;
            cli::handle_constraints(config)
        }
    }
}
