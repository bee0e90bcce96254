// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! CLI command handlers for BoltGraph

use colored::Colorize;
use rustyline::{error::ReadlineError, CompletionType, Config as EditorConfig, EditMode, Editor};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;

use super::commands::{DatabaseArgs, OutputFormat};
use super::output::ResultFormatter;
use boltgraph::bolt::{auth, BoltServer};
use boltgraph::http::HttpServer;
use boltgraph::{Config, GraphDatabase, PropertyMap, Value};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Load settings: file, environment, then command-line flags
pub fn load_config(path: Option<&Path>, database: &DatabaseArgs) -> CliResult<Config> {
    let mut config = Config::load(path)?;
    database.apply(&mut config);
    config.validate()?;
    Ok(config)
}

/// Handle the serve command
pub fn handle_serve(
    mut config: Config,
    bolt_listen: Option<String>,
    http_listen: Option<String>,
    no_http: bool,
) -> CliResult<()> {
    if let Some(addr) = bolt_listen {
        config.server.bolt_listen = addr;
    }
    if let Some(addr) = http_listen {
        config.server.http_listen = addr;
    }
    config.validate()?;

    let db = GraphDatabase::open(&config.database)?;
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(serve(db.clone(), &config, no_http))?;
    db.shutdown()?;
    println!("{}", "BoltGraph stopped".green());
    Ok(())
}

async fn serve(db: Arc<GraphDatabase>, config: &Config, no_http: bool) -> CliResult<()> {
    let (stop, shutdown) = watch::channel(false);

    let bolt = BoltServer::new(db.clone(), &config.server, auth::from_config(&config.server.auth));
    let bolt_task = tokio::spawn(bolt.run(config.server.bolt_addr()?, shutdown.clone()));
    println!(
        "{} Bolt on {}",
        "BoltGraph".bold().green(),
        config.server.bolt_listen.cyan()
    );

    let http_task = if no_http {
        None
    } else {
        let http = HttpServer::new(db.clone(), &config.server);
        println!(
            "{} HTTP on {}",
            "BoltGraph".bold().green(),
            config.server.http_listen.cyan()
        );
        Some(tokio::spawn(http.run(config.server.http_addr()?, shutdown)))
    };

    tokio::signal::ctrl_c().await?;
    println!("{}", "\nShutting down...".yellow());
    stop.send(true)?;

    bolt_task.await??;
    if let Some(task) = http_task {
        task.await??;
    }
    Ok(())
}

/// Handle the query command (one-off statement)
pub fn handle_query(
    config: Config,
    query: String,
    params: Vec<String>,
    format: OutputFormat,
) -> CliResult<()> {
    let params = parse_params(&params)?;
    let db = GraphDatabase::open(&config.database)?;
    let outcome = db.session().execute(&query, &params);
    db.shutdown()?;
    match outcome {
        Ok(result) => {
            println!("{}", ResultFormatter::format(&result, format));
            Ok(())
        }
        Err(e) => {
            eprintln!("{}", format!("Error: {}", e).red());
            Err(e.into())
        }
    }
}

/// Handle the constraints command
pub fn handle_constraints(config: Config) -> CliResult<()> {
    let db = GraphDatabase::open(&config.database)?;
    print!("{}", ResultFormatter::format_constraints(&db.constraints()));
    db.shutdown()?;
    Ok(())
}

/// Handle the shell (REPL) command
pub fn handle_shell(config: Config) -> CliResult<()> {
    let db = GraphDatabase::open(&config.database)?;
    let session = db.session();

    println!("{}", "BoltGraph".bold().green());
    println!("Type 'help' for commands, 'exit' or 'quit' to exit");
    println!("Multi-line statements supported - use ';' to terminate\n");
    println!("Database: {}", config.database.data_dir.display());

    let editor_config = EditorConfig::builder()
        .edit_mode(EditMode::Emacs)
        .history_ignore_space(true)
        .completion_type(CompletionType::List)
        .auto_add_history(false)
        .build();
    let mut rl = Editor::<(), _>::with_config(editor_config)?;

    let history_path = Path::new(".boltgraph").join("history.txt");
    if let Some(parent) = history_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let _ = rl.load_history(&history_path);

    let mut buffer = String::new();
    loop {
        let marker = if session.has_active_transaction() { "tx" } else { "cypher" };
        let prompt = if buffer.is_empty() {
            format!("{}> ", marker.cyan())
        } else {
            format!("{}> ", "...".cyan())
        };

        let line = match rl.readline(&prompt) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => {
                if !buffer.is_empty() {
                    buffer.clear();
                    println!("{}", "\nStatement buffer cleared".yellow());
                }
                continue;
            }
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                eprintln!("{}", format!("Error: {:?}", err).red());
                break;
            }
        };

        let trimmed = line.trim();
        if buffer.is_empty() {
            match trimmed.to_lowercase().as_str() {
                "exit" | "quit" => break,
                "help" => {
                    print_help();
                    continue;
                }
                "clear" => {
                    print!("\x1B[2J\x1B[1;1H");
                    continue;
                }
                "" => continue,
                _ => {}
            }
        }

        buffer.push_str(&line);
        buffer.push('\n');

        if trimmed.ends_with(';') {
            let statement = buffer.trim().trim_end_matches(';').trim().to_string();
            rl.add_history_entry(buffer.trim())?;
            match session.execute(&statement, &PropertyMap::new()) {
                Ok(result) => println!("{}", ResultFormatter::format(&result, OutputFormat::Table)),
                Err(e) => eprintln!("{}", format!("Error: {}", e).red()),
            }
            buffer.clear();
        }
    }

    if session.has_active_transaction() {
        println!("{}", "Open transaction rolled back".yellow());
    }
    session.reset();
    let _ = rl.save_history(&history_path);
    db.shutdown()?;
    println!("{}", "Goodbye!".green());
    Ok(())
}

/// Parse `name=json` pairs; values that are not JSON are taken as strings
fn parse_params(pairs: &[String]) -> CliResult<PropertyMap> {
    let mut params = PropertyMap::new();
    for pair in pairs {
        let (name, raw) = pair
            .split_once('=')
            .ok_or_else(|| format!("parameter '{}' is not NAME=VALUE", pair))?;
        let value = match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(json) => Value::from_json(&json),
            Err(_) => Value::String(raw.to_string()),
        };
        params.insert(name.trim().to_string(), value);
    }
    Ok(params)
}

fn print_help() {
    println!("{}", "Available commands:".bold().green());
    println!("  {}  - Show this help message", "help".cyan());
    println!("  {}  - Exit the console", "exit/quit".cyan());
    println!("  {}  - Clear the screen", "clear".cyan());
    println!("\n{}", "Statements:".bold().green());
    println!("  Terminate statements with semicolon (;)");
    println!("  BEGIN; ... COMMIT; groups statements into one transaction");
    println!("\n{}", "Examples:".bold().green());
    println!("  {}", "CREATE (p:Person {name: 'Alice'});".yellow());
    println!("  {}", "MATCH (p:Person) RETURN p.name;".yellow());
    println!(
        "  {}",
        "CREATE CONSTRAINT person_email FOR (p:Person) REQUIRE p.email IS UNIQUE;".yellow()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_params() {
        let params = parse_params(&[
            "n=42".to_string(),
            "name=Ann".to_string(),
            "tags=[\"a\",\"b\"]".to_string(),
        ])
        .unwrap();
        assert_eq!(params.get("n"), Some(&Value::Integer(42)));
        assert_eq!(params.get("name"), Some(&Value::from("Ann")));
        assert_eq!(
            params.get("tags"),
            Some(&Value::List(vec![Value::from("a"), Value::from("b")]))
        );
        assert!(parse_params(&["broken".to_string()]).is_err());
    }
}
