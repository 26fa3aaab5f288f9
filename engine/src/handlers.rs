//! Command handlers for CLI operations
//!
//! - ask: handle one request and print the response
//! - chat: interactive loop over the same router
//! - info: configuration, modules and backend availability
//! - history: recent task records

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::json;
use std::io::{IsTerminal, Write};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::agent::{Request, Response, Router};
use crate::config::Config;
use crate::db::Database;
use crate::llm::{build_backends, BackendSelector};
use crate::memory::{build_embedder, MemoryGateway, SqliteMemoryGateway};
use crate::modules::CapabilityRegistry;
use crate::policy::{AutoApprove, AutoDeny, ConfirmationHandler};

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// Asks on the terminal before a step runs
pub struct StdinConfirmation;

#[async_trait]
impl ConfirmationHandler for StdinConfirmation {
    async fn confirm(&self, step_description: &str) -> bool {
        let question = format!("Allow {}? [y/N] ", step_description);
        let answer = tokio::task::spawn_blocking(move || {
            eprint!("{}", question);
            std::io::stderr().flush().ok();
            let mut line = String::new();
            std::io::stdin().read_line(&mut line).map(|_| line)
        })
        .await;

        match answer {
            Ok(Ok(line)) => matches!(line.trim().to_lowercase().as_str(), "y" | "yes"),
            _ => false,
        }
    }
}

/// Database and memory gateway for one command
async fn open_memory(config: &Config) -> Result<(Database, Arc<dyn MemoryGateway>)> {
    let database = Database::new(&config.database_path())
        .await
        .context("Failed to open database")?;
    let embedder = build_embedder(config)?;
    let memory: Arc<dyn MemoryGateway> = Arc::new(SqliteMemoryGateway::new(
        &database,
        embedder,
        config.memory.auto_capture,
    ));
    Ok((database, memory))
}

/// Terminal prompts when a user is present, refusal otherwise
fn confirmation_handler(assume_yes: bool) -> Arc<dyn ConfirmationHandler> {
    if assume_yes {
        Arc::new(AutoApprove)
    } else if std::io::stdin().is_terminal() {
        Arc::new(StdinConfirmation)
    } else {
        Arc::new(AutoDeny)
    }
}

/// Cancel `token` on Ctrl-C
fn cancel_on_ctrl_c(token: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling request");
            token.cancel();
        }
    })
}

fn print_response(response: &Response, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            println!("{}", response.text);
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(response)?);
        }
    }
    Ok(())
}

/// Handle a single request
pub async fn handle_ask(
    text: String,
    profile: String,
    assume_yes: bool,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let (database, memory) = open_memory(config).await?;
    let profile = database
        .profiles()
        .get_or_create(&profile)
        .await
        .context("Failed to load profile")?;

    let router = Router::from_config(
        config,
        memory,
        build_backends(&config.backends),
        confirmation_handler(assume_yes),
    )
    .context("Failed to initialise router")?;

    let cancel = CancellationToken::new();
    let watcher = cancel_on_ctrl_c(cancel.clone());
    let response = router
        .handle_with_cancel(&Request::new(text, profile.id), cancel)
        .await;
    watcher.abort();

    print_response(&response, format)?;
    database.close().await?;
    Ok(())
}

/// Interactive conversation until `exit`, `quit` or end of input
pub async fn handle_chat(profile: String, config: &Config, format: OutputFormat) -> Result<()> {
    let (database, memory) = open_memory(config).await?;
    let profile = database
        .profiles()
        .get_or_create(&profile)
        .await
        .context("Failed to load profile")?;

    let router = Router::from_config(
        config,
        memory,
        build_backends(&config.backends),
        confirmation_handler(false),
    )
    .context("Failed to initialise router")?;

    if matches!(format, OutputFormat::Text) {
        println!("Badi ({} mode). Type 'exit' to leave.", config.backends.mode);
    }

    loop {
        let line = tokio::task::spawn_blocking(|| {
            print!("> ");
            std::io::stdout().flush().ok();
            let mut line = String::new();
            std::io::stdin().read_line(&mut line).map(|read| (read, line))
        })
        .await
        .context("Input reader failed")?
        .context("Failed to read input")?;

        let (read, line) = line;
        if read == 0 {
            break;
        }
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if matches!(text, "exit" | "quit") {
            break;
        }

        let cancel = CancellationToken::new();
        let watcher = cancel_on_ctrl_c(cancel.clone());
        let response = router
            .handle_with_cancel(&Request::new(text, profile.id.clone()), cancel)
            .await;
        watcher.abort();

        print_response(&response, format)?;
    }

    database.close().await?;
    Ok(())
}

/// Show configuration, modules and backend availability
pub async fn handle_info(config: &Config, format: OutputFormat) -> Result<()> {
    let (database, memory) = open_memory(config).await?;
    let registry = CapabilityRegistry::builtin(config, memory).context("Failed to load modules")?;
    let selector = BackendSelector::new(build_backends(&config.backends), &config.backends);
    let backends = selector.list_available().await;

    match format {
        OutputFormat::Text => {
            println!("Badi v{}", env!("CARGO_PKG_VERSION"));
            println!("  Data directory: {}", config.core.data_dir.display());
            println!("  Mode:           {}", config.backends.mode);
            println!("  Intent:         {:?}", config.intent.strategy);
            println!();

            println!("Backends:");
            if backends.is_empty() {
                println!("  (none enabled)");
            }
            for backend in &backends {
                println!(
                    "  {:<10} {:<6} priority {:<3} {}",
                    backend.name,
                    backend.locality,
                    backend.priority,
                    if backend.available { "available" } else { "unavailable" }
                );
            }
            println!();

            println!("Modules:");
            for module in registry.modules() {
                println!("  {} - {}", module.name(), module.description());
                for spec in module.capabilities() {
                    let marker = if spec.requires_confirmation { " (confirm)" } else { "" };
                    println!("    {}{}", spec.signature(), marker);
                }
            }
        }
        OutputFormat::Json => {
            let modules: Vec<_> = registry
                .modules()
                .iter()
                .map(|m| {
                    json!({
                        "name": m.name(),
                        "description": m.description(),
                        "capabilities": m.capabilities(),
                    })
                })
                .collect();
            let output = json!({
                "version": env!("CARGO_PKG_VERSION"),
                "data_dir": config.core.data_dir,
                "mode": config.backends.mode.to_string(),
                "backends": backends,
                "modules": modules,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    database.close().await?;
    Ok(())
}

/// Show recent task records
pub async fn handle_history(limit: usize, config: &Config, format: OutputFormat) -> Result<()> {
    let (database, memory) = open_memory(config).await?;
    let records = memory
        .recent_task_records(limit)
        .await
        .context("Failed to fetch task history")?;

    match format {
        OutputFormat::Text => {
            if records.is_empty() {
                println!("No tasks in history");
            } else {
                println!("Task History (last {} tasks):", limit);
                println!();

                for record in &records {
                    let created = chrono::DateTime::from_timestamp_millis(record.created_at)
                        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
                        .unwrap_or_else(|| "Unknown".to_string());

                    println!("Task {}", record.id);
                    println!("  Request: {}", record.request);
                    println!("  Status:  {}", record.status);
                    println!("  Created: {}", created);
                    for result in &record.results {
                        match result.reason {
                            Some(reason) => println!(
                                "    {} {} [{}]",
                                result.step_id, result.capability, reason
                            ),
                            None => println!("    {} {} ok", result.step_id, result.capability),
                        }
                    }
                    println!();
                }
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "tasks": records,
                "count": records.len(),
                "limit": limit
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    database.close().await?;
    Ok(())
}
