// Badi personal assistant
// Main entry point for the badi binary

use badi_engine::cli::{Cli, Command};
use badi_engine::config::Config;
use badi_engine::handlers::{handle_ask, handle_chat, handle_history, handle_info, OutputFormat};
use badi_engine::telemetry::{init_telemetry, init_telemetry_with_level};
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    // Load configuration (or use custom path if provided)
    let loaded = match &cli.config {
        Some(config_path) => Config::load_from_path(config_path),
        None => Config::load_or_create(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            init_telemetry();
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    // --log wins over the configured level; RUST_LOG wins over both
    let level = cli.log.as_deref().unwrap_or(&config.core.log_level);
    init_telemetry_with_level(level);

    tracing::info!(
        "Badi v{} ({} - {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_COMMIT_HASH"),
        env!("BUILD_TIMESTAMP")
    );

    match cli.command {
        Command::Chat { profile } => handle_chat(profile, &config, format).await,
        Command::Ask { text, profile, yes } => handle_ask(text, profile, yes, &config, format).await,
        Command::Info => handle_info(&config, format).await,
        Command::History { limit } => handle_history(limit, &config, format).await,
    }
}
