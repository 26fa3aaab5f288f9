//! CLI interface for Badi
//!
//! Defines the commands and global flags using clap's derive API. The CLI is
//! a thin front end: every request goes through the router.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Badi personal assistant
///
/// Answers questions and carries out tasks on your machine, remembering
/// what you tell it and using local or cloud language models.
#[derive(Parser, Debug)]
#[command(name = "badi")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start an interactive conversation
    Chat {
        /// Profile whose conversation to continue
        #[arg(short, long, default_value = "default")]
        profile: String,
    },

    /// Handle a single request and exit
    Ask {
        /// The request text
        text: String,

        /// Profile whose conversation to continue
        #[arg(short, long, default_value = "default")]
        profile: String,

        /// Approve every confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Show configuration, modules and backend availability
    Info,

    /// Show recent task records
    History {
        /// Number of records to show (default: 10)
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
}
