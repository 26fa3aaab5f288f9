//! SQLite persistence behind the memory gateway
//!
//! One pool, one idempotent schema, and a repository per table: turns,
//! task records, preferences, embedded snippets and profiles.

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::ConnectOptions;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

pub mod preferences;
pub mod profiles;
pub mod snippets;
pub mod task_records;
pub mod turns;

pub use preferences::{Preference, PreferenceRepository};
pub use profiles::{Profile, ProfileRepository};
pub use snippets::{Snippet, SnippetRepository};
pub use task_records::TaskRecordRepository;
pub use turns::{NewTurn, Turn, TurnRepository};

const SCHEMA: &str = include_str!("../../migrations/001_initial.sql");

/// Current time in Unix milliseconds
pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Handle to the memory store
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (or create) the store at `db_path` and apply the schema
    ///
    /// SQLite replays a leftover WAL on open, so an unclean shutdown needs no
    /// recovery step here.
    pub async fn new(db_path: &Path) -> Result<Self> {
        info!(path = %db_path.display(), "Opening memory store");

        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create database directory")?;
        }

        let connection_string = format!("sqlite:{}", db_path.display());
        let options = SqliteConnectOptions::from_str(&connection_string)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(std::time::Duration::from_secs(5))
            .disable_statement_logging();

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;

        let db = Self { pool };
        db.apply_schema().await?;
        Ok(db)
    }

    /// Every statement in the schema is `IF NOT EXISTS`, so this runs on each open
    async fn apply_schema(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .context("Failed to apply schema 001_initial.sql")?;

        debug!("Memory store schema applied");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Checkpoint the WAL into the main file
    pub async fn flush_wal(&self) -> Result<()> {
        sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
            .execute(&self.pool)
            .await
            .context("Failed to checkpoint WAL")?;
        Ok(())
    }

    /// Checkpoint and drain the pool
    pub async fn close(self) -> Result<()> {
        self.flush_wal().await?;
        self.pool.close().await;
        debug!("Memory store closed");
        Ok(())
    }

    pub fn turns(&self) -> TurnRepository {
        TurnRepository::new(self.pool.clone())
    }

    pub fn task_records(&self) -> TaskRecordRepository {
        TaskRecordRepository::new(self.pool.clone())
    }

    pub fn preferences(&self) -> PreferenceRepository {
        PreferenceRepository::new(self.pool.clone())
    }

    pub fn snippets(&self) -> SnippetRepository {
        SnippetRepository::new(self.pool.clone())
    }

    pub fn profiles(&self) -> ProfileRepository {
        ProfileRepository::new(self.pool.clone())
    }
}
