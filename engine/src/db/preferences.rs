//! Preference persistence (upsert by owner and key)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preference {
    pub owner: String,
    pub key: String,
    pub value: String,
    pub updated_at: i64,
}

impl Preference {
    fn from_row(row: &SqliteRow) -> Self {
        Self {
            owner: row.get("owner"),
            key: row.get("key"),
            value: row.get("value"),
            updated_at: row.get("updated_at"),
        }
    }
}

/// Preference repository for database operations
pub struct PreferenceRepository {
    pool: SqlitePool,
}

impl PreferenceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn upsert_on(
        conn: &mut SqliteConnection,
        owner: &str,
        key: &str,
        value: &str,
        updated_at: i64,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO preferences (owner, key, value, updated_at) VALUES (?, ?, ?, ?)
             ON CONFLICT(owner, key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(owner)
        .bind(key)
        .bind(value)
        .bind(updated_at)
        .execute(&mut *conn)
        .await
        .context("Failed to upsert preference")?;

        Ok(())
    }

    pub async fn upsert(&self, owner: &str, key: &str, value: &str) -> Result<()> {
        let mut conn = self.pool.acquire().await.context("Failed to acquire connection")?;
        Self::upsert_on(&mut conn, owner, key, value, super::now_millis()).await
    }

    pub async fn get(&self, owner: &str, key: &str) -> Result<Option<Preference>> {
        let row = sqlx::query(
            "SELECT owner, key, value, updated_at FROM preferences WHERE owner = ? AND key = ?",
        )
        .bind(owner)
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch preference")?;

        Ok(row.as_ref().map(Preference::from_row))
    }

    pub async fn list(&self, owner: &str) -> Result<Vec<Preference>> {
        let rows = sqlx::query(
            "SELECT owner, key, value, updated_at FROM preferences WHERE owner = ? ORDER BY key",
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list preferences")?;

        Ok(rows.iter().map(Preference::from_row).collect())
    }
}
