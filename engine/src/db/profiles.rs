//! User profiles
//!
//! A profile gives a front end a stable identifier to use as the
//! conversation id across sessions.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub name: String,
    pub created_at: i64,
}

/// Profile repository for database operations
pub struct ProfileRepository {
    pool: SqlitePool,
}

impl ProfileRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get_by_name(&self, name: &str) -> Result<Option<Profile>> {
        let row = sqlx::query("SELECT id, name, created_at FROM profiles WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch profile")?;

        Ok(row.map(|r| Profile {
            id: r.get("id"),
            name: r.get("name"),
            created_at: r.get("created_at"),
        }))
    }

    pub async fn get_or_create(&self, name: &str) -> Result<Profile> {
        sqlx::query(
            "INSERT INTO profiles (id, name, created_at) VALUES (?, ?, ?)
             ON CONFLICT(name) DO NOTHING",
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(name)
        .bind(super::now_millis())
        .execute(&self.pool)
        .await
        .context("Failed to create profile")?;

        self.get_by_name(name)
            .await?
            .context("Profile missing after insert")
    }
}
