//! Conversation turn persistence
//!
//! A turn is one request together with the reply it produced. Turns are
//! append-only; recency ordering uses `created_at` and then the row id so
//! turns written in the same millisecond keep their insertion order.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};

/// Turn about to be written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTurn {
    pub conversation_id: String,
    pub request: String,
    pub reply: String,
    pub intent: String,
    pub backend: Option<String>,
}

/// Stored turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub id: i64,
    pub conversation_id: String,
    pub request: String,
    pub reply: String,
    pub intent: String,
    pub backend: Option<String>,
    /// Unix milliseconds
    pub created_at: i64,
}

impl Turn {
    fn from_row(row: &SqliteRow) -> Self {
        Self {
            id: row.get("id"),
            conversation_id: row.get("conversation_id"),
            request: row.get("request"),
            reply: row.get("reply"),
            intent: row.get("intent"),
            backend: row.get("backend"),
            created_at: row.get("created_at"),
        }
    }
}

/// Turn repository for database operations
pub struct TurnRepository {
    pool: SqlitePool,
}

impl TurnRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a turn on an existing connection or transaction
    pub async fn insert_on(
        conn: &mut SqliteConnection,
        turn: &NewTurn,
        created_at: i64,
    ) -> Result<Turn> {
        let id = sqlx::query(
            "INSERT INTO turns (conversation_id, request, reply, intent, backend, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&turn.conversation_id)
        .bind(&turn.request)
        .bind(&turn.reply)
        .bind(&turn.intent)
        .bind(&turn.backend)
        .bind(created_at)
        .execute(&mut *conn)
        .await
        .context("Failed to insert turn")?
        .last_insert_rowid();

        Ok(Turn {
            id,
            conversation_id: turn.conversation_id.clone(),
            request: turn.request.clone(),
            reply: turn.reply.clone(),
            intent: turn.intent.clone(),
            backend: turn.backend.clone(),
            created_at,
        })
    }

    pub async fn insert(&self, turn: &NewTurn) -> Result<Turn> {
        let mut conn = self.pool.acquire().await.context("Failed to acquire connection")?;
        Self::insert_on(&mut conn, turn, super::now_millis()).await
    }

    /// Most recent turns of a conversation, newest first
    pub async fn recent(&self, conversation_id: &str, limit: i64) -> Result<Vec<Turn>> {
        let rows = sqlx::query(
            "SELECT id, conversation_id, request, reply, intent, backend, created_at
             FROM turns
             WHERE conversation_id = ?
             ORDER BY created_at DESC, id DESC
             LIMIT ?",
        )
        .bind(conversation_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch recent turns")?;

        Ok(rows.iter().map(Turn::from_row).collect())
    }

    pub async fn count(&self, conversation_id: &str) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM turns WHERE conversation_id = ?")
            .bind(conversation_id)
            .fetch_one(&self.pool)
            .await
            .context("Failed to count turns")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use tempfile::TempDir;

    fn new_turn(conversation: &str, request: &str) -> NewTurn {
        NewTurn {
            conversation_id: conversation.to_string(),
            request: request.to_string(),
            reply: format!("re: {}", request),
            intent: "chat".to_string(),
            backend: Some("ollama".to_string()),
        }
    }

    #[tokio::test]
    async fn test_recent_is_newest_first_and_scoped() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(&temp_dir.path().join("test.db")).await.unwrap();
        let repo = db.turns();

        for text in ["one", "two", "three"] {
            repo.insert(&new_turn("c1", text)).await.unwrap();
        }
        repo.insert(&new_turn("c2", "other")).await.unwrap();

        let recent = repo.recent("c1", 2).await.unwrap();
        let requests: Vec<_> = recent.iter().map(|t| t.request.as_str()).collect();
        assert_eq!(requests, vec!["three", "two"]);
        assert_eq!(repo.count("c1").await.unwrap(), 3);
        assert_eq!(repo.count("c2").await.unwrap(), 1);

        db.close().await.unwrap();
    }
}
