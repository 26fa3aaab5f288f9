//! Embedded memory snippets
//!
//! Embeddings are stored as little-endian `f32` blobs. Snippets with a
//! `source_key` mirror a keyed record and are updated in place rather than duplicated
//! when that record changes.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snippet {
    pub id: i64,
    /// Conversation (profile) the snippet belongs to
    pub owner: String,
    /// Origin of the snippet: `conversation`, `preference` or `note`
    pub source: String,
    pub source_key: Option<String>,
    pub content: String,
    pub embedding: Vec<f32>,
    pub created_at: i64,
}

impl Snippet {
    fn from_row(row: &SqliteRow) -> Self {
        let blob: Vec<u8> = row.get("embedding");
        Self {
            id: row.get("id"),
            owner: row.get("owner"),
            source: row.get("source"),
            source_key: row.get("source_key"),
            content: row.get("content"),
            embedding: decode_embedding(&blob),
            created_at: row.get("created_at"),
        }
    }
}

pub fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub fn decode_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Snippet repository for database operations
pub struct SnippetRepository {
    pool: SqlitePool,
}

impl SnippetRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert_on(
        conn: &mut SqliteConnection,
        owner: &str,
        source: &str,
        content: &str,
        embedding: &[f32],
        created_at: i64,
    ) -> Result<i64> {
        let id = sqlx::query(
            "INSERT INTO snippets (owner, source, source_key, content, embedding, created_at)
             VALUES (?, ?, NULL, ?, ?, ?)",
        )
        .bind(owner)
        .bind(source)
        .bind(content)
        .bind(encode_embedding(embedding))
        .bind(created_at)
        .execute(&mut *conn)
        .await
        .context("Failed to insert snippet")?
        .last_insert_rowid();

        Ok(id)
    }

    /// Insert or update the snippet mirroring `(owner, source, source_key)`
    ///
    /// The row keeps its id across updates.
    pub async fn upsert_keyed_on(
        conn: &mut SqliteConnection,
        owner: &str,
        source: &str,
        source_key: &str,
        content: &str,
        embedding: &[f32],
        created_at: i64,
    ) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO snippets (owner, source, source_key, content, embedding, created_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(owner, source, source_key) DO UPDATE SET
                 content = excluded.content,
                 embedding = excluded.embedding,
                 created_at = excluded.created_at
             RETURNING id",
        )
        .bind(owner)
        .bind(source)
        .bind(source_key)
        .bind(content)
        .bind(encode_embedding(embedding))
        .bind(created_at)
        .fetch_one(&mut *conn)
        .await
        .context("Failed to upsert keyed snippet")?;

        Ok(id)
    }

    pub async fn insert(&self, owner: &str, source: &str, content: &str, embedding: &[f32]) -> Result<i64> {
        let mut conn = self.pool.acquire().await.context("Failed to acquire connection")?;
        Self::insert_on(&mut conn, owner, source, content, embedding, super::now_millis()).await
    }

    /// Every snippet of one owner; ranking happens in memory
    pub async fn for_owner(&self, owner: &str) -> Result<Vec<Snippet>> {
        let rows = sqlx::query(
            "SELECT id, owner, source, source_key, content, embedding, created_at
             FROM snippets WHERE owner = ?",
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await
        .context("Failed to load snippets")?;

        Ok(rows.iter().map(Snippet::from_row).collect())
    }

    pub async fn count(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM snippets")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count snippets")
    }
}
