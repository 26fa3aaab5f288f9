//! Memory Gateway
//!
//! The single entry point to persisted state. The router, planner and
//! executor never touch the database directly; they go through
//! [`MemoryGateway`], which owns turns, task records, preferences and the
//! embedded snippets used for semantic retrieval.
//!
//! Writes are append or upsert only. A turn save is atomic: the turn row and
//! its auto-captured snippet commit together or not at all.
//!
//! Preferences and snippets are scoped to an owner, the conversation id that
//! wrote them. Searches and preference reads never return another owner's rows.

pub mod embedding;

use crate::conductor::types::TaskRecord;
use crate::config::{Config, EmbedderKind};
use crate::db::{
    now_millis, Database, NewTurn, Preference, PreferenceRepository, Snippet, SnippetRepository,
    TaskRecordRepository, Turn, TurnRepository,
};
use async_trait::async_trait;
use badi_sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{debug, warn};

pub use embedding::{cosine_similarity, Embedder, HashEmbedder, OllamaEmbedder};

/// Snippet source for auto-captured conversation turns
pub const SOURCE_CONVERSATION: &str = "conversation";
/// Snippet source mirroring a preference
pub const SOURCE_PREFERENCE: &str = "preference";
/// Snippet source for free-text notes
pub const SOURCE_NOTE: &str = "note";

/// A snippet returned by semantic search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnippetMatch {
    pub snippet_id: i64,
    pub source: String,
    pub content: String,
    pub similarity: f32,
    pub created_at: i64,
}

/// Uniform access to persisted memory
#[async_trait]
pub trait MemoryGateway: Send + Sync {
    /// Embed text with the gateway's embedder
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EngineError>;

    /// Persist one request/reply pair; its snippet is owned by the turn's conversation
    async fn save_turn(&self, turn: NewTurn) -> Result<Turn, EngineError>;

    /// Newest-first turns of one conversation
    async fn recent_turns(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<Turn>, EngineError>;

    /// At most `top_k` of `owner`'s snippets with similarity >= `min_similarity`,
    /// by descending similarity then most recent first
    async fn semantic_search(
        &self,
        owner: &str,
        query_embedding: &[f32],
        top_k: usize,
        min_similarity: f32,
    ) -> Result<Vec<SnippetMatch>, EngineError>;

    async fn save_task_record(&self, record: &TaskRecord) -> Result<(), EngineError>;

    async fn recent_task_records(&self, limit: usize) -> Result<Vec<TaskRecord>, EngineError>;

    async fn upsert_preference(&self, owner: &str, key: &str, value: &str) -> Result<(), EngineError>;

    async fn get_preference(&self, owner: &str, key: &str) -> Result<Option<Preference>, EngineError>;

    /// Store a free-text snippet; snippets are never required to be unique
    async fn add_snippet(&self, owner: &str, source: &str, content: &str) -> Result<i64, EngineError>;
}

/// Build the embedder selected in `[memory]`
pub fn build_embedder(config: &Config) -> Result<Arc<dyn Embedder>, EngineError> {
    match config.memory.embedder {
        EmbedderKind::Hash => Ok(Arc::new(HashEmbedder::new(config.memory.embedding_dims))),
        EmbedderKind::Ollama => {
            let embedder = OllamaEmbedder::new(
                &config.backends.ollama.base_url,
                &config.memory.embedding_model,
            )
            .map_err(|e| EngineError::Config(format!("Failed to build embedder: {}", e)))?;
            Ok(Arc::new(embedder))
        }
    }
}

/// Rank snippets against a query embedding
///
/// Snippets whose embedding length differs from the query (written by a
/// different embedder) are ignored.
pub fn rank_snippets(
    snippets: Vec<Snippet>,
    query_embedding: &[f32],
    top_k: usize,
    min_similarity: f32,
) -> Vec<SnippetMatch> {
    let mut matches: Vec<SnippetMatch> = snippets
        .into_iter()
        .filter(|s| s.embedding.len() == query_embedding.len())
        .map(|s| SnippetMatch {
            similarity: cosine_similarity(query_embedding, &s.embedding),
            snippet_id: s.id,
            source: s.source,
            content: s.content,
            created_at: s.created_at,
        })
        .filter(|m| m.similarity >= min_similarity)
        .collect();

    matches.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(Ordering::Equal)
            .then(b.created_at.cmp(&a.created_at))
            .then(b.snippet_id.cmp(&a.snippet_id))
    });
    matches.truncate(top_k);
    matches
}

fn gateway_error(err: anyhow::Error) -> EngineError {
    EngineError::MemoryGateway(format!("{:#}", err))
}

/// SQLite-backed gateway
pub struct SqliteMemoryGateway {
    pool: SqlitePool,
    turns: TurnRepository,
    task_records: TaskRecordRepository,
    preferences: PreferenceRepository,
    snippets: SnippetRepository,
    embedder: Arc<dyn Embedder>,
    auto_capture: bool,
}

impl SqliteMemoryGateway {
    pub fn new(db: &Database, embedder: Arc<dyn Embedder>, auto_capture: bool) -> Self {
        Self {
            pool: db.pool().clone(),
            turns: db.turns(),
            task_records: db.task_records(),
            preferences: db.preferences(),
            snippets: db.snippets(),
            embedder,
            auto_capture,
        }
    }

    /// Embedding for a snippet, or `None` when the embedder fails
    async fn try_embed(&self, text: &str) -> Option<Vec<f32>> {
        match self.embedder.embed(text).await {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(embedder = self.embedder.name(), error = %e, "Embedding failed, storing without snippet");
                None
            }
        }
    }
}

/// Text stored for an auto-captured turn
pub(crate) fn turn_snippet_text(request: &str, reply: &str) -> String {
    format!("User: {}\nAssistant: {}", request, reply)
}

#[async_trait]
impl MemoryGateway for SqliteMemoryGateway {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EngineError> {
        self.embedder
            .embed(text)
            .await
            .map_err(|e| EngineError::MemoryGateway(format!("embedding failed: {}", e)))
    }

    async fn save_turn(&self, turn: NewTurn) -> Result<Turn, EngineError> {
        let snippet = if self.auto_capture {
            let text = turn_snippet_text(&turn.request, &turn.reply);
            self.try_embed(&text).await.map(|embedding| (text, embedding))
        } else {
            None
        };

        let now = now_millis();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| EngineError::MemoryGateway(e.to_string()))?;

        let saved = TurnRepository::insert_on(&mut tx, &turn, now)
            .await
            .map_err(gateway_error)?;

        if let Some((text, embedding)) = snippet {
            SnippetRepository::insert_on(
                &mut tx,
                &turn.conversation_id,
                SOURCE_CONVERSATION,
                &text,
                &embedding,
                now,
            )
            .await
            .map_err(gateway_error)?;
        }

        tx.commit()
            .await
            .map_err(|e| EngineError::MemoryGateway(e.to_string()))?;

        debug!(conversation_id = %saved.conversation_id, turn_id = saved.id, "Turn saved");
        Ok(saved)
    }

    async fn recent_turns(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<Turn>, EngineError> {
        self.turns
            .recent(conversation_id, limit as i64)
            .await
            .map_err(gateway_error)
    }

    async fn semantic_search(
        &self,
        owner: &str,
        query_embedding: &[f32],
        top_k: usize,
        min_similarity: f32,
    ) -> Result<Vec<SnippetMatch>, EngineError> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let snippets = self.snippets.for_owner(owner).await.map_err(gateway_error)?;
        Ok(rank_snippets(snippets, query_embedding, top_k, min_similarity))
    }

    async fn save_task_record(&self, record: &TaskRecord) -> Result<(), EngineError> {
        self.task_records.insert(record).await.map_err(gateway_error)
    }

    async fn recent_task_records(&self, limit: usize) -> Result<Vec<TaskRecord>, EngineError> {
        self.task_records
            .recent(limit as i64)
            .await
            .map_err(gateway_error)
    }

    async fn upsert_preference(&self, owner: &str, key: &str, value: &str) -> Result<(), EngineError> {
        let text = format!("{}: {}", key, value);
        let embedding = self.try_embed(&text).await;

        let now = now_millis();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| EngineError::MemoryGateway(e.to_string()))?;

        PreferenceRepository::upsert_on(&mut tx, owner, key, value, now)
            .await
            .map_err(gateway_error)?;

        if let Some(embedding) = embedding {
            SnippetRepository::upsert_keyed_on(
                &mut tx,
                owner,
                SOURCE_PREFERENCE,
                key,
                &text,
                &embedding,
                now,
            )
            .await
            .map_err(gateway_error)?;
        }

        tx.commit()
            .await
            .map_err(|e| EngineError::MemoryGateway(e.to_string()))
    }

    async fn get_preference(&self, owner: &str, key: &str) -> Result<Option<Preference>, EngineError> {
        self.preferences.get(owner, key).await.map_err(gateway_error)
    }

    async fn add_snippet(&self, owner: &str, source: &str, content: &str) -> Result<i64, EngineError> {
        let embedding = self.embed(content).await?;
        self.snippets
            .insert(owner, source, content, &embedding)
            .await
            .map_err(gateway_error)
    }
}
