//! Context Assembler
//!
//! Builds the per-request [`Context`]: the last N turns of the conversation
//! plus the top-K semantically similar memory snippets owned by that
//! conversation. Context is never persisted; it is rebuilt for every request.

use crate::db::Turn;
use crate::llm::Message;
use crate::memory::{turn_snippet_text, MemoryGateway, SnippetMatch};
use badi_sdk::errors::EngineError;
use std::sync::Arc;
use tracing::{debug, warn};

/// Prior turns and retrieved memories for one request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Context {
    /// Oldest first
    pub turns: Vec<Turn>,
    /// Most similar first
    pub snippets: Vec<SnippetMatch>,
}

impl Context {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty() && self.snippets.is_empty()
    }

    /// Render as backend messages: one system message carrying the
    /// instructions and memories, then the turns as user/assistant pairs
    pub fn to_messages(&self, system_instructions: &str) -> Vec<Message> {
        let mut system = String::from(system_instructions);

        if !self.snippets.is_empty() {
            system.push_str("\n\n--- Things you remember ---\n");
            for snippet in &self.snippets {
                system.push_str(&format!("- {}\n", snippet.content.replace('\n', " ")));
            }
        }

        let mut messages = vec![Message::system(system.trim_end())];
        for turn in &self.turns {
            messages.push(Message::user(&turn.request));
            messages.push(Message::assistant(&turn.reply));
        }
        messages
    }
}

pub struct ContextAssembler {
    memory: Arc<dyn MemoryGateway>,
    window: usize,
    top_k: usize,
    min_similarity: f32,
}

impl ContextAssembler {
    pub fn new(
        memory: Arc<dyn MemoryGateway>,
        window: usize,
        top_k: usize,
        min_similarity: f32,
    ) -> Self {
        Self {
            memory,
            window,
            top_k,
            min_similarity,
        }
    }

    /// Fetch recent turns and `conversation_id`'s snippets similar to `query`
    ///
    /// Each part degrades to empty on its own when the gateway fails, so a
    /// dead embedder still leaves the turn window in place.
    pub async fn assemble(&self, conversation_id: &str, query: &str) -> Context {
        let mut turns = match self.memory.recent_turns(conversation_id, self.window).await {
            Ok(turns) => turns,
            Err(e) => {
                warn!(conversation_id, error = %e, "Recent turns unavailable, continuing without them");
                Vec::new()
            }
        };
        turns.reverse();

        let mut snippets = match self.similar_snippets(conversation_id, query).await {
            Ok(snippets) => snippets,
            Err(e) => {
                warn!(conversation_id, error = %e, "Memory retrieval failed, continuing without snippets");
                Vec::new()
            }
        };

        // Auto-captured turns already in the window add nothing
        snippets.retain(|s| {
            !turns
                .iter()
                .any(|t| s.content == turn_snippet_text(&t.request, &t.reply))
        });

        debug!(
            conversation_id,
            turns = turns.len(),
            snippets = snippets.len(),
            "Context assembled"
        );
        Context { turns, snippets }
    }

    async fn similar_snippets(&self, owner: &str, query: &str) -> Result<Vec<SnippetMatch>, EngineError> {
        if self.top_k == 0 {
            return Ok(Vec::new());
        }
        let embedding = self.memory.embed(query).await?;
        self.memory
            .semantic_search(owner, &embedding, self.top_k, self.min_similarity)
            .await
    }
}
