//! Memory tools module
//!
//! Lets plans store and recall preferences and notes. Everything goes
//! through the [`MemoryGateway`]; this module never touches the database.
//! Each call acts on the owner the executor attached to the invocation.

use async_trait::async_trait;
use badi_sdk::{
    CapabilityInput, CapabilityModule, CapabilityOutput, CapabilitySpec, EngineError, ParamSpec,
    ParamType,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use crate::memory::{MemoryGateway, SOURCE_NOTE};

pub struct MemoryToolsModule {
    memory: Arc<dyn MemoryGateway>,
    min_similarity: f32,
    specs: Vec<CapabilitySpec>,
}

impl MemoryToolsModule {
    pub fn new(memory: Arc<dyn MemoryGateway>, min_similarity: f32) -> Self {
        let specs = vec![
            CapabilitySpec::new("remember_preference", "Remember a user preference")
                .param(ParamSpec::required("key", ParamType::String, "Preference name"))
                .param(ParamSpec::required("value", ParamType::String, "Preference value")),
            CapabilitySpec::new("get_preference", "Recall a stored preference")
                .param(ParamSpec::required("key", ParamType::String, "Preference name"))
                .read_only(),
            CapabilitySpec::new("search_memory", "Find stored memories related to a query")
                .param(ParamSpec::required("query", ParamType::String, "What to look for"))
                .param(ParamSpec::with_default(
                    "top_k",
                    ParamType::Integer,
                    json!(5),
                    "Maximum results",
                ))
                .read_only(),
            CapabilitySpec::new("log_message", "Keep a free-text note")
                .param(ParamSpec::required("message", ParamType::String, "Note to keep")),
        ];

        Self {
            memory,
            min_similarity,
            specs,
        }
    }

    async fn remember_preference(&self, input: &CapabilityInput) -> Result<Value, EngineError> {
        let owner = owner_of(input)?;
        let key = input.param_str("key")?;
        let value = input.param_str("value")?;
        self.memory.upsert_preference(owner, &key, &value).await?;
        info!("Preference '{}' saved", key);
        Ok(json!({
            "key": key,
            "value": value,
            "message": format!("Preference '{}' saved", key),
        }))
    }

    async fn get_preference(&self, input: &CapabilityInput) -> Result<Value, EngineError> {
        let owner = owner_of(input)?;
        let key = input.param_str("key")?;
        match self.memory.get_preference(owner, &key).await? {
            Some(pref) => Ok(json!({"key": pref.key, "value": pref.value})),
            None => Err(EngineError::Capability(format!(
                "preference '{}' not found",
                key
            ))),
        }
    }

    async fn search_memory(&self, input: &CapabilityInput) -> Result<Value, EngineError> {
        let owner = owner_of(input)?;
        let query = input.param_str("query")?;
        let top_k = input.param_i64("top_k")?.max(0) as usize;
        let embedding = self.memory.embed(&query).await?;
        let matches = self
            .memory
            .semantic_search(owner, &embedding, top_k, self.min_similarity)
            .await?;
        Ok(json!({
            "query": query,
            "count": matches.len(),
            "matches": matches,
        }))
    }

    async fn log_message(&self, input: &CapabilityInput) -> Result<Value, EngineError> {
        let owner = owner_of(input)?;
        let message = input.param_str("message")?;
        let id = self.memory.add_snippet(owner, SOURCE_NOTE, &message).await?;
        info!(snippet_id = id, "Note logged");
        Ok(json!({"message": message, "logged": true, "id": id}))
    }
}

/// Memory calls without an owner would have no scope to act in
fn owner_of(input: &CapabilityInput) -> Result<&str, EngineError> {
    input
        .owner
        .as_deref()
        .ok_or_else(|| EngineError::Capability("no memory owner for this invocation".into()))
}

#[async_trait]
impl CapabilityModule for MemoryToolsModule {
    fn name(&self) -> &str {
        "memory_tools"
    }

    fn description(&self) -> &str {
        "Store and recall user preferences and notes"
    }

    fn capabilities(&self) -> &[CapabilitySpec] {
        &self.specs
    }

    async fn invoke(
        &self,
        capability: &str,
        input: CapabilityInput,
    ) -> Result<CapabilityOutput, EngineError> {
        let data = match capability {
            "remember_preference" => self.remember_preference(&input).await?,
            "get_preference" => self.get_preference(&input).await?,
            "search_memory" => self.search_memory(&input).await?,
            "log_message" => self.log_message(&input).await?,
            other => return Err(EngineError::UnknownCapability(format!("memory_tools.{}", other))),
        };
        Ok(CapabilityOutput::json(data))
    }
}
