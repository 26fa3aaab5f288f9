use super::{
    request_error, status_error, Backend, BackendDescriptor, LLMError, Locality, Message,
    MessageRole, Result,
};
use crate::config::ProviderConfig;
use async_trait::async_trait;
use serde_json::json;

pub struct AnthropicBackend {
    descriptor: BackendDescriptor,
    base_url: String,
    model: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl AnthropicBackend {
    pub fn new(config: &ProviderConfig, api_key: Option<String>) -> Self {
        Self {
            descriptor: BackendDescriptor {
                name: "anthropic".to_string(),
                locality: Locality::Cloud,
                priority: config.priority,
            },
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            client: reqwest::Client::new(),
        }
    }

    /// System messages go in the top-level `system` field
    fn build_payload(&self, context: &[Message], prompt: &str) -> serde_json::Value {
        let mut system_prompt = String::new();
        let mut api_messages = Vec::new();
        for msg in context {
            if msg.role == MessageRole::System {
                system_prompt.push_str(&msg.content);
                system_prompt.push('\n');
                continue;
            }
            api_messages.push(json!({
                "role": if msg.role == MessageRole::Assistant { "assistant" } else { "user" },
                "content": msg.content
            }));
        }
        api_messages.push(json!({"role": "user", "content": prompt}));

        json!({
            "model": self.model,
            "max_tokens": 4096,
            "system": system_prompt.trim_end(),
            "messages": api_messages,
        })
    }
}

#[async_trait]
impl Backend for AnthropicBackend {
    fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }

    async fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    async fn complete(&self, context: &[Message], prompt: &str) -> Result<String> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            LLMError::AuthenticationFailed("Anthropic API key not set".to_string())
        })?;

        let url = format!("{}/messages", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&self.build_payload(context, prompt))
            .send()
            .await
            .map_err(|e| request_error("Anthropic", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(status_error("Anthropic", status, text));
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LLMError::ParseError(e.to_string()))?;

        let content_arr = data
            .get("content")
            .and_then(|c| c.as_array())
            .ok_or_else(|| LLMError::ParseError("No content array in response".to_string()))?;

        let full_content: String = content_arr
            .iter()
            .filter_map(|item| item.get("text").and_then(|t| t.as_str()))
            .collect();

        Ok(full_content)
    }
}
