use super::{
    request_error, status_error, Backend, BackendDescriptor, LLMError, Locality, Message,
    MessageRole, Result,
};
use crate::config::ProviderConfig;
use async_trait::async_trait;
use serde_json::json;

pub struct GeminiBackend {
    descriptor: BackendDescriptor,
    base_url: String,
    model: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl GeminiBackend {
    pub fn new(config: &ProviderConfig, api_key: Option<String>) -> Self {
        Self {
            descriptor: BackendDescriptor {
                name: "gemini".to_string(),
                locality: Locality::Cloud,
                priority: config.priority,
            },
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            client: reqwest::Client::new(),
        }
    }

    fn build_payload(context: &[Message], prompt: &str) -> serde_json::Value {
        let mut contents = Vec::new();
        let mut system_parts = Vec::new();

        for msg in context {
            if msg.role == MessageRole::System {
                system_parts.push(json!({"text": msg.content}));
                continue;
            }
            contents.push(json!({
                "role": if msg.role == MessageRole::Assistant { "model" } else { "user" },
                "parts": [{"text": msg.content}]
            }));
        }
        contents.push(json!({"role": "user", "parts": [{"text": prompt}]}));

        let mut payload = serde_json::Map::new();
        payload.insert("contents".to_string(), json!(contents));
        if !system_parts.is_empty() {
            payload.insert(
                "systemInstruction".to_string(),
                json!({"parts": system_parts}),
            );
        }
        serde_json::Value::Object(payload)
    }
}

#[async_trait]
impl Backend for GeminiBackend {
    fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }

    async fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    async fn complete(&self, context: &[Message], prompt: &str) -> Result<String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| LLMError::AuthenticationFailed("Gemini API key not set".to_string()))?;

        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&Self::build_payload(context, prompt))
            .send()
            .await
            .map_err(|e| request_error("Gemini", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(status_error("Gemini", status, text));
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LLMError::ParseError(e.to_string()))?;

        let parts = data
            .get("candidates")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .and_then(|candidate| candidate.get("content"))
            .and_then(|content| content.get("parts"))
            .and_then(|p| p.as_array())
            .ok_or_else(|| LLMError::ParseError("No candidate parts in response".to_string()))?;

        Ok(parts
            .iter()
            .filter_map(|part| part.get("text").and_then(|t| t.as_str()))
            .collect())
    }
}
