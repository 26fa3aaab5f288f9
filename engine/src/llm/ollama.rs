//! Ollama backend
//!
//! Ollama runs models on the user's machine, typically at
//! http://localhost:11434. No API key is needed; availability is a quick
//! `GET /api/tags` probe.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{
    request_error, status_error, Backend, BackendDescriptor, LLMError, Locality, Message, Result,
};
use crate::config::ProviderConfig;

/// Ollama backend configuration
#[derive(Debug, Clone)]
pub struct OllamaBackend {
    descriptor: BackendDescriptor,

    /// Base URL for Ollama API (typically http://localhost:11434)
    base_url: String,

    /// Model name to use (e.g., "llama3.1:8b")
    model: String,

    client: Client,
}

impl OllamaBackend {
    pub fn new(config: &ProviderConfig) -> Self {
        Self {
            descriptor: BackendDescriptor {
                name: "ollama".to_string(),
                locality: Locality::Local,
                priority: config.priority,
            },
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            client: Client::new(),
        }
    }

    fn convert_messages(context: &[Message], prompt: &str) -> Vec<OllamaMessage> {
        context
            .iter()
            .map(|msg| OllamaMessage {
                role: msg.role.to_string(),
                content: msg.content.clone(),
            })
            .chain(std::iter::once(OllamaMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }))
            .collect()
    }
}

#[async_trait]
impl Backend for OllamaBackend {
    fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }

    async fn is_available(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        match self
            .client
            .get(&url)
            .timeout(Duration::from_secs(2))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!("Ollama probe failed: {}", e);
                false
            }
        }
    }

    async fn complete(&self, context: &[Message], prompt: &str) -> Result<String> {
        let messages = Self::convert_messages(context, prompt);

        tracing::debug!(
            "Ollama request: model={}, messages={}, total_chars={}",
            self.model,
            messages.len(),
            messages.iter().map(|m| m.content.len()).sum::<usize>()
        );

        let request = OllamaRequest {
            model: self.model.clone(),
            messages,
            stream: false,
        };

        let url = format!("{}/api/chat", self.base_url);
        let start = std::time::Instant::now();
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| request_error("Ollama", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(status_error("Ollama", status, error_text));
        }

        let body: OllamaResponse = response
            .json()
            .await
            .map_err(|e| LLMError::ParseError(format!("Failed to parse Ollama response: {}", e)))?;

        tracing::debug!(
            "Ollama response received in {:.1}s",
            start.elapsed().as_secs_f64()
        );

        Ok(body.message.content)
    }
}

/// Ollama API request format
#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
}

/// Ollama message format
#[derive(Debug, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

/// Ollama API response format
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    message: OllamaMessage,
}
