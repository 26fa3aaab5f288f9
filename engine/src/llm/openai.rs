use super::{
    request_error, status_error, Backend, BackendDescriptor, LLMError, Locality, Message, Result,
};
use crate::config::ProviderConfig;
use async_trait::async_trait;
use serde_json::json;

pub struct OpenAIBackend {
    descriptor: BackendDescriptor,
    base_url: String,
    model: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl OpenAIBackend {
    pub fn new(config: &ProviderConfig, api_key: Option<String>) -> Self {
        Self {
            descriptor: BackendDescriptor {
                name: "openai".to_string(),
                locality: Locality::Cloud,
                priority: config.priority,
            },
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Backend for OpenAIBackend {
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
            .ok_or_else(|| LLMError::AuthenticationFailed("OpenAI API key not set".to_string()))?;

        let url = format!("{}/chat/completions", self.base_url);

        let mut api_messages: Vec<_> = context
            .iter()
            .map(|msg| json!({"role": msg.role.to_string(), "content": msg.content}))
            .collect();
        api_messages.push(json!({"role": "user", "content": prompt}));

        let payload = json!({
            "model": self.model,
            "messages": api_messages,
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| request_error("OpenAI", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(status_error("OpenAI", status, text));
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LLMError::ParseError(e.to_string()))?;

        data.get("choices")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(|content| content.as_str())
            .map(String::from)
            .ok_or_else(|| LLMError::ParseError("No message content in response".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base_url: &str) -> ProviderConfig {
        ProviderConfig {
            enabled: true,
            base_url: base_url.to_string(),
            model: "gpt-4o-mini".to_string(),
            priority: 1,
            api_key_env: None,
        }
    }

    #[tokio::test]
    async fn test_available_only_with_key() {
        assert!(!OpenAIBackend::new(&config("http://x"), None).is_available().await);
        assert!(OpenAIBackend::new(&config("http://x"), Some("k".into())).is_available().await);
    }

    #[tokio::test]
    async fn test_complete_reads_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "Hi!"}}]
            })))
            .mount(&server)
            .await;

        let backend = OpenAIBackend::new(&config(&server.uri()), Some("sk-test".into()));
        let reply = backend.complete(&[Message::system("Be brief")], "Hello").await.unwrap();
        assert_eq!(reply, "Hi!");
    }

    #[tokio::test]
    async fn test_rate_limit_maps_to_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let backend = OpenAIBackend::new(&config(&server.uri()), Some("sk-test".into()));
        let err = backend.complete(&[], "Hello").await.unwrap_err();
        assert!(matches!(err, LLMError::RateLimitExceeded));
    }
}
