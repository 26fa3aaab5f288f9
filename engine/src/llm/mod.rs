//! Language-model backend abstraction
//!
//! Every provider (Ollama, OpenAI, Anthropic, Gemini) implements the same
//! [`Backend`] trait: an availability probe and a single `complete` call.
//! The [`selector::BackendSelector`] decides which backend serves a request
//! and handles fallback between them.

use crate::config::BackendsConfig;
use async_trait::async_trait;
use badi_sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

pub mod anthropic;
pub mod gemini;
pub mod ollama;
pub mod openai;
pub mod selector;

pub use selector::{BackendSelector, BackendStatus, Completion, TaskKind};

/// Result type for backend operations
pub type Result<T> = std::result::Result<T, LLMError>;

/// Errors that can occur during backend operations
#[derive(Debug, thiserror::Error)]
pub enum LLMError {
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Timeout")]
    Timeout,

    #[error("Parse error: {0}")]
    ParseError(String),
}

impl From<LLMError> for EngineError {
    fn from(err: LLMError) -> Self {
        EngineError::Backend(err.to_string())
    }
}

/// Map a non-success HTTP status to an error
pub(crate) fn status_error(provider: &str, status: reqwest::StatusCode, body: String) -> LLMError {
    match status.as_u16() {
        401 | 403 => LLMError::AuthenticationFailed(body),
        429 => LLMError::RateLimitExceeded,
        400 | 404 | 422 => LLMError::InvalidRequest(body),
        _ => LLMError::ProviderUnavailable(format!("{} API error ({}): {}", provider, status, body)),
    }
}

pub(crate) fn request_error(provider: &str, err: reqwest::Error) -> LLMError {
    if err.is_timeout() {
        LLMError::Timeout
    } else if err.is_connect() {
        LLMError::ProviderUnavailable(format!("Cannot connect to {}", provider))
    } else {
        LLMError::NetworkError(err.to_string())
    }
}

/// Message in a conversation history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }
}

/// Role of a message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::System => write!(f, "system"),
        }
    }
}

/// Where a backend runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locality {
    Local,
    Cloud,
}

impl fmt::Display for Locality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Locality::Local => "local",
            Locality::Cloud => "cloud",
        })
    }
}

/// Static description of a registered backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendDescriptor {
    pub name: String,
    pub locality: Locality,
    /// Lower values are tried first
    pub priority: u32,
}

/// A language-model backend
#[async_trait]
pub trait Backend: Send + Sync {
    fn descriptor(&self) -> &BackendDescriptor;

    /// Cheap readiness probe; must not generate text
    async fn is_available(&self) -> bool;

    /// Generate a reply to `prompt` given prior `context` messages
    async fn complete(&self, context: &[Message], prompt: &str) -> Result<String>;
}

/// Read an API key from the environment variable named by `var`
pub fn api_key_from_env(var: Option<&str>) -> Option<String> {
    var.and_then(|name| std::env::var(name).ok())
        .map(|key| key.trim().to_string())
        .filter(|key| !key.is_empty())
}

/// Build every enabled backend from configuration
pub fn build_backends(config: &BackendsConfig) -> Vec<Arc<dyn Backend>> {
    let mut backends: Vec<Arc<dyn Backend>> = Vec::new();

    if config.ollama.enabled {
        backends.push(Arc::new(ollama::OllamaBackend::new(&config.ollama)));
    }
    if config.openai.enabled {
        let key = api_key_from_env(config.openai.api_key_env.as_deref());
        backends.push(Arc::new(openai::OpenAIBackend::new(&config.openai, key)));
    }
    if config.anthropic.enabled {
        let key = api_key_from_env(config.anthropic.api_key_env.as_deref());
        backends.push(Arc::new(anthropic::AnthropicBackend::new(&config.anthropic, key)));
    }
    if config.gemini.enabled {
        let key = api_key_from_env(config.gemini.api_key_env.as_deref());
        backends.push(Arc::new(gemini::GeminiBackend::new(&config.gemini, key)));
    }

    backends
}

/// Extract the first JSON value (object or array) from model output
///
/// Handles:
/// 1. Raw JSON (the whole reply parses)
/// 2. Fenced JSON, with or without trailing prose
/// 3. JSON embedded in prose, found by bracket matching
pub fn extract_json(content: &str) -> Option<&str> {
    let trimmed = content.trim();

    if serde_json::from_str::<serde_json::Value>(trimmed).is_ok() {
        return Some(trimmed);
    }

    if let Some(inner) = extract_fenced_json(trimmed) {
        let inner = inner.trim();
        if serde_json::from_str::<serde_json::Value>(inner).is_ok() {
            return Some(inner);
        }
    }

    let start = trimmed.find(&['[', '{'][..])?;
    extract_balanced_json(&trimmed[start..])
}

/// Extract the body of the first markdown code fence in the text.
fn extract_fenced_json(content: &str) -> Option<&str> {
    let fence_start = content.find("```")?;
    let after_opening = &content[fence_start + 3..];

    // Skip the language tag line (e.g. "json\n")
    let body_start_rel = after_opening.find('\n')? + 1;
    let body_start = fence_start + 3 + body_start_rel;

    let closing = content[body_start..].find("```")?;
    let body_end = body_start + closing;

    if body_start >= body_end {
        return None;
    }

    Some(&content[body_start..body_end])
}

/// Extract a balanced JSON object or array starting at position 0 of `s`.
///
/// Counts bracket depth, respecting string literals, to find the matching
/// close bracket.
fn extract_balanced_json(s: &str) -> Option<&str> {
    let (open, close) = match s.chars().next()? {
        '{' => ('{', '}'),
        '[' => ('[', ']'),
        _ => return None,
    };
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            c if c == open && !in_string => depth += 1,
            c if c == close && !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}
