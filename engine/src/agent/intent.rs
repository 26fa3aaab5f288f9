//! Intent classification
//!
//! Decides whether a request is conversation or a task to plan and execute.
//! Two strategies: a local keyword heuristic, and a backend-assisted
//! classifier that asks a model for a one-word label.

use async_trait::async_trait;
use badi_sdk::errors::EngineError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::llm::{BackendSelector, TaskKind};

/// What a request is asking for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    Chat,
    Task,
    Unknown,
}

impl IntentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Task => "task",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for IntentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified intent with a confidence in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub kind: IntentKind,
    pub confidence: f32,
}

impl Intent {
    pub fn new(kind: IntentKind, confidence: f32) -> Self {
        Self {
            kind,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    pub fn unknown() -> Self {
        Self::new(IntentKind::Unknown, 0.0)
    }

    /// `Unknown` is handled as chat
    pub fn is_task(&self) -> bool {
        self.kind == IntentKind::Task
    }
}

#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn classify(&self, request: &str) -> Result<Intent, EngineError>;
}

const TASK_VERBS: &[&str] = &[
    "organize", "organise", "move", "scan", "find", "create", "delete", "search", "archive",
    "remember", "clean", "list", "sort",
];

/// Keyword classifier: task verbs on word boundaries
pub struct HeuristicClassifier {
    verbs: Regex,
    leading_verb: Regex,
    path_hint: Regex,
}

impl HeuristicClassifier {
    pub fn new() -> Result<Self, EngineError> {
        let alternation = TASK_VERBS.join("|");
        let compile = |pattern: &str| {
            Regex::new(pattern)
                .map_err(|e| EngineError::Config(format!("invalid intent pattern: {}", e)))
        };

        Ok(Self {
            verbs: compile(&format!(r"(?i)\b({})\b", alternation))?,
            leading_verb: compile(&format!(r"(?i)^\s*(please\s+)?({})\b", alternation))?,
            path_hint: compile(r"(^|\s)(~|\.{1,2})?/\S*")?,
        })
    }

    pub fn classify_text(&self, request: &str) -> Intent {
        let text = request.trim();
        if text.is_empty() {
            return Intent::unknown();
        }

        if self.verbs.is_match(text) {
            let mut confidence: f32 = if self.leading_verb.is_match(text) { 0.9 } else { 0.7 };
            if self.path_hint.is_match(text) {
                confidence += 0.1;
            }
            Intent::new(IntentKind::Task, confidence)
        } else {
            Intent::new(IntentKind::Chat, 0.8)
        }
    }
}

#[async_trait]
impl IntentClassifier for HeuristicClassifier {
    async fn classify(&self, request: &str) -> Result<Intent, EngineError> {
        let intent = self.classify_text(request);
        debug!(intent = %intent.kind, confidence = intent.confidence, "Heuristic classification");
        Ok(intent)
    }
}

/// Asks a backend for a one-word label
pub struct BackendClassifier {
    selector: Arc<BackendSelector>,
}

impl BackendClassifier {
    pub fn new(selector: Arc<BackendSelector>) -> Self {
        Self { selector }
    }

    fn prompt(request: &str) -> String {
        format!(
            "Classify the user's message. Answer with exactly one word:\n\
             - task: they want an action performed (files, reminders, searches, preferences)\n\
             - chat: anything else (questions, greetings, conversation)\n\n\
             Message: {}",
            request
        )
    }

    /// Parse a model's label, tolerating case, quotes and trailing punctuation
    pub fn parse_label(answer: &str) -> Result<IntentKind, EngineError> {
        let word = answer
            .split_whitespace()
            .next()
            .unwrap_or("")
            .trim_matches(|c: char| !c.is_alphanumeric())
            .to_lowercase();

        match word.as_str() {
            "task" => Ok(IntentKind::Task),
            "chat" => Ok(IntentKind::Chat),
            _ => Err(EngineError::Classification(format!(
                "unexpected label '{}'",
                answer.trim()
            ))),
        }
    }
}

#[async_trait]
impl IntentClassifier for BackendClassifier {
    async fn classify(&self, request: &str) -> Result<Intent, EngineError> {
        let completion = self
            .selector
            .complete(TaskKind::Classification, &[], &Self::prompt(request))
            .await
            .map_err(|e| EngineError::Classification(e.to_string()))?;

        let kind = Self::parse_label(&completion.text)?;
        debug!(intent = %kind, backend = %completion.backend, "Backend classification");
        Ok(Intent::new(kind, 0.9))
    }
}
