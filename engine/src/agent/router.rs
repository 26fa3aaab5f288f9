//! Request Router
//!
//! Entry point for every utterance:
//!
//! 1. Classify intent (failures degrade to chat)
//! 2. Assemble context from memory (failures degrade to an empty context)
//! 3. Dispatch: chat goes straight to a backend, tasks go through the
//!    planner and executor
//! 4. Persist exactly one turn, plus a task record on the task path
//!
//! Only planning failures and total backend unavailability abort a request,
//! and even then the caller gets a plain-language message with the failure
//! kind rather than an error.

use badi_sdk::errors::{BadiErrorExt, EngineError};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::agent::intent::{BackendClassifier, HeuristicClassifier, Intent, IntentClassifier};
use crate::conductor::executor::{summarize, ExecutionReport, Executor};
use crate::conductor::{Context, ContextAssembler, Planner, TaskRecord};
use crate::config::{Config, IntentStrategy};
use crate::db::NewTurn;
use crate::llm::{Backend, BackendSelector, TaskKind};
use crate::memory::MemoryGateway;
use crate::modules::CapabilityRegistry;
use crate::policy::{ConfirmationHandler, Origin, PolicyGate};

const CHAT_INSTRUCTIONS: &str = "You are Badi, a concise personal assistant running on the \
user's own machine. Answer directly. Use what you remember about the user when it is relevant.";

const PLANNER_INSTRUCTIONS: &str = "You plan actions for a personal assistant. Use the \
conversation only to resolve references such as \"that folder\".";

/// Longest step payload excerpt sent to the summary backend
const SUMMARY_PAYLOAD_CHARS: usize = 2_000;

/// One user utterance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub text: String,
    pub conversation_id: String,
    pub origin: Origin,
    /// Unix milliseconds
    pub received_at: i64,
}

impl Request {
    pub fn new(text: impl Into<String>, conversation_id: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            conversation_id: conversation_id.into(),
            origin: Origin::Local,
            received_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = origin;
        self
    }
}

/// What the front end shows the user
#[derive(Debug, Clone, Serialize)]
pub struct Response {
    pub text: String,
    pub intent: Intent,
    /// Backend that produced the reply, if any
    pub backend: Option<String>,
    /// Set when the request was aborted
    pub failure_kind: Option<String>,
    /// Set on the task path once a plan ran
    pub task: Option<TaskRecord>,
}

impl Response {
    fn reply(intent: Intent, text: String, backend: Option<String>) -> Self {
        Self {
            text,
            intent,
            backend,
            failure_kind: None,
            task: None,
        }
    }

    fn aborted(intent: Intent, err: &EngineError) -> Self {
        Self {
            text: format!("{}. ({})", err.user_hint(), err.kind()),
            intent,
            backend: None,
            failure_kind: Some(err.kind().to_string()),
            task: None,
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.failure_kind.is_some()
    }
}

pub struct Router {
    classifier: Arc<dyn IntentClassifier>,
    assembler: ContextAssembler,
    selector: Arc<BackendSelector>,
    registry: Arc<CapabilityRegistry>,
    planner: Planner,
    executor: Executor,
    memory: Arc<dyn MemoryGateway>,
}

impl Router {
    /// Wire every component from configuration
    pub fn from_config(
        config: &Config,
        memory: Arc<dyn MemoryGateway>,
        backends: Vec<Arc<dyn Backend>>,
        confirmation: Arc<dyn ConfirmationHandler>,
    ) -> Result<Self, EngineError> {
        let selector = Arc::new(BackendSelector::new(backends, &config.backends));
        let registry = Arc::new(CapabilityRegistry::builtin(config, memory.clone())?);
        let policy = Arc::new(PolicyGate::new(&config.policy, registry.clone())?);

        let classifier: Arc<dyn IntentClassifier> = match config.intent.strategy {
            IntentStrategy::Heuristic => Arc::new(HeuristicClassifier::new()?),
            IntentStrategy::Backend => Arc::new(BackendClassifier::new(selector.clone())),
        };

        let assembler = ContextAssembler::new(
            memory.clone(),
            config.memory.context_window,
            config.memory.top_k,
            config.memory.similarity_threshold,
        );
        let planner = Planner::new(selector.clone(), registry.clone(), &config.planner)?;
        let executor = Executor::new(registry.clone(), policy, confirmation, &config.executor);

        info!(
            mode = %selector.mode(),
            capabilities = registry.capability_names().len(),
            "Router ready"
        );

        Ok(Self {
            classifier,
            assembler,
            selector,
            registry,
            planner,
            executor,
            memory,
        })
    }

    pub fn selector(&self) -> &Arc<BackendSelector> {
        &self.selector
    }

    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    pub async fn handle(&self, request: &Request) -> Response {
        self.handle_with_cancel(request, CancellationToken::new()).await
    }

    pub async fn handle_with_cancel(&self, request: &Request, cancel: CancellationToken) -> Response {
        let started = Instant::now();
        let conversation_id = request.conversation_id.as_str();
        info!(conversation_id, origin = ?request.origin, "Handling request");

        let intent = match self.classifier.classify(&request.text).await {
            Ok(intent) => intent,
            Err(e) => {
                warn!(conversation_id, error = %e, "Classification failed, treating as chat");
                Intent::unknown()
            }
        };

        let context = self.assembler.assemble(conversation_id, &request.text).await;

        let response = if intent.is_task() {
            self.handle_task(request, intent, &context, cancel).await
        } else {
            self.handle_chat(request, intent, &context).await
        };

        let turn = NewTurn {
            conversation_id: conversation_id.to_string(),
            request: request.text.clone(),
            reply: response.text.clone(),
            intent: intent.kind.as_str().to_string(),
            backend: response.backend.clone(),
        };
        if let Err(e) = self.memory.save_turn(turn).await {
            warn!(conversation_id, error = %e, "Failed to save turn");
        }

        info!(
            conversation_id,
            intent = %intent.kind,
            aborted = response.is_aborted(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Request handled"
        );
        response
    }

    async fn handle_chat(&self, request: &Request, intent: Intent, context: &Context) -> Response {
        let messages = context.to_messages(CHAT_INSTRUCTIONS);
        match self.selector.chat_complete(&messages, &request.text).await {
            Ok(completion) => Response::reply(intent, completion.text, Some(completion.backend)),
            Err(e) => {
                error!(conversation_id = %request.conversation_id, error = %e, "Chat aborted");
                Response::aborted(intent, &e)
            }
        }
    }

    async fn handle_task(
        &self,
        request: &Request,
        intent: Intent,
        context: &Context,
        cancel: CancellationToken,
    ) -> Response {
        let messages = context.to_messages(PLANNER_INSTRUCTIONS);
        let plan = match self.planner.plan(&request.text, &messages).await {
            Ok(plan) => plan.with_owner(&request.conversation_id),
            Err(e) => {
                error!(conversation_id = %request.conversation_id, error = %e, "Planning aborted");
                return Response::aborted(intent, &e);
            }
        };

        for warning in plan.warnings() {
            warn!(conversation_id = %request.conversation_id, "{}", warning);
        }

        let report = self.executor.execute(&plan, request.origin, cancel).await;
        let record = TaskRecord::new(&request.conversation_id, &request.text, &plan, report.results.clone());
        if let Err(e) = self.memory.save_task_record(&record).await {
            warn!(conversation_id = %request.conversation_id, error = %e, "Failed to save task record");
        }

        let (mut text, backend) = self.narrate(request, &report).await;
        if report.cancelled {
            text = format!("Cancelled. {}", text);
        }
        if !plan.warnings().is_empty() {
            text.push_str("\n\nNotes:");
            for warning in plan.warnings() {
                text.push_str(&format!("\n- {}", warning));
            }
        }

        Response {
            text,
            intent,
            backend,
            failure_kind: None,
            task: Some(record),
        }
    }

    /// Natural-language summary of a run; falls back to the plain summary
    /// when no backend can write one
    async fn narrate(&self, request: &Request, report: &ExecutionReport) -> (String, Option<String>) {
        let plain = summarize(report);
        if report.results.is_empty() {
            return (plain, None);
        }

        let mut payloads = String::new();
        for result in &report.results {
            if let Some(payload) = &result.payload {
                payloads.push_str(&format!("{}: {}\n", result.step_id, payload));
            }
        }
        let payloads: String = payloads.chars().take(SUMMARY_PAYLOAD_CHARS).collect();

        let prompt = format!(
            "The user asked: {}\n\nExecution report:\n{}\n\nStep output:\n{}\n\
             Tell the user what happened in two or three sentences. Mention any step that \
             failed or was skipped.",
            request.text, plain, payloads
        );

        match self.selector.complete(TaskKind::Summary, &[], &prompt).await {
            Ok(completion) if !completion.text.trim().is_empty() => {
                (format!("{}\n\n{}", completion.text.trim(), plain), Some(completion.backend))
            }
            Ok(_) => (plain, None),
            Err(e) => {
                debug!(error = %e, "No backend for summary, using plain summary");
                (plain, None)
            }
        }
    }
}
