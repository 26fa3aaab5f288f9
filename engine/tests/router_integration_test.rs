//! Integration tests for the Request Router
//!
//! Drives whole requests through classification, memory, planning and
//! execution, with a mock Ollama server standing in for the model

use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::{
    matchers::{body_string_contains, method, path},
    Mock, MockServer, ResponseTemplate,
};

use badi_engine::agent::{IntentKind, Request, Router};
use badi_engine::conductor::{FailureReason, PlanStatus, StepStatus};
use badi_engine::config::{Config, Mode, ProviderConfig};
use badi_engine::db::Database;
use badi_engine::llm::ollama::OllamaBackend;
use badi_engine::llm::Backend;
use badi_engine::memory::{HashEmbedder, MemoryGateway, SqliteMemoryGateway};
use badi_engine::policy::{AutoApprove, AutoDeny, ConfirmationHandler};

struct Fixture {
    _data: TempDir,
    files: TempDir,
    memory: Arc<dyn MemoryGateway>,
    config: Config,
}

async fn fixture() -> Fixture {
    let data = TempDir::new().unwrap();
    let files = TempDir::new().unwrap();
    let db = Database::new(&data.path().join("badi.db")).await.unwrap();
    let memory: Arc<dyn MemoryGateway> =
        Arc::new(SqliteMemoryGateway::new(&db, Arc::new(HashEmbedder::new(128)), true));

    let mut config = Config::default();
    config.backends.mode = Mode::Local;
    config.backends.availability_ttl_secs = 0;
    config.policy.allowed_roots = vec![files.path().to_path_buf()];

    Fixture {
        _data: data,
        files,
        memory,
        config,
    }
}

async fn ollama(reply: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"models": []})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": {"role": "assistant", "content": reply},
            "done": true
        })))
        .mount(&server)
        .await;
    server
}

fn backend(server: &MockServer) -> Arc<dyn Backend> {
    Arc::new(OllamaBackend::new(&ProviderConfig {
        enabled: true,
        base_url: server.uri(),
        model: "test".to_string(),
        priority: 0,
        api_key_env: None,
    }))
}

fn router(f: &Fixture, backends: Vec<Arc<dyn Backend>>, confirm: Arc<dyn ConfirmationHandler>) -> Router {
    Router::from_config(&f.config, f.memory.clone(), backends, confirm).unwrap()
}

#[tokio::test]
async fn test_hello_is_a_direct_reply() {
    let f = fixture().await;
    let server = ollama("Hi there!").await;
    let router = router(&f, vec![backend(&server)], Arc::new(AutoApprove));

    let response = router.handle(&Request::new("Hello", "conv-1")).await;

    assert_eq!(response.intent.kind, IntentKind::Chat);
    assert_eq!(response.text, "Hi there!");
    assert!(response.failure_kind.is_none());
    assert!(response.task.is_none());

    let turns = f.memory.recent_turns("conv-1", 10).await.unwrap();
    assert_eq!(turns.len(), 1);
    assert_eq!(turns[0].request, "Hello");
    assert_eq!(turns[0].reply, "Hi there!");
    assert_eq!(turns[0].backend.as_deref(), Some("ollama"));
    assert!(f.memory.recent_task_records(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_previous_turns_are_sent_as_context() {
    let f = fixture().await;
    let server = ollama("Noted.").await;
    let router = router(&f, vec![backend(&server)], Arc::new(AutoApprove));

    router.handle(&Request::new("my favourite colour is teal", "conv-1")).await;

    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_string_contains("my favourite colour is teal"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": {"role": "assistant", "content": "Teal."},
            "done": true
        })))
        .with_priority(1)
        .mount(&server)
        .await;

    let response = router.handle(&Request::new("what colour do I like?", "conv-1")).await;
    assert_eq!(response.text, "Teal.");
    assert_eq!(f.memory.recent_turns("conv-1", 10).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_backend_planned_task_with_unknown_step() {
    let f = fixture().await;
    std::fs::write(f.files.path().join("notes.txt"), "hello").unwrap();
    let plan = json!([
        {"id": "scan", "capability": "system_control.scan_directory",
         "params": {"path": f.files.path()}, "depends_on": []},
        {"id": "fly", "capability": "drone.take_off", "params": {}, "depends_on": []}
    ])
    .to_string();
    let server = ollama(&plan).await;
    let router = router(&f, vec![backend(&server)], Arc::new(AutoApprove));

    let response = router
        .handle(&Request::new("find what is in my files folder", "conv-1"))
        .await;

    assert_eq!(response.intent.kind, IntentKind::Task);
    let record = response.task.expect("task record");
    assert_eq!(record.steps.len(), 1);
    assert_eq!(record.status, PlanStatus::Success);
    assert_eq!(record.warnings.len(), 1);
    assert!(response.text.contains("drone.take_off"));

    assert_eq!(f.memory.recent_task_records(10).await.unwrap().len(), 1);
    assert_eq!(f.memory.recent_turns("conv-1", 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_declined_organize_leaves_files_alone() {
    let f = fixture().await;
    std::fs::write(f.files.path().join("a.pdf"), "pdf").unwrap();
    let router = router(&f, vec![], Arc::new(AutoDeny));

    let text = format!("organize {}", f.files.path().display());
    let response = router.handle(&Request::new(text, "conv-1")).await;

    let record = response.task.expect("task record");
    assert_eq!(record.status, PlanStatus::Partial);
    let organize = record.results.iter().find(|r| r.step_id == "organize").unwrap();
    assert_eq!(organize.status, StepStatus::Skipped);
    assert_eq!(organize.reason, Some(FailureReason::Declined));
    assert!(f.files.path().join("a.pdf").exists());
}

#[tokio::test]
async fn test_path_outside_roots_is_policy_denied() {
    let f = fixture().await;
    let elsewhere = TempDir::new().unwrap();
    let router = router(&f, vec![], Arc::new(AutoApprove));

    let text = format!("scan {}", elsewhere.path().display());
    let response = router.handle(&Request::new(text, "conv-1")).await;

    let record = response.task.expect("task record");
    assert_eq!(record.status, PlanStatus::Failed);
    assert_eq!(record.results[0].reason, Some(FailureReason::PolicyDenied));
    assert!(response.text.contains("policy_denied"));
}

#[tokio::test]
async fn test_cyclic_plan_aborts_with_planning_error() {
    let f = fixture().await;
    let plan = json!([
        {"id": "a", "capability": "system_control.scan_directory", "params": {"path": "/tmp"}, "depends_on": ["b"]},
        {"id": "b", "capability": "system_control.scan_directory", "params": {"path": "/tmp"}, "depends_on": ["a"]}
    ])
    .to_string();
    let server = ollama(&plan).await;
    let router = router(&f, vec![backend(&server)], Arc::new(AutoApprove));

    let response = router.handle(&Request::new("find my tax forms", "conv-1")).await;

    assert_eq!(response.failure_kind.as_deref(), Some("planning_error"));
    assert!(response.text.contains("could not build a plan"));
    assert!(f.memory.recent_task_records(10).await.unwrap().is_empty());
    assert_eq!(f.memory.recent_turns("conv-1", 10).await.unwrap().len(), 1);
}
