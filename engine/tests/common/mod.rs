//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use badi_engine::conductor::{CapabilityRef, Executor, Plan, Step};
use badi_engine::config::{ExecutorConfig, PolicyConfig};
use badi_engine::modules::CapabilityRegistry;
use badi_engine::policy::{ConfirmationHandler, PolicyGate};
use badi_sdk::{
    CapabilityInput, CapabilityModule, CapabilityOutput, CapabilitySpec, EngineError, ParamSpec,
    ParamType,
};
use serde_json::{json, Map, Value};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Start and end of one invocation, relative to module creation
#[derive(Debug, Clone, Copy)]
pub struct Span {
    pub start: Duration,
    pub end: Duration,
}

/// Module whose `work` capability sleeps, optionally fails, and records when
/// each labelled invocation ran
pub struct RecordingModule {
    specs: Vec<CapabilitySpec>,
    epoch: Instant,
    spans: Mutex<Vec<(String, Span)>>,
}

impl RecordingModule {
    pub fn new() -> Self {
        Self {
            specs: vec![
                CapabilitySpec::new("work", "Sleep, then succeed or fail")
                    .param(ParamSpec::required("label", ParamType::String, "Step label"))
                    .param(ParamSpec::with_default("ms", ParamType::Integer, json!(5), "Sleep"))
                    .param(ParamSpec::with_default("fail", ParamType::Bool, json!(false), "Fail")),
                CapabilitySpec::new("guarded", "Needs confirmation")
                    .param(ParamSpec::required("label", ParamType::String, "Step label"))
                    .requires_confirmation(),
            ],
            epoch: Instant::now(),
            spans: Mutex::new(Vec::new()),
        }
    }

    pub fn spans(&self) -> Vec<(String, Span)> {
        self.spans.lock().unwrap().clone()
    }

    pub fn span(&self, label: &str) -> Option<Span> {
        self.spans()
            .into_iter()
            .find(|(l, _)| l == label)
            .map(|(_, span)| span)
    }
}

#[async_trait]
impl CapabilityModule for RecordingModule {
    fn name(&self) -> &str {
        "rec"
    }

    fn description(&self) -> &str {
        "Records invocation timing"
    }

    fn capabilities(&self) -> &[CapabilitySpec] {
        &self.specs
    }

    async fn invoke(
        &self,
        capability: &str,
        input: CapabilityInput,
    ) -> Result<CapabilityOutput, EngineError> {
        let label = input.param_str("label")?;
        let start = self.epoch.elapsed();

        let ms = if capability == "work" { input.param_i64("ms")? } else { 1 };
        tokio::time::sleep(Duration::from_millis(ms.max(0) as u64)).await;
        let fail = capability == "work" && input.param_bool("fail")?;

        let end = self.epoch.elapsed();
        self.spans.lock().unwrap().push((label.clone(), Span { start, end }));

        if fail {
            Err(EngineError::Capability(format!("{} failed", label)))
        } else {
            Ok(CapabilityOutput::json(json!({ "label": label })))
        }
    }
}

/// Executor over a registry holding only `module`
pub fn executor(
    module: Arc<RecordingModule>,
    confirmation: Arc<dyn ConfirmationHandler>,
    step_timeout: Duration,
) -> Executor {
    let mut registry = CapabilityRegistry::new();
    registry.register(module).unwrap();
    let registry = Arc::new(registry);
    let policy = Arc::new(PolicyGate::new(&PolicyConfig::default(), registry.clone()).unwrap());
    let config = ExecutorConfig {
        max_concurrency: 8,
        ..ExecutorConfig::default()
    };
    Executor::new(registry, policy, confirmation, &config)
        .with_timeouts(step_timeout, Duration::from_millis(100))
}

/// `rec.work` step labelled with its id
pub fn work(id: &str, ms: u64, fail: bool) -> Step {
    let mut params = Map::new();
    params.insert("label".into(), Value::String(id.into()));
    params.insert("ms".into(), json!(ms));
    params.insert("fail".into(), json!(fail));
    Step::new(id, CapabilityRef::new("rec", "work"), params)
}

/// `rec.guarded` step labelled with its id
pub fn guarded(id: &str) -> Step {
    let mut params = Map::new();
    params.insert("label".into(), Value::String(id.into()));
    Step::new(id, CapabilityRef::new("rec", "guarded"), params)
}

pub fn plan(steps: Vec<Step>) -> Plan {
    Plan::new(steps, vec![]).unwrap()
}
