//! Conductor Planner
//!
//! Turns a task request into a [`Plan`] of capability invocations.
//!
//! Recognised phrasings ("remember that my X is Y", "scan ~/Downloads",
//! "organize ~/Downloads", "archive files older than 30 days in ~/Downloads")
//! are planned by rule without a backend call. Anything else is sent to a
//! backend together with the capability catalog, and the JSON step list it
//! returns is checked against the registry.
//!
//! Steps naming an unknown capability are dropped with a warning, as are
//! steps that depend on a dropped step. Structural problems (cycles,
//! duplicate ids, dependencies on ids that do not exist) reject the whole
//! plan.

use crate::conductor::types::{CapabilityRef, Plan, PlanningError, Step};
use crate::config::PlannerConfig;
use crate::llm::{extract_json, BackendSelector, Message};
use crate::modules::CapabilityRegistry;
use badi_sdk::errors::EngineError;
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct Planner {
    selector: Arc<BackendSelector>,
    registry: Arc<CapabilityRegistry>,
    max_steps: usize,
    rules: PlanRules,
}

/// One step as proposed by the decomposition source
#[derive(Debug, Clone, Deserialize)]
pub struct RawStep {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(alias = "module")]
    pub capability: String,
    #[serde(default)]
    pub params: Map<String, Value>,
    #[serde(default)]
    pub depends_on: Vec<Value>,
}

impl RawStep {
    fn new(id: &str, capability: &str, params: Value) -> Self {
        Self {
            id: Some(Value::String(id.to_string())),
            capability: capability.to_string(),
            params: params.as_object().cloned().unwrap_or_default(),
            depends_on: Vec::new(),
        }
    }

    fn after(mut self, id: &str) -> Self {
        self.depends_on.push(Value::String(id.to_string()));
        self
    }
}

/// Backends answer either with a bare array or `{"steps": [...]}`
#[derive(Deserialize)]
#[serde(untagged)]
enum RawPlan {
    Steps(Vec<RawStep>),
    Wrapped { steps: Vec<RawStep> },
}

/// Render an id that may arrive as a string or a number
fn id_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl Planner {
    pub fn new(
        selector: Arc<BackendSelector>,
        registry: Arc<CapabilityRegistry>,
        config: &PlannerConfig,
    ) -> Result<Self, EngineError> {
        Ok(Self {
            selector,
            registry,
            max_steps: config.max_steps,
            rules: PlanRules::new()?,
        })
    }

    /// Plan a task request
    ///
    /// Rule matches never touch a backend. Backend unavailability surfaces as
    /// `NoBackendAvailable`; structural problems as `Planning`.
    pub async fn plan(&self, request: &str, context: &[Message]) -> Result<Plan, EngineError> {
        if let Some(raw) = self.rules.match_request(request) {
            info!("Planned by rule ({} steps)", raw.len());
            return Ok(self.build(raw)?);
        }

        let prompt = self.decomposition_prompt(request);
        let completion = self.selector.generate_plan(context, &prompt).await?;
        debug!(backend = %completion.backend, "Planner response received");

        let raw = parse_steps(&completion.text)?;
        Ok(self.build(raw)?)
    }

    fn decomposition_prompt(&self, request: &str) -> String {
        format!(
            "Break the user's task into capability calls.\n\n\
            Available capabilities (use these exact names; `?` marks optional parameters):\n\
            {catalog}\n\n\
            Output ONLY a JSON array. Each element must have:\n\
            - \"id\": short unique string\n\
            - \"capability\": \"module.capability\" from the list above\n\
            - \"params\": object of parameters\n\
            - \"depends_on\": array of ids that must finish first (empty if none)\n\n\
            Example:\n\
            [{{\"id\":\"scan\",\"capability\":\"system_control.scan_directory\",\"params\":{{\"path\":\"~/Downloads\"}},\"depends_on\":[]}}]\n\n\
            Task: {request}",
            catalog = self.registry.describe_for_prompt(),
            request = request
        )
    }

    /// Validate raw steps into a plan
    pub fn build(&self, raw: Vec<RawStep>) -> Result<Plan, PlanningError> {
        if raw.len() > self.max_steps {
            return Err(PlanningError::TooManySteps {
                count: raw.len(),
                max: self.max_steps,
            });
        }

        let ids: Vec<String> = raw
            .iter()
            .enumerate()
            .map(|(i, step)| {
                step.id
                    .as_ref()
                    .map(id_text)
                    .unwrap_or_else(|| format!("step_{}", i + 1))
            })
            .collect();

        let mut index_of = HashMap::new();
        for (i, id) in ids.iter().enumerate() {
            if index_of.insert(id.as_str(), i).is_some() {
                return Err(PlanningError::DuplicateStepId(id.clone()));
            }
        }

        let mut deps: Vec<BTreeSet<usize>> = Vec::with_capacity(raw.len());
        for (i, step) in raw.iter().enumerate() {
            let mut set = BTreeSet::new();
            for dep in &step.depends_on {
                let dep_id = id_text(dep);
                let Some(&target) = index_of.get(dep_id.as_str()) else {
                    return Err(PlanningError::UnresolvedDependency {
                        step: ids[i].clone(),
                        dependency: dep_id,
                    });
                };
                set.insert(target);
            }
            deps.push(set);
        }

        // Structure is checked on the full proposal so a cycle through a
        // dropped step still rejects the plan
        let capabilities: Vec<Option<CapabilityRef>> = raw
            .iter()
            .map(|step| step.capability.parse::<CapabilityRef>().ok())
            .collect();
        let full: Vec<Step> = raw
            .iter()
            .enumerate()
            .map(|(i, step)| Step {
                id: ids[i].clone(),
                capability: capabilities[i]
                    .clone()
                    .unwrap_or_else(|| CapabilityRef::new("", step.capability.as_str())),
                params: step.params.clone(),
                depends_on: deps[i].clone(),
            })
            .collect();
        Plan::new(full.clone(), Vec::new())?;

        let mut warnings = Vec::new();
        let mut dropped = vec![false; raw.len()];
        for (i, capability) in capabilities.iter().enumerate() {
            let known = capability
                .as_ref()
                .is_some_and(|c| self.registry.contains(c));
            if !known {
                warn!(step = %ids[i], capability = %raw[i].capability, "Dropping step with unknown capability");
                warnings.push(format!(
                    "dropped step '{}': unknown capability '{}'",
                    ids[i], raw[i].capability
                ));
                dropped[i] = true;
            }
        }

        // Dependencies may point forward, so cascade until nothing changes
        let mut changed = true;
        while changed {
            changed = false;
            for i in 0..full.len() {
                if !dropped[i] && deps[i].iter().any(|&d| dropped[d]) {
                    warn!(step = %ids[i], "Dropping step that depends on a dropped step");
                    warnings.push(format!(
                        "dropped step '{}': depends on a dropped step",
                        ids[i]
                    ));
                    dropped[i] = true;
                    changed = true;
                }
            }
        }

        let mut new_index = vec![usize::MAX; full.len()];
        let mut kept = Vec::new();
        for (i, step) in full.into_iter().enumerate() {
            if !dropped[i] {
                new_index[i] = kept.len();
                kept.push(step);
            }
        }
        for step in &mut kept {
            step.depends_on = step.depends_on.iter().map(|&d| new_index[d]).collect();
        }

        if kept.is_empty() {
            return Ok(Plan::empty(warnings));
        }
        Plan::new(kept, warnings)
    }
}

/// Parse a backend reply into raw steps
pub fn parse_steps(content: &str) -> Result<Vec<RawStep>, PlanningError> {
    let json_str = extract_json(content)
        .ok_or_else(|| PlanningError::InvalidResponse("no JSON found".to_string()))?;

    match serde_json::from_str::<RawPlan>(json_str) {
        Ok(RawPlan::Steps(steps)) | Ok(RawPlan::Wrapped { steps }) => Ok(steps),
        Err(e) => Err(PlanningError::InvalidResponse(e.to_string())),
    }
}

/// Phrasings planned without a backend
struct PlanRules {
    remember: Regex,
    scan: Regex,
    organize: Regex,
    archive: Regex,
}

impl PlanRules {
    fn new() -> Result<Self, EngineError> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| EngineError::Config(format!("invalid plan rule: {}", e)))
        };
        Ok(Self {
            remember: compile(r"(?i)^(?:please\s+)?remember\s+(?:that\s+)?my\s+(?P<key>.+?)\s+is\s+(?P<value>.+?)[.!]?$")?,
            scan: compile(r"(?i)^(?:please\s+)?(?:scan|list\s+(?:the\s+)?files\s+in)\s+(?P<path>\S+)$")?,
            organize: compile(r"(?i)^(?:please\s+)?organi[sz]e\s+(?:the\s+files\s+in\s+)?(?P<path>\S+)$")?,
            archive: compile(
                r"(?i)^(?:please\s+)?(?:archive|move)\s+(?:files|everything)\s+older\s+than\s+(?P<days>\d+)\s+days?\s+(?:in|from)\s+(?P<path>\S+)$",
            )?,
        })
    }

    fn match_request(&self, request: &str) -> Option<Vec<RawStep>> {
        let request = request.trim();

        if let Some(caps) = self.remember.captures(request) {
            let key = caps["key"].trim().to_lowercase();
            let value = caps["value"].trim();
            return Some(vec![RawStep::new(
                "remember",
                "memory_tools.remember_preference",
                json!({"key": key, "value": value}),
            )]);
        }

        if let Some(caps) = self.archive.captures(request) {
            let path = path_token(&caps["path"])?;
            let days: i64 = caps["days"].parse().ok()?;
            return Some(vec![RawStep::new(
                "archive",
                "system_control.move_old_files",
                json!({"source_path": path, "days": days}),
            )]);
        }

        if let Some(caps) = self.organize.captures(request) {
            let path = path_token(&caps["path"])?;
            return Some(vec![
                RawStep::new("scan", "system_control.scan_directory", json!({"path": path})),
                RawStep::new(
                    "organize",
                    "system_control.organize_by_type",
                    json!({"source_path": path}),
                )
                .after("scan"),
            ]);
        }

        if let Some(caps) = self.scan.captures(request) {
            let path = path_token(&caps["path"])?;
            return Some(vec![RawStep::new(
                "scan",
                "system_control.scan_directory",
                json!({"path": path}),
            )]);
        }

        None
    }
}

/// A token that looks like a filesystem path, minus trailing punctuation
fn path_token(token: &str) -> Option<String> {
    let mut token = token.trim_end_matches(&[',', '!', '?'][..]);
    if token.len() > 1 && token.ends_with('.') && !token.ends_with("..") {
        token = &token[..token.len() - 1];
    }
    let looks_like_path = token.starts_with('~')
        || token.starts_with('/')
        || token.starts_with('.')
        || token.contains('/');
    looks_like_path.then(|| token.to_string())
}
