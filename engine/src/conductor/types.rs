//! Plan, step and task record types
//!
//! Steps live in a flat arena owned by the [`Plan`] and refer to each other
//! by index. A `Plan` can only be built through [`Plan::new`], which rejects
//! dangling indices and cycles, so every `Plan` the executor sees is a DAG.

use badi_sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeSet, VecDeque};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Structural plan failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanningError {
    #[error("dependency cycle between steps: {}", .0.join(", "))]
    Cycle(Vec<String>),

    #[error("step '{step}' depends on unknown step '{dependency}'")]
    UnresolvedDependency { step: String, dependency: String },

    #[error("step '{0}' depends on itself")]
    SelfDependency(String),

    #[error("duplicate step id '{0}'")]
    DuplicateStepId(String),

    #[error("plan has {count} steps, more than the limit of {max}")]
    TooManySteps { count: usize, max: usize },

    #[error("planner response was not a step list: {0}")]
    InvalidResponse(String),
}

impl From<PlanningError> for EngineError {
    fn from(err: PlanningError) -> Self {
        EngineError::Planning(err.to_string())
    }
}

/// `module.capability` reference
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CapabilityRef {
    pub module: String,
    pub capability: String,
}

impl CapabilityRef {
    pub fn new(module: impl Into<String>, capability: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            capability: capability.into(),
        }
    }
}

impl fmt::Display for CapabilityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.module, self.capability)
    }
}

impl FromStr for CapabilityRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().split_once('.') {
            Some((module, capability)) if !module.is_empty() && !capability.is_empty() => {
                Ok(Self::new(module, capability))
            }
            _ => Err(format!("'{}' is not of the form module.capability", s)),
        }
    }
}

impl TryFrom<String> for CapabilityRef {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CapabilityRef> for String {
    fn from(value: CapabilityRef) -> Self {
        value.to_string()
    }
}

/// One capability invocation inside a plan
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    /// Label from the decomposition source, unique within the plan
    pub id: String,
    pub capability: CapabilityRef,
    pub params: Map<String, Value>,
    /// Arena indices of the steps this one waits for
    pub depends_on: BTreeSet<usize>,
}

impl Step {
    pub fn new(id: impl Into<String>, capability: CapabilityRef, params: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            capability,
            params,
            depends_on: BTreeSet::new(),
        }
    }

    pub fn after(mut self, index: usize) -> Self {
        self.depends_on.insert(index);
        self
    }

    /// Short human description used in confirmation prompts
    pub fn describe(&self) -> String {
        let params = Value::Object(self.params.clone());
        format!("{} {}", self.capability, params)
    }
}

/// A validated, acyclic collection of steps
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Plan {
    steps: Vec<Step>,
    warnings: Vec<String>,
    /// Memory scope handed to every step
    owner: Option<String>,
}

impl Plan {
    /// Build a plan, rejecting dangling dependencies, duplicate ids and cycles
    pub fn new(steps: Vec<Step>, warnings: Vec<String>) -> Result<Self, PlanningError> {
        let mut seen = BTreeSet::new();
        for step in &steps {
            if !seen.insert(step.id.as_str()) {
                return Err(PlanningError::DuplicateStepId(step.id.clone()));
            }
        }

        for (index, step) in steps.iter().enumerate() {
            for &dep in &step.depends_on {
                if dep == index {
                    return Err(PlanningError::SelfDependency(step.id.clone()));
                }
                if dep >= steps.len() {
                    return Err(PlanningError::UnresolvedDependency {
                        step: step.id.clone(),
                        dependency: format!("#{}", dep),
                    });
                }
            }
        }

        let plan = Self {
            steps,
            warnings,
            owner: None,
        };
        plan.topological_order()?;
        Ok(plan)
    }

    /// A plan with no steps
    pub fn empty(warnings: Vec<String>) -> Self {
        Self {
            steps: Vec::new(),
            warnings,
            owner: None,
        }
    }

    /// Scope the plan's memory access to `owner`
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn step(&self, index: usize) -> Option<&Step> {
        self.steps.get(index)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Warnings raised while building the plan (dropped steps and the like)
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Indices of the steps that depend on `index`
    pub fn dependents(&self, index: usize) -> impl Iterator<Item = usize> + '_ {
        self.steps
            .iter()
            .enumerate()
            .filter(move |(_, s)| s.depends_on.contains(&index))
            .map(|(i, _)| i)
    }

    /// Kahn's algorithm; ties resolve in source order
    pub fn topological_order(&self) -> Result<Vec<usize>, PlanningError> {
        let mut in_degree: Vec<usize> = self.steps.iter().map(|s| s.depends_on.len()).collect();
        let mut queue: VecDeque<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, &d)| d == 0)
            .map(|(i, _)| i)
            .collect();

        let mut order = Vec::with_capacity(self.steps.len());
        while let Some(index) = queue.pop_front() {
            order.push(index);
            for dependent in self.dependents(index) {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    queue.push_back(dependent);
                }
            }
        }

        if order.len() != self.steps.len() {
            let stuck = in_degree
                .iter()
                .enumerate()
                .filter(|(_, &d)| d > 0)
                .map(|(i, _)| self.steps[i].id.clone())
                .collect();
            return Err(PlanningError::Cycle(stuck));
        }

        Ok(order)
    }

    /// Serializable description of every step, dependencies by id
    pub fn summaries(&self) -> Vec<StepSummary> {
        self.steps
            .iter()
            .map(|s| StepSummary {
                id: s.id.clone(),
                capability: s.capability.to_string(),
                params: s.params.clone(),
                depends_on: s
                    .depends_on
                    .iter()
                    .map(|&i| self.steps[i].id.clone())
                    .collect(),
            })
            .collect()
    }
}

/// Terminal state of one step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Success,
    Failure,
    Skipped,
}

/// Why a step did not succeed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    PolicyDenied,
    Timeout,
    ParameterError,
    UnknownCapability,
    CapabilityError,
    Declined,
    DependencyNotSatisfied,
    Cancelled,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PolicyDenied => "policy_denied",
            Self::Timeout => "timeout",
            Self::ParameterError => "parameter_error",
            Self::UnknownCapability => "unknown_capability",
            Self::CapabilityError => "capability_error",
            Self::Declined => "declined",
            Self::DependencyNotSatisfied => "dependency_not_satisfied",
            Self::Cancelled => "cancelled",
        }
    }

    /// Map a step-level engine error to its reason
    pub fn from_error(err: &EngineError) -> Self {
        match err {
            EngineError::Parameter(_) => Self::ParameterError,
            EngineError::PolicyDenied(_)
            | EngineError::PathDenied(_)
            | EngineError::PathOutsideRoots(_) => Self::PolicyDenied,
            EngineError::StepTimeout(_) => Self::Timeout,
            EngineError::UnknownCapability(_) => Self::UnknownCapability,
            EngineError::Cancelled => Self::Cancelled,
            _ => Self::CapabilityError,
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    /// Arena index of the step
    pub index: usize,
    pub step_id: String,
    pub capability: String,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<FailureReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub duration_ms: u64,
}

impl StepResult {
    pub fn success(index: usize, step: &Step, payload: Value, duration_ms: u64) -> Self {
        Self {
            index,
            step_id: step.id.clone(),
            capability: step.capability.to_string(),
            status: StepStatus::Success,
            payload: Some(payload),
            reason: None,
            message: None,
            duration_ms,
        }
    }

    pub fn failure(
        index: usize,
        step: &Step,
        reason: FailureReason,
        message: impl Into<String>,
        duration_ms: u64,
    ) -> Self {
        Self {
            index,
            step_id: step.id.clone(),
            capability: step.capability.to_string(),
            status: StepStatus::Failure,
            payload: None,
            reason: Some(reason),
            message: Some(message.into()),
            duration_ms,
        }
    }

    pub fn skipped(index: usize, step: &Step, reason: FailureReason, message: impl Into<String>) -> Self {
        Self {
            status: StepStatus::Skipped,
            ..Self::failure(index, step, reason, message, 0)
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == StepStatus::Success
    }
}

/// Aggregate outcome of a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Success,
    Partial,
    Failed,
    NothingToDo,
}

impl PlanStatus {
    pub fn aggregate(results: &[StepResult]) -> Self {
        if results.is_empty() {
            return Self::NothingToDo;
        }
        let succeeded = results.iter().filter(|r| r.is_success()).count();
        if succeeded == results.len() {
            Self::Success
        } else if succeeded > 0 {
            Self::Partial
        } else {
            Self::Failed
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Partial => "partial",
            Self::Failed => "failed",
            Self::NothingToDo => "nothing_to_do",
        }
    }
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Self::Success),
            "partial" => Ok(Self::Partial),
            "failed" => Ok(Self::Failed),
            "nothing_to_do" => Ok(Self::NothingToDo),
            other => Err(format!("unknown plan status '{}'", other)),
        }
    }
}

/// Step as recorded in a task record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSummary {
    pub id: String,
    pub capability: String,
    pub params: Map<String, Value>,
    pub depends_on: Vec<String>,
}

/// Persisted summary of one plan execution; never modified after it is written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: String,
    pub conversation_id: String,
    pub request: String,
    pub steps: Vec<StepSummary>,
    pub results: Vec<StepResult>,
    pub status: PlanStatus,
    pub warnings: Vec<String>,
    /// Unix milliseconds
    pub created_at: i64,
}

impl TaskRecord {
    pub fn new(
        conversation_id: &str,
        request: &str,
        plan: &Plan,
        mut results: Vec<StepResult>,
    ) -> Self {
        let status = PlanStatus::aggregate(&results);
        results.sort_by_key(|r| r.index);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id: conversation_id.to_string(),
            request: request.to_string(),
            steps: plan.summaries(),
            results,
            status,
            warnings: plan.warnings().to_vec(),
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}
