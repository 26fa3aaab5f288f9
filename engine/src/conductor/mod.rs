//! Conductor System
//!
//! Turns a task request into a dependency-ordered plan, assembles the
//! context it runs with, and executes it.

pub mod context;
pub mod executor;
pub mod planner;
pub mod types;

pub use context::{Context, ContextAssembler};
pub use executor::{summarize, ExecutionReport, Executor};
pub use planner::{Planner, RawStep};
pub use types::{
    CapabilityRef, FailureReason, Plan, PlanStatus, PlanningError, Step, StepResult, StepStatus,
    StepSummary, TaskRecord,
};
