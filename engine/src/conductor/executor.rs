//! Conductor Executor
//!
//! Runs a [`Plan`] with topological-level scheduling: every step whose
//! dependencies have all succeeded joins the ready set, the ready set runs
//! concurrently (bounded by a semaphore), and the ready set is recomputed as
//! each result arrives. A step whose dependency failed or was skipped is
//! itself skipped and never attempted.
//!
//! Each step goes through the policy gate, then the capability registry
//! (lookup, parameter validation, invocation) under a deadline. A failing
//! step never aborts its siblings.
//!
//! Cancellation stops scheduling immediately: pending steps are skipped and
//! in-flight steps get a grace period before they are recorded as cancelled.

use crate::conductor::types::{FailureReason, Plan, PlanStatus, Step, StepResult, StepStatus};
use crate::config::ExecutorConfig;
use crate::modules::CapabilityRegistry;
use crate::policy::{ConfirmationHandler, Decision, Origin, PolicyGate};
use futures::FutureExt;
use std::collections::{HashSet, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Results of one plan run
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionReport {
    /// In completion order
    pub results: Vec<StepResult>,
    pub status: PlanStatus,
    pub cancelled: bool,
}

impl ExecutionReport {
    pub fn result_for(&self, step_id: &str) -> Option<&StepResult> {
        self.results.iter().find(|r| r.step_id == step_id)
    }
}

/// Everything a spawned step needs
#[derive(Clone)]
struct StepRunner {
    registry: Arc<CapabilityRegistry>,
    policy: Arc<PolicyGate>,
    confirmation: Arc<dyn ConfirmationHandler>,
    /// One confirmation prompt at a time
    confirm_lock: Arc<Mutex<()>>,
    step_timeout: Duration,
}

impl StepRunner {
    async fn run(
        &self,
        index: usize,
        step: Step,
        origin: Origin,
        owner: Option<Arc<str>>,
        permits: Arc<Semaphore>,
    ) -> StepResult {
        let start = Instant::now();
        let elapsed = |start: Instant| start.elapsed().as_millis() as u64;

        match self.policy.authorize(&step, origin) {
            Decision::Deny(err) => {
                return StepResult::failure(
                    index,
                    &step,
                    FailureReason::from_error(&err),
                    err.to_string(),
                    elapsed(start),
                );
            }
            Decision::RequireConfirmation => {
                let approved = {
                    let _guard = self.confirm_lock.lock().await;
                    self.confirmation.confirm(&step.describe()).await
                };
                if !approved {
                    info!(step = %step.id, "Step declined by user");
                    return StepResult::skipped(index, &step, FailureReason::Declined, "declined by user");
                }
            }
            Decision::Allow => {}
        }

        let _permit = match permits.acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                return StepResult::failure(index, &step, FailureReason::Cancelled, "executor shut down", elapsed(start));
            }
        };

        let invocation = self
            .registry
            .invoke_as(&step.capability, &step.params, owner.as_deref());
        match tokio::time::timeout(self.step_timeout, invocation).await {
            Err(_) => StepResult::failure(
                index,
                &step,
                FailureReason::Timeout,
                format!("no result after {}s", self.step_timeout.as_secs_f64()),
                elapsed(start),
            ),
            Ok(Err(err)) => StepResult::failure(
                index,
                &step,
                FailureReason::from_error(&err),
                err.to_string(),
                elapsed(start),
            ),
            Ok(Ok(output)) if output.success => {
                StepResult::success(index, &step, output.data, elapsed(start))
            }
            Ok(Ok(output)) => StepResult::failure(
                index,
                &step,
                FailureReason::CapabilityError,
                output.error.unwrap_or_else(|| "capability reported failure".to_string()),
                elapsed(start),
            ),
        }
    }
}

/// Executes plans; cheap to clone
#[derive(Clone)]
pub struct Executor {
    runner: StepRunner,
    /// `None` runs every ready step at once
    concurrency: Option<usize>,
    cancel_grace: Duration,
}

impl Executor {
    pub fn new(
        registry: Arc<CapabilityRegistry>,
        policy: Arc<PolicyGate>,
        confirmation: Arc<dyn ConfirmationHandler>,
        config: &ExecutorConfig,
    ) -> Self {
        Self {
            runner: StepRunner {
                registry,
                policy,
                confirmation,
                confirm_lock: Arc::new(Mutex::new(())),
                step_timeout: Duration::from_secs(config.step_timeout_secs),
            },
            concurrency: config.concurrency(),
            cancel_grace: Duration::from_secs(config.cancel_grace_secs),
        }
    }

    /// Override the per-step deadline and the cancellation grace period
    pub fn with_timeouts(mut self, step_timeout: Duration, cancel_grace: Duration) -> Self {
        self.runner.step_timeout = step_timeout;
        self.cancel_grace = cancel_grace;
        self
    }

    /// Use a different confirmation handler (per front end)
    pub fn with_confirmation(mut self, confirmation: Arc<dyn ConfirmationHandler>) -> Self {
        self.runner.confirmation = confirmation;
        self
    }

    /// Run `plan` to completion (or cancellation)
    pub async fn execute(&self, plan: &Plan, origin: Origin, cancel: CancellationToken) -> ExecutionReport {
        let (tx, _rx) = mpsc::unbounded_channel();
        self.run(plan, origin, cancel, tx).await
    }

    /// Run `plan` in the background, streaming results as they complete
    pub fn execute_streaming(
        &self,
        plan: Plan,
        origin: Origin,
        cancel: CancellationToken,
    ) -> mpsc::UnboundedReceiver<StepResult> {
        let (tx, rx) = mpsc::unbounded_channel();
        let executor = self.clone();
        tokio::spawn(async move {
            executor.run(&plan, origin, cancel, tx).await;
        });
        rx
    }

    async fn run(
        &self,
        plan: &Plan,
        origin: Origin,
        cancel: CancellationToken,
        tx: mpsc::UnboundedSender<StepResult>,
    ) -> ExecutionReport {
        let n = plan.len();
        if n == 0 {
            debug!("Empty plan, nothing to do");
            return ExecutionReport {
                results: Vec::new(),
                status: PlanStatus::NothingToDo,
                cancelled: false,
            };
        }

        let limit = self.concurrency.map_or(n, |c| c.min(n));
        info!("Executing plan with {} steps (concurrency {})", n, limit);

        let permits = Arc::new(Semaphore::new(limit));
        let owner: Option<Arc<str>> = plan.owner().map(Arc::from);
        let mut status: Vec<Option<StepStatus>> = vec![None; n];
        let mut waiting_on: Vec<usize> = plan.steps().iter().map(|s| s.depends_on.len()).collect();
        let mut ready: VecDeque<usize> = (0..n).filter(|&i| waiting_on[i] == 0).collect();
        let mut in_flight: HashSet<usize> = HashSet::new();
        let mut tasks: JoinSet<(usize, StepResult)> = JoinSet::new();
        let mut results: Vec<StepResult> = Vec::with_capacity(n);
        let mut cancelled = false;
        let mut grace_deadline: Option<tokio::time::Instant> = None;

        let record = |result: StepResult, status: &mut Vec<Option<StepStatus>>, results: &mut Vec<StepResult>| {
            status[result.index] = Some(result.status);
            let _ = tx.send(result.clone());
            results.push(result);
        };

        loop {
            if !cancelled {
                while let Some(index) = ready.pop_front() {
                    let Some(step) = plan.step(index) else { continue };
                    debug!(step = %step.id, capability = %step.capability, "Starting step");
                    let runner = self.runner.clone();
                    let step = step.clone();
                    let permits = permits.clone();
                    let owner = owner.clone();
                    in_flight.insert(index);
                    tasks.spawn(async move {
                        let fallback = StepResult::failure(
                            index,
                            &step,
                            FailureReason::CapabilityError,
                            "capability panicked",
                            0,
                        );
                        let result = AssertUnwindSafe(runner.run(index, step, origin, owner, permits))
                            .catch_unwind()
                            .await
                            .unwrap_or(fallback);
                        (index, result)
                    });
                }
            }

            if tasks.is_empty() {
                break;
            }

            let grace = async move {
                match grace_deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                biased;

                _ = cancel.cancelled(), if !cancelled => {
                    warn!("Plan cancelled, {} steps in flight", in_flight.len());
                    cancelled = true;
                    grace_deadline = Some(tokio::time::Instant::now() + self.cancel_grace);
                    ready.clear();
                    for (index, step) in plan.steps().iter().enumerate() {
                        if status[index].is_none() && !in_flight.contains(&index) {
                            record(
                                StepResult::skipped(index, step, FailureReason::Cancelled, "request cancelled"),
                                &mut status,
                                &mut results,
                            );
                        }
                    }
                }

                joined = tasks.join_next() => {
                    let Some(Ok((index, result))) = joined else { continue };
                    in_flight.remove(&index);
                    let succeeded = result.is_success();
                    info!(
                        step = %result.step_id,
                        status = ?result.status,
                        reason = result.reason.map(|r| r.as_str()),
                        duration_ms = result.duration_ms,
                        "Step finished"
                    );
                    record(result, &mut status, &mut results);

                    if succeeded {
                        for dependent in plan.dependents(index) {
                            waiting_on[dependent] -= 1;
                            if waiting_on[dependent] == 0 && status[dependent].is_none() && !cancelled {
                                ready.push_back(dependent);
                            }
                        }
                    } else {
                        let mut queue: VecDeque<usize> = plan.dependents(index).collect();
                        while let Some(dependent) = queue.pop_front() {
                            if status[dependent].is_some() || in_flight.contains(&dependent) {
                                continue;
                            }
                            let Some(step) = plan.step(dependent) else { continue };
                            debug!(step = %step.id, "Skipping step, dependency not satisfied");
                            record(
                                StepResult::skipped(
                                    dependent,
                                    step,
                                    FailureReason::DependencyNotSatisfied,
                                    format!("dependency '{}' did not succeed", plan.steps()[index].id),
                                ),
                                &mut status,
                                &mut results,
                            );
                            queue.extend(plan.dependents(dependent));
                        }
                    }
                }

                _ = grace => {
                    warn!("Grace period over, abandoning {} steps", in_flight.len());
                    tasks.abort_all();
                    while let Some(joined) = tasks.join_next().await {
                        if let Ok((index, result)) = joined {
                            in_flight.remove(&index);
                            record(result, &mut status, &mut results);
                        }
                    }
                    let mut abandoned: Vec<usize> = in_flight.drain().collect();
                    abandoned.sort_unstable();
                    for index in abandoned {
                        if let Some(step) = plan.step(index) {
                            record(
                                StepResult::failure(
                                    index,
                                    step,
                                    FailureReason::Cancelled,
                                    "request cancelled",
                                    self.cancel_grace.as_millis() as u64,
                                ),
                                &mut status,
                                &mut results,
                            );
                        }
                    }
                    break;
                }
            }
        }

        let plan_status = PlanStatus::aggregate(&results);
        info!(status = %plan_status, cancelled, "Plan finished");
        ExecutionReport {
            results,
            status: plan_status,
            cancelled,
        }
    }
}

/// Plain-language summary of a plan run, used when no backend can write one
pub fn summarize(report: &ExecutionReport) -> String {
    if report.results.is_empty() {
        return "Nothing to do.".to_string();
    }

    let mut sorted = report.results.clone();
    sorted.sort_by_key(|r| r.index);

    let succeeded = sorted.iter().filter(|r| r.is_success()).count();
    let mut out = match report.status {
        PlanStatus::Success => format!("Done: all {} steps succeeded.", sorted.len()),
        PlanStatus::Partial => format!(
            "Partly done: {} of {} steps succeeded.",
            succeeded,
            sorted.len()
        ),
        PlanStatus::Failed | PlanStatus::NothingToDo => {
            format!("I couldn't complete the task: none of {} steps succeeded.", sorted.len())
        }
    };

    for result in &sorted {
        let line = match result.status {
            StepStatus::Success => format!("\n- {} ({}): ok", result.step_id, result.capability),
            StepStatus::Failure | StepStatus::Skipped => format!(
                "\n- {} ({}): {} [{}]",
                result.step_id,
                result.capability,
                match result.status {
                    StepStatus::Failure => "failed",
                    _ => "skipped",
                },
                result.reason.map(|r| r.as_str()).unwrap_or("unknown"),
            ),
        };
        out.push_str(&line);
    }
    out
}
