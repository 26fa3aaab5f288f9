//! Backend Selector
//!
//! Chooses which registered backend serves a request and falls back to the
//! next candidate when one is unavailable or fails.
//!
//! # Modes
//!
//! - **local**: local backends only
//! - **cloud**: cloud backends in priority order
//! - **hybrid**: local first for low-complexity requests (short input, no
//!   tool use), cloud first otherwise; the other group is the fallback
//!
//! `[backends.preferred]` moves one backend to the front for chat, planning
//! or summary calls; the mode's order remains the fallback. The mode still
//! decides which backends are eligible at all.
//!
//! Availability probes are cached for `availability_ttl_secs`. A backend
//! that errors has its cache entry dropped so the next request re-probes it.

use super::{Backend, Locality, Message};
use crate::config::{BackendsConfig, Mode, PreferredBackends};
use badi_sdk::errors::EngineError;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// What a backend call is for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// Conversational reply
    Chat,
    /// One-word intent label
    Classification,
    /// Plan decomposition (tool use)
    Planning,
    /// Natural-language summary of executed steps
    Summary,
}

/// Reply text and the backend that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub backend: String,
}

/// Availability snapshot for diagnostics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendStatus {
    pub name: String,
    pub locality: Locality,
    pub priority: u32,
    pub available: bool,
}

pub struct BackendSelector {
    /// Sorted by priority, then registration order
    backends: Vec<Arc<dyn Backend>>,
    mode: Mode,
    hybrid_local_max_chars: usize,
    availability_ttl: Duration,
    preferred: PreferredBackends,
    local_timeout: Duration,
    cloud_timeout: Duration,
    availability: Mutex<HashMap<String, (bool, Instant)>>,
}

impl BackendSelector {
    pub fn new(mut backends: Vec<Arc<dyn Backend>>, config: &BackendsConfig) -> Self {
        // Stable sort keeps registration order among equal priorities
        backends.sort_by_key(|b| b.descriptor().priority);

        Self {
            backends,
            mode: config.mode,
            hybrid_local_max_chars: config.hybrid_local_max_chars,
            availability_ttl: Duration::from_secs(config.availability_ttl_secs),
            preferred: config.preferred.clone(),
            local_timeout: Duration::from_secs(config.local_timeout_secs),
            cloud_timeout: Duration::from_secs(config.cloud_timeout_secs),
            availability: Mutex::new(HashMap::new()),
        }
    }

    /// Configured operating mode
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Whether a request is simple enough for a local backend in hybrid mode
    pub fn is_low_complexity(&self, task: TaskKind, input: &str) -> bool {
        match task {
            TaskKind::Planning => false,
            TaskKind::Chat | TaskKind::Classification | TaskKind::Summary => {
                input.chars().count() <= self.hybrid_local_max_chars
            }
        }
    }

    /// Configured first choice for `task`, if any
    fn preferred_for(&self, task: TaskKind) -> Option<&str> {
        match task {
            TaskKind::Chat => self.preferred.chat.as_deref(),
            TaskKind::Planning => self.preferred.planning.as_deref(),
            TaskKind::Summary => self.preferred.summary.as_deref(),
            TaskKind::Classification => None,
        }
    }

    /// Backends to try, most preferred first
    pub fn candidates(&self, mode: Mode, task: TaskKind, input: &str) -> Vec<Arc<dyn Backend>> {
        let of = |locality: Locality| {
            self.backends
                .iter()
                .filter(move |b| b.descriptor().locality == locality)
                .cloned()
        };

        let mut candidates: Vec<Arc<dyn Backend>> = match mode {
            Mode::Local => of(Locality::Local).collect(),
            Mode::Cloud => of(Locality::Cloud).collect(),
            Mode::Hybrid => {
                if self.is_low_complexity(task, input) {
                    of(Locality::Local).chain(of(Locality::Cloud)).collect()
                } else {
                    of(Locality::Cloud).chain(of(Locality::Local)).collect()
                }
            }
        };

        if let Some(name) = self.preferred_for(task) {
            if let Some(pos) = candidates.iter().position(|b| b.descriptor().name == name) {
                let preferred = candidates.remove(pos);
                candidates.insert(0, preferred);
            }
        }
        candidates
    }

    /// First available backend for the request
    pub async fn select(
        &self,
        mode: Mode,
        task: TaskKind,
        input: &str,
    ) -> Result<Arc<dyn Backend>, EngineError> {
        for backend in self.candidates(mode, task, input) {
            if self.is_available(backend.as_ref()).await {
                return Ok(backend);
            }
        }
        Err(EngineError::NoBackendAvailable(format!(
            "no {} backend is available",
            mode
        )))
    }

    /// Complete with the configured mode, falling back across candidates
    pub async fn complete(
        &self,
        task: TaskKind,
        context: &[Message],
        prompt: &str,
    ) -> Result<Completion, EngineError> {
        self.complete_with_mode(self.mode, task, context, prompt).await
    }

    pub async fn chat_complete(
        &self,
        context: &[Message],
        prompt: &str,
    ) -> Result<Completion, EngineError> {
        self.complete(TaskKind::Chat, context, prompt).await
    }

    pub async fn generate_plan(
        &self,
        context: &[Message],
        prompt: &str,
    ) -> Result<Completion, EngineError> {
        self.complete(TaskKind::Planning, context, prompt).await
    }

    pub async fn complete_with_mode(
        &self,
        mode: Mode,
        task: TaskKind,
        context: &[Message],
        prompt: &str,
    ) -> Result<Completion, EngineError> {
        let candidates = self.candidates(mode, task, prompt);
        if candidates.is_empty() {
            return Err(EngineError::NoBackendAvailable(format!(
                "no {} backend is configured",
                mode
            )));
        }

        let mut last_error: Option<String> = None;
        let mut previous: Option<String> = None;

        for backend in candidates {
            let descriptor = backend.descriptor();

            if !self.is_available(backend.as_ref()).await {
                debug!(backend = %descriptor.name, "Backend unavailable, skipping");
                previous = Some(format!("{} unavailable", descriptor.name));
                continue;
            }

            if let Some(reason) = previous.take() {
                warn!(backend = %descriptor.name, reason = %reason, ?task, "Falling back to next backend");
            }

            let timeout = match descriptor.locality {
                Locality::Local => self.local_timeout,
                Locality::Cloud => self.cloud_timeout,
            };

            debug!(backend = %descriptor.name, timeout_secs = timeout.as_secs(), ?task, "Attempting backend");

            match tokio::time::timeout(timeout, backend.complete(context, prompt)).await {
                Ok(Ok(text)) => {
                    info!(backend = %descriptor.name, ?task, "Backend succeeded");
                    return Ok(Completion {
                        text,
                        backend: descriptor.name.clone(),
                    });
                }
                Ok(Err(e)) => {
                    warn!(backend = %descriptor.name, error = %e, "Backend failed");
                    self.invalidate(&descriptor.name);
                    previous = Some(format!("{} failed: {}", descriptor.name, e));
                    last_error = previous.clone();
                }
                Err(_) => {
                    warn!(backend = %descriptor.name, "Backend timed out after {}s", timeout.as_secs());
                    self.invalidate(&descriptor.name);
                    previous = Some(format!("{} timed out", descriptor.name));
                    last_error = previous.clone();
                }
            }
        }

        tracing::error!(?task, "All backends exhausted");
        Err(EngineError::NoBackendAvailable(
            last_error.unwrap_or_else(|| format!("no {} backend is available", mode)),
        ))
    }

    /// Probe every backend, bypassing the cache
    pub async fn list_available(&self) -> Vec<BackendStatus> {
        let mut statuses = Vec::with_capacity(self.backends.len());
        for backend in &self.backends {
            let available = backend.is_available().await;
            self.remember(&backend.descriptor().name, available);
            let d = backend.descriptor();
            statuses.push(BackendStatus {
                name: d.name.clone(),
                locality: d.locality,
                priority: d.priority,
                available,
            });
        }
        statuses
    }

    async fn is_available(&self, backend: &dyn Backend) -> bool {
        let name = &backend.descriptor().name;
        if let Some(cached) = self.cached(name) {
            return cached;
        }
        let available = backend.is_available().await;
        self.remember(name, available);
        available
    }

    fn cached(&self, name: &str) -> Option<bool> {
        let cache = self.availability.lock().ok()?;
        cache
            .get(name)
            .filter(|(_, checked)| checked.elapsed() < self.availability_ttl)
            .map(|(available, _)| *available)
    }

    fn remember(&self, name: &str, available: bool) {
        if let Ok(mut cache) = self.availability.lock() {
            cache.insert(name.to_string(), (available, Instant::now()));
        }
    }

    fn invalidate(&self, name: &str) {
        if let Ok(mut cache) = self.availability.lock() {
            cache.remove(name);
        }
    }
}
