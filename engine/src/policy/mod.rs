//! Policy Gate
//!
//! Decides, per step, whether the executor may run it automatically, must
//! ask the user first, or must refuse it.
//!
//! - **Deny**: capability on the deny list, missing from a non-empty allow
//!   list, not registered, or a path parameter outside the allowed roots
//! - **RequireConfirmation**: the capability's confirmation flag is set
//!   (unless it is read-only and read-only auto-approval is on), or the
//!   request came from a remote origin and the capability is not read-only
//! - **Allow**: everything else
//!
//! Confirmation itself is delegated to an injected [`ConfirmationHandler`],
//! so the core never assumes a particular front end.

use async_trait::async_trait;
use badi_sdk::errors::EngineError;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::conductor::types::Step;
use crate::config::PolicyConfig;
use crate::fs_guard::RootGuard;
use crate::modules::CapabilityRegistry;

/// Where a request came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Origin {
    /// Interactive local front end
    #[default]
    Local,
    /// Relayed request (chat bridge, API)
    Remote,
}

impl Origin {
    pub fn is_remote(&self) -> bool {
        matches!(self, Origin::Remote)
    }
}

/// Outcome of a policy check
#[derive(Debug)]
pub enum Decision {
    Allow,
    RequireConfirmation,
    /// Refused; the error carries the failure kind
    Deny(EngineError),
}

/// Asks the user to approve one step
#[async_trait]
pub trait ConfirmationHandler: Send + Sync {
    async fn confirm(&self, step_description: &str) -> bool;
}

/// Approves every step
pub struct AutoApprove;

#[async_trait]
impl ConfirmationHandler for AutoApprove {
    async fn confirm(&self, _step_description: &str) -> bool {
        true
    }
}

/// Declines every step; used when no user is present to ask
pub struct AutoDeny;

#[async_trait]
impl ConfirmationHandler for AutoDeny {
    async fn confirm(&self, _step_description: &str) -> bool {
        false
    }
}

pub struct PolicyGate {
    config: PolicyConfig,
    guard: RootGuard,
    registry: Arc<CapabilityRegistry>,
}

impl PolicyGate {
    pub fn new(config: &PolicyConfig, registry: Arc<CapabilityRegistry>) -> Result<Self, EngineError> {
        Ok(Self {
            guard: RootGuard::new(&config.allowed_roots)?,
            config: config.clone(),
            registry,
        })
    }

    pub fn authorize(&self, step: &Step, origin: Origin) -> Decision {
        let name = step.capability.to_string();

        if self.config.denied_capabilities.iter().any(|d| d == &name) {
            info!(capability = %name, "Denied by policy");
            return Decision::Deny(EngineError::PolicyDenied(format!(
                "{} is on the deny list",
                name
            )));
        }

        if !self.config.allowed_capabilities.is_empty()
            && !self.config.allowed_capabilities.iter().any(|a| a == &name)
        {
            info!(capability = %name, "Not on allow list");
            return Decision::Deny(EngineError::PolicyDenied(format!(
                "{} is not on the allow list",
                name
            )));
        }

        let Some(spec) = self.registry.spec(&step.capability) else {
            return Decision::Deny(EngineError::UnknownCapability(name));
        };

        for raw in spec.path_values(&step.params) {
            if let Err(e) = self.guard.validate_path(Path::new(raw)) {
                info!(capability = %name, path = raw, "Path rejected: {}", e);
                return Decision::Deny(e);
            }
        }

        let flagged = self.config.require_confirmation
            && spec.requires_confirmation
            && !(spec.read_only && self.config.auto_approve_read_only);
        let escalated = origin.is_remote() && !spec.read_only;

        if flagged || escalated {
            debug!(capability = %name, remote = origin.is_remote(), "Confirmation required");
            Decision::RequireConfirmation
        } else {
            Decision::Allow
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conductor::types::CapabilityRef;
    use crate::modules::testing::ScriptedModule;
    use serde_json::{json, Map, Value};
    use tempfile::TempDir;

    fn gate(config: PolicyConfig) -> PolicyGate {
        let mut registry = CapabilityRegistry::new();
        registry.register(Arc::new(ScriptedModule::new())).unwrap();
        PolicyGate::new(&config, Arc::new(registry)).unwrap()
    }

    fn config(root: &Path) -> PolicyConfig {
        PolicyConfig {
            allowed_roots: vec![root.to_path_buf()],
            ..PolicyConfig::default()
        }
    }

    fn step(capability: &str, params: Value) -> Step {
        let params: Map<String, Value> = params.as_object().cloned().unwrap_or_default();
        Step::new("s1", CapabilityRef::new("test", capability), params)
    }

    #[test]
    fn test_plain_capability_allowed() {
        let temp = TempDir::new().unwrap();
        let gate = gate(config(temp.path()));
        assert!(matches!(gate.authorize(&step("ok", json!({})), Origin::Local), Decision::Allow));
    }

    #[test]
    fn test_flagged_capability_requires_confirmation() {
        let temp = TempDir::new().unwrap();
        let gate = gate(config(temp.path()));
        assert!(matches!(
            gate.authorize(&step("confirm", json!({})), Origin::Local),
            Decision::RequireConfirmation
        ));
    }

    #[test]
    fn test_confirmation_can_be_disabled() {
        let temp = TempDir::new().unwrap();
        let gate = gate(PolicyConfig {
            require_confirmation: false,
            ..config(temp.path())
        });
        assert!(matches!(
            gate.authorize(&step("confirm", json!({})), Origin::Local),
            Decision::Allow
        ));
    }

    #[test]
    fn test_path_outside_roots_denied() {
        let root = TempDir::new().unwrap();
        let other = TempDir::new().unwrap();
        let gate = gate(config(root.path()));

        match gate.authorize(&step("read", json!({"path": other.path()})), Origin::Local) {
            Decision::Deny(EngineError::PathOutsideRoots(_)) => {}
            other => panic!("expected path denial, got {:?}", other),
        }
        assert!(matches!(
            gate.authorize(&step("read", json!({"path": root.path()})), Origin::Local),
            Decision::Allow
        ));
    }

    #[test]
    fn test_deny_and_allow_lists() {
        let temp = TempDir::new().unwrap();
        let gate_deny = gate(PolicyConfig {
            denied_capabilities: vec!["test.ok".into()],
            ..config(temp.path())
        });
        assert!(matches!(
            gate_deny.authorize(&step("ok", json!({})), Origin::Local),
            Decision::Deny(EngineError::PolicyDenied(_))
        ));

        let gate_allow = gate(PolicyConfig {
            allowed_capabilities: vec!["test.fail".into()],
            ..config(temp.path())
        });
        assert!(matches!(
            gate_allow.authorize(&step("ok", json!({})), Origin::Local),
            Decision::Deny(EngineError::PolicyDenied(_))
        ));
        assert!(matches!(
            gate_allow.authorize(&step("fail", json!({})), Origin::Local),
            Decision::Allow
        ));
    }

    #[test]
    fn test_unknown_capability_denied() {
        let temp = TempDir::new().unwrap();
        let gate = gate(config(temp.path()));
        assert!(matches!(
            gate.authorize(&step("missing", json!({})), Origin::Local),
            Decision::Deny(EngineError::UnknownCapability(_))
        ));
    }

    #[test]
    fn test_remote_origin_escalates_writes_only() {
        let temp = TempDir::new().unwrap();
        let gate = gate(config(temp.path()));

        assert!(matches!(
            gate.authorize(&step("move", json!({"path": temp.path()})), Origin::Remote),
            Decision::RequireConfirmation
        ));
        assert!(matches!(
            gate.authorize(&step("read", json!({"path": temp.path()})), Origin::Remote),
            Decision::Allow
        ));
    }

    #[tokio::test]
    async fn test_builtin_handlers() {
        assert!(AutoApprove.confirm("x").await);
        assert!(!AutoDeny.confirm("x").await);
    }
}
