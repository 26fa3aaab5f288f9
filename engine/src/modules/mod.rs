//! Capability Registry
//!
//! Holds the capability modules available to the planner and executor.
//! Modules are registered once at startup from an explicit list
//! ([`CapabilityRegistry::builtin`]) and the registry is read-only after
//! that. Lookups are by `(module, capability)`.
//!
//! Every invocation is validated against the capability's declared
//! parameter schema before the module sees it.

pub mod memory_tools;
pub mod system_control;

pub use memory_tools::MemoryToolsModule;
pub use system_control::SystemControlModule;

use crate::conductor::types::CapabilityRef;
use crate::config::Config;
use crate::fs_guard::RootGuard;
use crate::memory::MemoryGateway;
use badi_sdk::errors::EngineError;
use badi_sdk::{CapabilityModule, CapabilityOutput, CapabilitySpec};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Catalog of registered capability modules
#[derive(Default)]
pub struct CapabilityRegistry {
    modules: HashMap<String, Arc<dyn CapabilityModule>>,
    /// Registration order, used for prompts and listings
    order: Vec<String>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the built-in modules named in `[modules] enabled`
    pub fn builtin(config: &Config, memory: Arc<dyn MemoryGateway>) -> Result<Self, EngineError> {
        let guard = RootGuard::new(&config.policy.allowed_roots)?;
        let available: Vec<Arc<dyn CapabilityModule>> = vec![
            Arc::new(SystemControlModule::new(guard)),
            Arc::new(MemoryToolsModule::new(
                memory,
                config.memory.similarity_threshold,
            )),
        ];

        for name in &config.modules.enabled {
            if !available.iter().any(|m| m.name() == name) {
                warn!("Unknown module '{}' in [modules] enabled, ignoring", name);
            }
        }

        let mut registry = Self::new();
        for module in available {
            if config.modules.enabled.iter().any(|n| n == module.name()) {
                registry.register(module)?;
            }
        }
        Ok(registry)
    }

    /// Add a module; names must be unique
    pub fn register(&mut self, module: Arc<dyn CapabilityModule>) -> Result<(), EngineError> {
        let name = module.name().to_string();
        if self.modules.contains_key(&name) {
            return Err(EngineError::Config(format!(
                "module '{}' is already registered",
                name
            )));
        }
        info!(
            "Registered module '{}' ({} capabilities)",
            name,
            module.capabilities().len()
        );
        self.order.push(name.clone());
        self.modules.insert(name, module);
        Ok(())
    }

    pub fn lookup(
        &self,
        capability: &CapabilityRef,
    ) -> Option<(&Arc<dyn CapabilityModule>, &CapabilitySpec)> {
        let module = self.modules.get(&capability.module)?;
        let spec = module
            .capabilities()
            .iter()
            .find(|spec| spec.name == capability.capability)?;
        Some((module, spec))
    }

    pub fn spec(&self, capability: &CapabilityRef) -> Option<&CapabilitySpec> {
        self.lookup(capability).map(|(_, spec)| spec)
    }

    pub fn contains(&self, capability: &CapabilityRef) -> bool {
        self.lookup(capability).is_some()
    }

    /// Validate `params` against the schema and invoke the capability
    pub async fn invoke(
        &self,
        capability: &CapabilityRef,
        params: &Map<String, Value>,
    ) -> Result<CapabilityOutput, EngineError> {
        self.invoke_as(capability, params, None).await
    }

    /// Like [`invoke`](Self::invoke), scoped to one memory owner
    pub async fn invoke_as(
        &self,
        capability: &CapabilityRef,
        params: &Map<String, Value>,
        owner: Option<&str>,
    ) -> Result<CapabilityOutput, EngineError> {
        let (module, spec) = self
            .lookup(capability)
            .ok_or_else(|| EngineError::UnknownCapability(capability.to_string()))?;

        let mut input = spec.validate(params)?;
        input.owner = owner.map(String::from);
        debug!("Invoking {}", capability);
        module.invoke(&capability.capability, input).await
    }

    /// Registered modules in registration order
    pub fn modules(&self) -> Vec<Arc<dyn CapabilityModule>> {
        self.order
            .iter()
            .filter_map(|name| self.modules.get(name).cloned())
            .collect()
    }

    /// Every `module.capability` name
    pub fn capability_names(&self) -> Vec<String> {
        self.modules()
            .iter()
            .flat_map(|m| {
                m.capabilities()
                    .iter()
                    .map(|spec| format!("{}.{}", m.name(), spec.name))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Catalog text given to a backend when it decomposes a task
    pub fn describe_for_prompt(&self) -> String {
        let mut out = String::new();
        for module in self.modules() {
            out.push_str(&format!("## {}\n{}\n", module.name(), module.description()));
            for spec in module.capabilities() {
                out.push_str(&format!(
                    "- {}.{}: {}\n",
                    module.name(),
                    spec.signature(),
                    spec.description
                ));
            }
            out.push('\n');
        }
        out.trim_end().to_string()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted modules shared by engine unit tests

    use async_trait::async_trait;
    use badi_sdk::{
        CapabilityInput, CapabilityModule, CapabilityOutput, CapabilitySpec, EngineError,
        ParamSpec, ParamType,
    };
    use serde_json::json;
    use std::time::Duration;

    /// `test.ok`, `test.fail`, `test.slow`, `test.confirm`, `test.read`, `test.move`
    pub struct ScriptedModule {
        specs: Vec<CapabilitySpec>,
    }

    impl ScriptedModule {
        pub fn new() -> Self {
            Self {
                specs: vec![
                    CapabilitySpec::new("ok", "Always succeeds")
                        .param(ParamSpec::optional("tag", ParamType::String, "Echoed back")),
                    CapabilitySpec::new("fail", "Always fails"),
                    CapabilitySpec::new("slow", "Sleeps for `ms` milliseconds")
                        .param(ParamSpec::with_default("ms", ParamType::Integer, json!(10_000), "Delay")),
                    CapabilitySpec::new("confirm", "Needs approval").requires_confirmation(),
                    CapabilitySpec::new("read", "Reads a path")
                        .param(ParamSpec::required("path", ParamType::Path, "Target"))
                        .read_only(),
                    CapabilitySpec::new("move", "Moves a path")
                        .param(ParamSpec::required("path", ParamType::Path, "Target")),
                ],
            }
        }
    }

    #[async_trait]
    impl CapabilityModule for ScriptedModule {
        fn name(&self) -> &str {
            "test"
        }

        fn description(&self) -> &str {
            "Scripted test module"
        }

        fn capabilities(&self) -> &[CapabilitySpec] {
            &self.specs
        }

        async fn invoke(
            &self,
            capability: &str,
            input: CapabilityInput,
        ) -> Result<CapabilityOutput, EngineError> {
            match capability {
                "fail" => Err(EngineError::Capability("scripted failure".into())),
                "slow" => {
                    let ms = input.param_i64("ms")?;
                    tokio::time::sleep(Duration::from_millis(ms as u64)).await;
                    Ok(CapabilityOutput::text("slow done"))
                }
                other => Ok(CapabilityOutput::json(json!({
                    "capability": other,
                    "tag": input.param_str_opt("tag"),
                }))),
            }
        }
    }
}
