//! Configuration management
//!
//! This module handles loading, validation, and management of the B.A.D.I.
//! configuration. Configuration is stored in TOML format at ~/.badi/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Data directory, log level
//! - **backends**: Operating mode, timeouts and per-provider settings
//! - **memory**: Context window, semantic search and embedding settings
//! - **intent**: Intent classification strategy
//! - **planner**: Plan size limits
//! - **executor**: Step deadlines, cancellation grace and concurrency
//! - **policy**: Confirmation rules, allowed roots and capability lists
//! - **modules**: Capability modules enabled at startup
//!
//! # Environment Overrides
//!
//! `BADI_MODE`, `BADI_DATA_DIR` and `BADI_LOG_LEVEL` take precedence over the
//! file and are applied before validation.
//!
//! # Examples
//!
//! ```no_run
//! use badi_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//! println!("Mode: {}", config.backends.mode);
//! println!("Data dir: {:?}", config.core.data_dir);
//! # Ok(())
//! # }
//! ```

use badi_sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Main configuration structure
///
/// Every section has defaults, so an empty file is a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    /// Core runtime settings
    #[serde(default)]
    pub core: CoreConfig,

    /// Language-model backends
    #[serde(default)]
    pub backends: BackendsConfig,

    /// Memory retrieval and capture
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Intent classification
    #[serde(default)]
    pub intent: IntentConfig,

    /// Planner limits
    #[serde(default)]
    pub planner: PlannerConfig,

    /// Executor limits
    #[serde(default)]
    pub executor: ExecutorConfig,

    /// Policy gate rules
    #[serde(default)]
    pub policy: PolicyConfig,

    /// Capability modules
    #[serde(default)]
    pub modules: ModulesConfig,
}

/// Core runtime configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Data directory path (supports ~ expansion)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: default_log_level(),
        }
    }
}

/// Backend operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Local backends only
    Local,
    /// Cloud backends only, in priority order
    Cloud,
    /// Local for simple requests, cloud otherwise, with fallback
    Hybrid,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Cloud => write!(f, "cloud"),
            Self::Hybrid => write!(f, "hybrid"),
        }
    }
}

impl FromStr for Mode {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "cloud" => Ok(Self::Cloud),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(EngineError::Config(format!(
                "Invalid mode '{}'. Must be one of: local, cloud, hybrid",
                other
            ))),
        }
    }
}

/// Backend configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendsConfig {
    #[serde(default = "default_mode")]
    pub mode: Mode,

    /// Longest input (in characters) still routed to a local backend in hybrid mode
    #[serde(default = "default_hybrid_local_max_chars")]
    pub hybrid_local_max_chars: usize,

    /// How long an availability probe result is reused
    #[serde(default = "default_availability_ttl_secs")]
    pub availability_ttl_secs: u64,

    #[serde(default = "default_local_timeout_secs")]
    pub local_timeout_secs: u64,

    #[serde(default = "default_cloud_timeout_secs")]
    pub cloud_timeout_secs: u64,

    #[serde(default = "ProviderConfig::ollama")]
    pub ollama: ProviderConfig,

    #[serde(default = "ProviderConfig::openai")]
    pub openai: ProviderConfig,

    #[serde(default = "ProviderConfig::anthropic")]
    pub anthropic: ProviderConfig,

    #[serde(default = "ProviderConfig::gemini")]
    pub gemini: ProviderConfig,

    #[serde(default)]
    pub preferred: PreferredBackends,
}

impl Default for BackendsConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            hybrid_local_max_chars: default_hybrid_local_max_chars(),
            availability_ttl_secs: default_availability_ttl_secs(),
            local_timeout_secs: default_local_timeout_secs(),
            cloud_timeout_secs: default_cloud_timeout_secs(),
            ollama: ProviderConfig::ollama(),
            openai: ProviderConfig::openai(),
            anthropic: ProviderConfig::anthropic(),
            gemini: ProviderConfig::gemini(),
            preferred: PreferredBackends::default(),
        }
    }
}

/// Backend tried first for a kind of call, ahead of the mode's order
///
/// ```toml
/// [backends.preferred]
/// planning = "anthropic"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferredBackends {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub planning: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// Names accepted in `[backends.preferred]`
pub const BACKEND_NAMES: [&str; 4] = ["ollama", "openai", "anthropic", "gemini"];

/// Settings for one provider
///
/// Cloud API keys are read from the environment variable named by
/// `api_key_env`; they never live in the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    pub base_url: String,

    pub model: String,

    /// Lower values are tried first
    #[serde(default)]
    pub priority: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
}

impl ProviderConfig {
    fn ollama() -> Self {
        Self {
            enabled: true,
            base_url: "http://localhost:11434".to_string(),
            model: "llama3.1:8b".to_string(),
            priority: 0,
            api_key_env: None,
        }
    }

    fn openai() -> Self {
        Self {
            enabled: true,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            priority: 1,
            api_key_env: Some("OPENAI_API_KEY".to_string()),
        }
    }

    fn anthropic() -> Self {
        Self {
            enabled: true,
            base_url: "https://api.anthropic.com/v1".to_string(),
            model: "claude-3-5-sonnet-20241022".to_string(),
            priority: 2,
            api_key_env: Some("ANTHROPIC_API_KEY".to_string()),
        }
    }

    fn gemini() -> Self {
        Self {
            enabled: true,
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: "gemini-1.5-pro".to_string(),
            priority: 3,
            api_key_env: Some("GEMINI_API_KEY".to_string()),
        }
    }
}

/// Embedding source for semantic memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedderKind {
    /// Local feature hashing, works offline
    Hash,
    /// Ollama embeddings endpoint
    Ollama,
}

/// Memory system configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Prior turns included in the context
    #[serde(default = "default_context_window")]
    pub context_window: usize,

    /// Semantic matches included in the context
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Minimum cosine similarity for a semantic match
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    /// Store every turn as a searchable snippet
    #[serde(default = "default_true")]
    pub auto_capture: bool,

    #[serde(default = "default_embedder")]
    pub embedder: EmbedderKind,

    #[serde(default = "default_embedding_dims")]
    pub embedding_dims: usize,

    /// Model used by the Ollama embedder
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            context_window: default_context_window(),
            top_k: default_top_k(),
            similarity_threshold: default_similarity_threshold(),
            auto_capture: true,
            embedder: default_embedder(),
            embedding_dims: default_embedding_dims(),
            embedding_model: default_embedding_model(),
        }
    }
}

/// Intent classification strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentStrategy {
    Heuristic,
    Backend,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentConfig {
    #[serde(default = "default_intent_strategy")]
    pub strategy: IntentStrategy,
}

impl Default for IntentConfig {
    fn default() -> Self {
        Self {
            strategy: default_intent_strategy(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannerConfig {
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default = "default_step_timeout_secs")]
    pub step_timeout_secs: u64,

    /// Time in-flight steps get to finish after cancellation
    #[serde(default = "default_cancel_grace_secs")]
    pub cancel_grace_secs: u64,

    /// Concurrent steps per plan; 0 runs the whole ready set at once
    #[serde(default)]
    pub max_concurrency: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            step_timeout_secs: default_step_timeout_secs(),
            cancel_grace_secs: default_cancel_grace_secs(),
            max_concurrency: 0,
        }
    }
}

impl ExecutorConfig {
    /// Effective concurrency limit, `None` when unbounded
    ///
    /// Steps wait on I/O rather than the CPU, so the default is not tied to
    /// the host's core count.
    pub fn concurrency(&self) -> Option<usize> {
        (self.max_concurrency > 0).then_some(self.max_concurrency)
    }
}

/// Policy gate configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Honour per-capability confirmation flags
    #[serde(default = "default_true")]
    pub require_confirmation: bool,

    /// Skip confirmation for read-only capabilities
    #[serde(default = "default_true")]
    pub auto_approve_read_only: bool,

    /// Filesystem roots path parameters must stay within (supports ~ expansion)
    #[serde(default = "default_allowed_roots")]
    pub allowed_roots: Vec<PathBuf>,

    /// `module.capability` names allowed; empty allows everything registered
    #[serde(default)]
    pub allowed_capabilities: Vec<String>,

    /// `module.capability` names always denied
    #[serde(default)]
    pub denied_capabilities: Vec<String>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            require_confirmation: true,
            auto_approve_read_only: true,
            allowed_roots: default_allowed_roots(),
            allowed_capabilities: Vec::new(),
            denied_capabilities: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModulesConfig {
    #[serde(default = "default_enabled_modules")]
    pub enabled: Vec<String>,
}

impl Default for ModulesConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled_modules(),
        }
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("~/.badi")
}

fn default_mode() -> Mode {
    Mode::Hybrid
}

fn default_hybrid_local_max_chars() -> usize {
    280
}

fn default_availability_ttl_secs() -> u64 {
    5
}

fn default_local_timeout_secs() -> u64 {
    120
}

fn default_cloud_timeout_secs() -> u64 {
    60
}

fn default_context_window() -> usize {
    10
}

fn default_top_k() -> usize {
    5
}

fn default_similarity_threshold() -> f32 {
    0.25
}

fn default_embedder() -> EmbedderKind {
    EmbedderKind::Hash
}

fn default_embedding_dims() -> usize {
    256
}

fn default_embedding_model() -> String {
    "nomic-embed-text".to_string()
}

fn default_intent_strategy() -> IntentStrategy {
    IntentStrategy::Heuristic
}

fn default_max_steps() -> usize {
    10
}

fn default_step_timeout_secs() -> u64 {
    30
}

fn default_cancel_grace_secs() -> u64 {
    5
}

fn default_allowed_roots() -> Vec<PathBuf> {
    vec![PathBuf::from("~")]
}

fn default_enabled_modules() -> Vec<String> {
    vec!["system_control".to_string(), "memory_tools".to_string()]
}

impl Config {
    /// Load configuration from the default location (~/.badi/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if
    /// validation fails.
    pub fn load_or_create() -> Result<Self, EngineError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;

        let mut config = Self::from_toml_str(&contents)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate_and_process()?;

        Ok(config)
    }

    /// Parse configuration text without validation
    pub fn from_toml_str(contents: &str) -> Result<Self, EngineError> {
        toml::from_str(contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Create default configuration and save to path
    fn create_default(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        // Persist the unexpanded form so the file stays portable
        let toml_string = toml::to_string_pretty(&Self::default())
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| EngineError::Config(format!("Failed to write config file: {}", e)))?;

        let mut config = Self::default();
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate_and_process()?;

        Ok(config)
    }

    /// Get the default configuration file path (~/.badi/config.toml)
    pub fn default_config_path() -> Result<PathBuf, EngineError> {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".badi").join("config.toml"))
    }

    /// Apply `BADI_*` overrides using `lookup` to read variables
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), EngineError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(mode) = lookup("BADI_MODE") {
            self.backends.mode = mode.parse()?;
        }
        if let Some(dir) = lookup("BADI_DATA_DIR") {
            self.core.data_dir = PathBuf::from(dir);
        }
        if let Some(level) = lookup("BADI_LOG_LEVEL") {
            self.core.log_level = level.trim().to_lowercase();
        }
        Ok(())
    }

    /// Path of the SQLite database inside the data directory
    pub fn database_path(&self) -> PathBuf {
        self.core.data_dir.join("badi.db")
    }

    /// Validate and process configuration
    ///
    /// Checks ranges, expands `~` in paths and creates the data directory.
    pub fn validate_and_process(&mut self) -> Result<(), EngineError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        let threshold = self.memory.similarity_threshold;
        if !(-1.0..=1.0).contains(&threshold) {
            return Err(EngineError::Config(
                "similarity_threshold must be between -1.0 and 1.0".to_string(),
            ));
        }

        if self.memory.embedding_dims == 0 {
            return Err(EngineError::Config(
                "embedding_dims must be greater than zero".to_string(),
            ));
        }

        if self.planner.max_steps == 0 {
            return Err(EngineError::Config(
                "max_steps must be greater than zero".to_string(),
            ));
        }

        if self.executor.step_timeout_secs == 0
            || self.backends.local_timeout_secs == 0
            || self.backends.cloud_timeout_secs == 0
        {
            return Err(EngineError::Config(
                "timeouts must be greater than zero".to_string(),
            ));
        }

        let preferred = &self.backends.preferred;
        for name in [&preferred.chat, &preferred.planning, &preferred.summary]
            .into_iter()
            .flatten()
        {
            if !BACKEND_NAMES.contains(&name.as_str()) {
                return Err(EngineError::Config(format!(
                    "Unknown preferred backend '{}'. Must be one of: {}",
                    name,
                    BACKEND_NAMES.join(", ")
                )));
            }
        }

        for name in self
            .policy
            .allowed_capabilities
            .iter()
            .chain(&self.policy.denied_capabilities)
        {
            if !name.contains('.') {
                return Err(EngineError::Config(format!(
                    "Capability '{}' must be written as module.capability",
                    name
                )));
            }
        }

        self.core.data_dir = expand_path(&self.core.data_dir)?;
        if !self.core.data_dir.exists() {
            fs::create_dir_all(&self.core.data_dir).map_err(|e| {
                EngineError::Config(format!("Failed to create data directory: {}", e))
            })?;
        }

        self.policy.allowed_roots = self
            .policy
            .allowed_roots
            .iter()
            .map(|root| expand_path(root))
            .collect::<Result<_, _>>()?;

        Ok(())
    }
}

/// Expand ~ in path to user's home directory
pub(crate) fn expand_path(path: &Path) -> Result<PathBuf, EngineError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| EngineError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_values() {
        let config = Config::default();

        assert_eq!(config.core.log_level, "info");
        assert_eq!(config.backends.mode, Mode::Hybrid);
        assert_eq!(config.memory.context_window, 10);
        assert_eq!(config.memory.top_k, 5);
        assert_eq!(config.executor.step_timeout_secs, 30);
        assert_eq!(config.planner.max_steps, 10);
        assert!(config.policy.require_confirmation);
        assert!(config.policy.auto_approve_read_only);
        assert_eq!(
            config.modules.enabled,
            vec!["system_control".to_string(), "memory_tools".to_string()]
        );
    }

    #[test]
    fn test_zero_concurrency_is_unbounded() {
        let executor = ExecutorConfig::default();
        assert_eq!(executor.max_concurrency, 0);
        assert_eq!(executor.concurrency(), None);

        let capped = ExecutorConfig {
            max_concurrency: 3,
            ..ExecutorConfig::default()
        };
        assert_eq!(capped.concurrency(), Some(3));
    }

    #[test]
    fn test_preferred_backends_section() {
        let config = Config::from_toml_str(
            r#"
            [backends.preferred]
            planning = "anthropic"
            "#,
        )
        .unwrap();
        assert_eq!(config.backends.preferred.planning.as_deref(), Some("anthropic"));
        assert_eq!(config.backends.preferred.chat, None);
        assert_eq!(Config::default().backends.preferred, PreferredBackends::default());
    }

    #[test]
    fn test_unknown_preferred_backend_rejected() {
        let temp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.core.data_dir = temp.path().to_path_buf();
        config.backends.preferred.chat = Some("mistral".to_string());
        assert!(config.validate_and_process().is_err());
    }

    #[test]
    fn test_cloud_priority_order() {
        let b = BackendsConfig::default();
        assert!(b.openai.priority < b.anthropic.priority);
        assert!(b.anthropic.priority < b.gemini.priority);
    }

    #[test]
    fn test_empty_file_is_valid() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config = Config::from_toml_str(
            r#"
            [backends]
            mode = "local"

            [backends.openai]
            base_url = "http://127.0.0.1:9000"
            model = "test-model"
            "#,
        )
        .unwrap();

        assert_eq!(config.backends.mode, Mode::Local);
        assert_eq!(config.backends.openai.model, "test-model");
        assert!(config.backends.openai.enabled);
        assert_eq!(config.backends.ollama, ProviderConfig::ollama());
    }

    #[test]
    fn test_env_overrides() {
        let temp = TempDir::new().unwrap();
        let data_dir = temp.path().join("data");
        let data_dir_str = data_dir.to_str().unwrap().to_string();

        let mut config = Config::default();
        config
            .apply_env_overrides(|key| match key {
                "BADI_MODE" => Some("cloud".to_string()),
                "BADI_DATA_DIR" => Some(data_dir_str.clone()),
                "BADI_LOG_LEVEL" => Some("DEBUG".to_string()),
                _ => None,
            })
            .unwrap();
        config.validate_and_process().unwrap();

        assert_eq!(config.backends.mode, Mode::Cloud);
        assert_eq!(config.core.log_level, "debug");
        assert_eq!(config.core.data_dir, data_dir);
        assert!(data_dir.is_dir());
    }

    #[test]
    fn test_invalid_mode_override_rejected() {
        let mut config = Config::default();
        let result = config.apply_env_overrides(|key| {
            (key == "BADI_MODE").then(|| "turbo".to_string())
        });
        assert!(matches!(result, Err(EngineError::Config(_))));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let temp = TempDir::new().unwrap();

        let mut config = Config::default();
        config.core.data_dir = temp.path().to_path_buf();
        config.core.log_level = "loud".to_string();
        assert!(config.validate_and_process().is_err());

        let mut config = Config::default();
        config.core.data_dir = temp.path().to_path_buf();
        config.executor.step_timeout_secs = 0;
        assert!(config.validate_and_process().is_err());

        let mut config = Config::default();
        config.core.data_dir = temp.path().to_path_buf();
        config.policy.denied_capabilities = vec!["move_old_files".to_string()];
        assert!(config.validate_and_process().is_err());
    }

    #[test]
    fn test_expand_path_with_tilde() {
        let path = PathBuf::from("~/test");
        let expanded = expand_path(&path).unwrap();

        let home = dirs::home_dir().unwrap();
        assert_eq!(expanded, home.join("test"));
    }

    #[test]
    fn test_expand_path_without_tilde() {
        let path = PathBuf::from("/absolute/path");
        assert_eq!(expand_path(&path).unwrap(), path);
    }

    #[test]
    fn test_load_from_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        let data_dir = temp.path().join("store");
        fs::write(
            &path,
            format!(
                "[core]\ndata_dir = {:?}\n\n[memory]\ntop_k = 3\n",
                data_dir.to_str().unwrap()
            ),
        )
        .unwrap();

        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.memory.top_k, 3);
        assert_eq!(config.database_path(), data_dir.join("badi.db"));
    }
}
