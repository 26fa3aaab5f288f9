//! Capability module trait and descriptors
//!
//! A capability module groups related actions (capabilities) under one name.
//! Each capability declares its parameter schema and whether it needs user
//! confirmation. The engine validates every invocation against that schema
//! before the module sees it.

use crate::errors::EngineError;
use crate::types::{CapabilityInput, CapabilityOutput};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// A named module exposing a fixed set of capabilities
///
/// Modules are registered once at startup and never change afterwards, so
/// `capabilities` must return the same descriptors on every call.
#[async_trait]
pub trait CapabilityModule: Send + Sync {
    /// Returns the module name used in `module.capability` references
    fn name(&self) -> &str;

    /// Returns a one-line human description
    fn description(&self) -> &str;

    /// Returns the capabilities this module exposes
    fn capabilities(&self) -> &[CapabilitySpec];

    /// Run a capability with already validated parameters
    async fn invoke(
        &self,
        capability: &str,
        input: CapabilityInput,
    ) -> Result<CapabilityOutput, EngineError>;
}

/// Declared type of a capability parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    String,
    Integer,
    Float,
    Bool,
    List,
    Map,
    /// A filesystem path; checked against the allowed roots before invocation
    Path,
}

impl ParamType {
    /// Whether `value` is acceptable for this type
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            Self::String | Self::Path => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Float => value.is_number(),
            Self::Bool => value.is_boolean(),
            Self::List => value.is_array(),
            Self::Map => value.is_object(),
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::List => "list",
            Self::Map => "map",
            Self::Path => "path",
        };
        write!(f, "{}", name)
    }
}

/// One declared parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    pub param_type: ParamType,
    pub required: bool,
    pub default: Option<Value>,
    pub description: String,
}

impl ParamSpec {
    /// A parameter that must be supplied
    pub fn required(name: &str, param_type: ParamType, description: &str) -> Self {
        Self {
            name: name.to_string(),
            param_type,
            required: true,
            default: None,
            description: description.to_string(),
        }
    }

    /// A parameter that may be omitted
    pub fn optional(name: &str, param_type: ParamType, description: &str) -> Self {
        Self {
            required: false,
            ..Self::required(name, param_type, description)
        }
    }

    /// An optional parameter filled with `default` when omitted
    pub fn with_default(
        name: &str,
        param_type: ParamType,
        default: Value,
        description: &str,
    ) -> Self {
        Self {
            required: false,
            default: Some(default),
            ..Self::required(name, param_type, description)
        }
    }
}

/// Static descriptor of one capability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilitySpec {
    pub name: String,
    pub description: String,
    pub params: Vec<ParamSpec>,
    pub requires_confirmation: bool,
    /// Never changes state; eligible for automatic approval
    pub read_only: bool,
}

impl CapabilitySpec {
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            params: Vec::new(),
            requires_confirmation: false,
            read_only: false,
        }
    }

    pub fn param(mut self, param: ParamSpec) -> Self {
        self.params.push(param);
        self
    }

    pub fn requires_confirmation(mut self) -> Self {
        self.requires_confirmation = true;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// String values of every `Path`-typed parameter present in `params`
    pub fn path_values<'a>(&self, params: &'a Map<String, Value>) -> Vec<&'a str> {
        self.params
            .iter()
            .filter(|p| p.param_type == ParamType::Path)
            .filter_map(|p| params.get(&p.name).and_then(|v| v.as_str()))
            .collect()
    }

    /// Compact signature used in planner prompts, e.g. `scan_directory(path: path, recursive?: bool)`
    pub fn signature(&self) -> String {
        let params: Vec<String> = self
            .params
            .iter()
            .map(|p| {
                let marker = if p.required { "" } else { "?" };
                format!("{}{}: {}", p.name, marker, p.param_type)
            })
            .collect();
        format!("{}({})", self.name, params.join(", "))
    }

    /// Check `params` against the declared schema
    ///
    /// Unknown keys, type mismatches and missing required parameters are
    /// rejected. Omitted parameters with a declared default are filled in;
    /// `null` counts as omitted.
    pub fn validate(&self, params: &Map<String, Value>) -> Result<CapabilityInput, EngineError> {
        for key in params.keys() {
            if !self.params.iter().any(|p| &p.name == key) {
                return Err(EngineError::Parameter(format!(
                    "unknown parameter '{}' for {}",
                    key, self.name
                )));
            }
        }

        let mut validated = Map::new();
        for spec in &self.params {
            match params.get(&spec.name).filter(|v| !v.is_null()) {
                Some(value) => {
                    if !spec.param_type.accepts(value) {
                        return Err(EngineError::Parameter(format!(
                            "parameter '{}' of {} must be a {}",
                            spec.name, self.name, spec.param_type
                        )));
                    }
                    validated.insert(spec.name.clone(), value.clone());
                }
                None => {
                    if let Some(default) = &spec.default {
                        validated.insert(spec.name.clone(), default.clone());
                    } else if spec.required {
                        return Err(EngineError::Parameter(format!(
                            "missing parameter '{}' for {}",
                            spec.name, self.name
                        )));
                    }
                }
            }
        }

        Ok(CapabilityInput {
            params: validated,
            owner: None,
        })
    }
}
