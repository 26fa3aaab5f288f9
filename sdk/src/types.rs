//! Capability input/output types

use crate::errors::EngineError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Validated parameters handed to a capability invocation
///
/// Instances reaching a module have already been checked against the
/// capability's declared parameter schema, with declared defaults filled in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CapabilityInput {
    pub params: Map<String, Value>,
    /// Whose memory the invocation may read or write; set by the executor,
    /// never by plan parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

impl CapabilityInput {
    /// Create an empty input
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter
    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    /// Scope the invocation to `owner`
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    /// Get a string parameter
    pub fn param_str(&self, key: &str) -> Result<String, EngineError> {
        self.params
            .get(key)
            .and_then(|v| v.as_str())
            .map(String::from)
            .ok_or_else(|| missing(key))
    }

    /// Get an i64 parameter
    pub fn param_i64(&self, key: &str) -> Result<i64, EngineError> {
        self.params
            .get(key)
            .and_then(|v| v.as_i64())
            .ok_or_else(|| missing(key))
    }

    /// Get a bool parameter
    pub fn param_bool(&self, key: &str) -> Result<bool, EngineError> {
        self.params
            .get(key)
            .and_then(|v| v.as_bool())
            .ok_or_else(|| missing(key))
    }

    /// Get an optional string parameter
    pub fn param_str_opt(&self, key: &str) -> Option<String> {
        self.params
            .get(key)
            .and_then(|v| v.as_str())
            .map(String::from)
    }

    /// Get a list of strings, treating a missing key as empty
    pub fn param_str_list(&self, key: &str) -> Vec<String> {
        self.params
            .get(key)
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn missing(key: &str) -> EngineError {
    EngineError::Parameter(format!("missing parameter '{}'", key))
}

/// Output from a capability invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityOutput {
    pub success: bool,
    pub data: Value,
    pub error: Option<String>,
}

impl CapabilityOutput {
    /// Create a successful output with text
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            success: true,
            data: Value::String(text.into()),
            error: None,
        }
    }

    /// Create a successful output with JSON data
    pub fn json(data: Value) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }

    /// Create an error output
    pub fn error(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: Value::Null,
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::BadiErrorExt;
    use serde_json::json;

    #[test]
    fn test_param_str_missing_is_parameter_error() {
        let input = CapabilityInput::new();
        let err = input.param_str("path").unwrap_err();
        assert_eq!(err.kind(), "parameter_error");
    }

    #[test]
    fn test_param_accessors() {
        let input = CapabilityInput::new()
            .with_param("path", json!("/tmp"))
            .with_param("days", json!(30))
            .with_param("recursive", json!(true))
            .with_param("file_types", json!([".pdf", ".txt", 3]));

        assert_eq!(input.param_str("path").unwrap(), "/tmp");
        assert_eq!(input.param_i64("days").unwrap(), 30);
        assert!(input.param_bool("recursive").unwrap());
        assert_eq!(input.param_str_list("file_types"), vec![".pdf", ".txt"]);
        assert!(input.param_str_list("absent").is_empty());
        assert_eq!(input.param_str_opt("archive_path"), None);
    }

    #[test]
    fn test_output_constructors() {
        let ok = CapabilityOutput::text("done");
        assert!(ok.success);
        assert_eq!(ok.data, json!("done"));

        let err = CapabilityOutput::error("boom");
        assert!(!err.success);
        assert_eq!(err.error.as_deref(), Some("boom"));
    }
}
