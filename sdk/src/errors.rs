//! Error types and handling
//!
//! This module provides the error types used throughout the B.A.D.I. runtime.
//! All errors implement the `BadiErrorExt` trait which provides user-friendly
//! hints, a stable failure kind, and whether the error is recoverable.
//!
//! # Security
//!
//! Hints returned by `user_hint` are static strings. They never contain
//! API keys, raw backend output or file paths, so they are safe to show to
//! whoever sent the request.

use thiserror::Error;

/// Trait for B.A.D.I. error extensions
pub trait BadiErrorExt {
    /// Returns a plain-language hint for the error
    fn user_hint(&self) -> &str;

    /// Returns the stable snake_case failure kind reported alongside responses
    fn kind(&self) -> &'static str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors affect a single step or degrade a single request.
    /// Non-recoverable errors abort the request.
    fn is_recoverable(&self) -> bool;
}

/// Main engine error type
///
/// # Error Categories
///
/// - **Request**: classification, planning, backend availability
/// - **Step**: parameters, policy, timeouts, capability failures
/// - **Memory**: persistence and retrieval failures
/// - **File System**: path validation against the allowed roots
///
/// # Examples
///
/// ```
/// use badi_sdk::errors::{BadiErrorExt, EngineError};
///
/// let error = EngineError::Parameter("missing key 'path'".to_string());
/// assert_eq!(error.kind(), "parameter_error");
/// assert!(error.is_recoverable());
///
/// let fatal = EngineError::NoBackendAvailable("no cloud backend configured".to_string());
/// assert!(!fatal.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum EngineError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Database errors
    #[error("Database error: {0}")]
    Database(String),

    // Request pipeline errors
    #[error("Classification failed: {0}")]
    Classification(String),

    #[error("Could not build a plan: {0}")]
    Planning(String),

    #[error("No backend available: {0}")]
    NoBackendAvailable(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Memory gateway error: {0}")]
    MemoryGateway(String),

    // Step errors
    #[error("Invalid parameters: {0}")]
    Parameter(String),

    #[error("Denied by policy: {0}")]
    PolicyDenied(String),

    #[error("Step timed out after {0} seconds")]
    StepTimeout(u64),

    #[error("Unknown capability: {0}")]
    UnknownCapability(String),

    #[error("Capability failed: {0}")]
    Capability(String),

    #[error("Cancelled")]
    Cancelled,

    // File system security errors
    #[error("Path denied: {0:?}")]
    PathDenied(std::path::PathBuf),

    #[error("Path outside allowed roots: {0:?}")]
    PathOutsideRoots(std::path::PathBuf),

    #[error("Path canonicalization failed for {0:?}: {1}")]
    PathCanonicalization(std::path::PathBuf, String),

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BadiErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            Self::Config(_) => "Check your config.toml file for errors",
            Self::Database(_) => "Local storage failed. Check the data directory permissions",

            Self::Classification(_) => "I could not tell what you meant, so I answered as a chat",
            Self::Planning(_) => "I could not build a plan for that request. Try rephrasing it",
            Self::NoBackendAvailable(_) => {
                "No language model is available right now. Check Ollama or your API keys"
            }
            Self::Backend(_) => "The language model failed to answer. Try again",
            Self::MemoryGateway(_) => "Memory is unavailable, so I answered without context",

            Self::Parameter(_) => "The action was given invalid parameters",
            Self::PolicyDenied(_) => "That action is not permitted by your policy settings",
            Self::StepTimeout(_) => "The action took too long and was stopped",
            Self::UnknownCapability(_) => "The requested action is not available",
            Self::Capability(_) => "The action failed",
            Self::Cancelled => "The request was cancelled",

            Self::PathDenied(_) => "Access to this path is not allowed",
            Self::PathOutsideRoots(_) => "That path is outside the folders I may touch",
            Self::PathCanonicalization(_, _) => "Invalid path specified",

            Self::Io(_) => "File system operation failed",
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config_error",
            Self::Database(_) => "database_error",
            Self::Classification(_) => "classification_error",
            Self::Planning(_) => "planning_error",
            Self::NoBackendAvailable(_) => "no_backend_available",
            Self::Backend(_) => "backend_error",
            Self::MemoryGateway(_) => "memory_gateway_error",
            Self::Parameter(_) => "parameter_error",
            Self::PolicyDenied(_)
            | Self::PathDenied(_)
            | Self::PathOutsideRoots(_) => "policy_denied",
            Self::StepTimeout(_) => "timeout",
            Self::UnknownCapability(_) => "unknown_capability",
            Self::Capability(_) | Self::PathCanonicalization(_, _) | Self::Io(_) => {
                "capability_error"
            }
            Self::Cancelled => "cancelled",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            // These abort the request
            Self::Config(_) | Self::Planning(_) | Self::NoBackendAvailable(_) => false,

            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_path_errors_report_policy_denied() {
        assert_eq!(
            EngineError::PathOutsideRoots(PathBuf::from("/etc")).kind(),
            "policy_denied"
        );
        assert_eq!(
            EngineError::PathDenied(PathBuf::from(".ssh")).kind(),
            "policy_denied"
        );
    }

    #[test]
    fn test_abort_paths_are_not_recoverable() {
        assert!(!EngineError::Planning("cycle".into()).is_recoverable());
        assert!(!EngineError::NoBackendAvailable("none".into()).is_recoverable());
        assert!(EngineError::StepTimeout(30).is_recoverable());
        assert!(EngineError::MemoryGateway("locked".into()).is_recoverable());
    }

    #[test]
    fn test_hints_do_not_leak_paths() {
        let err = EngineError::PathDenied(PathBuf::from("/home/user/.ssh/id_rsa"));
        assert!(!err.user_hint().contains("id_rsa"));
        assert!(err.to_string().contains("id_rsa"));
    }
}
