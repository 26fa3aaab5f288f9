//! Badi Engine Library
//!
//! The request routing, planning, execution and memory pipeline behind the
//! `badi` binary. It is used by both the binary and integration tests.

/// Configuration management module
pub mod config;

/// Telemetry and Observability
pub mod telemetry;

/// Database persistence module
pub mod db;

/// Memory gateway and embedders
pub mod memory;

/// Language-model backends and selection
pub mod llm;

/// Capability modules and registry
pub mod modules;

/// Per-step authorization
pub mod policy;

/// File system security module
pub mod fs_guard;

/// Planning and execution
pub mod conductor;

/// Request routing and intent classification
pub mod agent;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
