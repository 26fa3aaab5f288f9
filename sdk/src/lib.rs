//! B.A.D.I. SDK
//!
//! Shared library providing the capability module contract and the error
//! taxonomy. This crate is used by the engine and by capability modules.

/// Capability module trait and descriptors
pub mod capability;

/// Error types and handling
pub mod errors;

/// Capability input/output types
pub mod types;

// Re-export commonly used types
pub use capability::{CapabilityModule, CapabilitySpec, ParamSpec, ParamType};
pub use errors::{BadiErrorExt, EngineError};
pub use types::{CapabilityInput, CapabilityOutput};
