//! Request handling
//!
//! The router is the single entry point front ends call; it classifies each
//! request, enriches it with memory and dispatches it to chat or to the
//! planner and executor.

pub mod intent;
pub mod router;

pub use intent::{BackendClassifier, HeuristicClassifier, Intent, IntentClassifier, IntentKind};
pub use router::{Request, Response, Router};
