//! # scribe-core
//!
//! Core types, traits, and abstractions for the scribe transcription backend.
//!
//! This crate provides the foundational data structures, the error taxonomy,
//! plan definitions, and the trait seams that other scribe crates depend on.

pub mod defaults;
pub mod error;
pub mod events;
pub mod logging;
pub mod models;
pub mod plans;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, LimitKind, Result};
pub use events::{EventBus, ServerEvent};
pub use models::*;
pub use plans::{PlanGuard, PlanLimits, PlanResolver, PlanTier};
pub use traits::*;
