//! mv-core: shared types, IDs, errors and configuration.
//!
//! This crate is the foundational dependency for all other mv-* crates,
//! providing type-safe identifiers, a unified error type, the export domain
//! model and application configuration.

pub mod config;
pub mod error;
pub mod export;
pub mod ids;

// Re-export the most commonly used items at the crate root.
pub use error::{Error, Result};
pub use export::*;
pub use ids::*;
