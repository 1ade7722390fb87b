//! Loopforge Common Utilities
//!
//! Shared infrastructure for all Loopforge crates:
//! - Error types and result aliases
//! - Pacing utilities: readiness polling, cancellation, progress throttling
//! - Tracing/logging initialization
//! - Engine configuration loading

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
