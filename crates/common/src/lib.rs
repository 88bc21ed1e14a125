//! Cliploom Common Utilities
//!
//! Shared infrastructure for all Cliploom crates:
//! - Error types and result aliases
//! - Render clock and paint-tick cadence utilities
//! - Tracing/logging initialization
//! - Configuration loading

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
