//! Naya Common Utilities
//!
//! Shared infrastructure for all Naya crates:
//! - Error types and result aliases
//! - Clock and frame-scheduling utilities for capture and export
//! - Tracing/logging initialization
//! - Configuration loading

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
