//! Naya Project Model
//!
//! Defines the core data contracts shared by capture, storage and export:
//! - **Clip:** identifiers, stored metadata and metadata patches
//! - **Timeline:** ordered clip references with derived contiguous timing
//! - **Codec:** the statically-known codec/container variants
//!
//! All times are in seconds. Timeline entries are half-open intervals
//! `[start, end)` that partition `[0, total_duration)`.

pub mod clip;
pub mod codec;
pub mod timeline;

pub use clip::*;
pub use codec::*;
pub use timeline::*;
