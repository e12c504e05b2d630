//! Naya Render Engine
//!
//! Composes a timeline of stored clips into one new clip. Every output
//! frame comes from a single fixed-rate clock; source clips are resampled
//! against it by nearest frame, whatever rate they were recorded at.
//!
//! # Pipeline
//!
//! ```text
//! TimelineSnapshot
//!        │
//!        ▼
//! ┌──────────────┐  ClipStore::get   ┌───────────────┐
//! │   Loading    │ ────────────────▶ │ ClipDecoder×N │
//! └──────┬───────┘                   └───────┬───────┘
//!        ▼                                   │ seek / advance
//! ┌──────────────┐  compute_compositions     ▼
//! │  Rendering   │ ──────────────▶ OutputCanvas ──▶ VideoEncoder
//! └──────┬───────┘
//!        ▼
//! ┌──────────────┐
//! │  Finalizing  │ ──▶ ClipStore::put  or  payload for download
//! └──────────────┘
//! ```

pub mod compositor;
pub mod export;

pub use compositor::{compute_compositions, frame_count, FrameComposition, OutputCanvas};
pub use export::*;
