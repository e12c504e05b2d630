//! Naya Capture Engine
//!
//! Turns a live render surface into a stored clip. A recording session
//! samples the surface on a fixed frame schedule, streams frames to an
//! encoder running off the async runtime, and commits the finished payload
//! to the clip store in one step.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │               RecordingSession                │
//! │  ┌──────────────┐  frames  ┌────────────────┐ │
//! │  │ RenderSurface│ ───────▶ │ VideoEncoder   │ │
//! │  │ (tick loop)  │  mpsc    │ (blocking task)│ │
//! │  └──────────────┘          └───────┬────────┘ │
//! │                                    │ payload  │
//! │                                    ▼          │
//! │  ┌─────────────────────────────────────────┐  │
//! │  │   thumbnail + ClipStore::put (atomic)   │  │
//! │  └─────────────────────────────────────────┘  │
//! └───────────────────────────────────────────────┘
//! ```

pub mod session;
pub mod surface;

pub use session::*;
pub use surface::*;
