//! Naya Clip Store
//!
//! Owns every clip payload. Metadata and payload are committed together
//! and become visible together; a clip is written in full or not at all.
//!
//! ```text
//! <root>/
//! ├── clips/<id>/meta.json     published clips
//! ├── clips/<id>/payload.bin
//! ├── staging/<id>/            writes in progress (swept on open)
//! └── trash/                   deletes in progress (swept on open)
//! ```

pub mod fs;
pub mod memory;
pub mod store;

pub use fs::FsClipStore;
pub use memory::MemoryClipStore;
pub use store::*;
