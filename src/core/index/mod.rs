//! # Index Module
//!
//! The persistent perceptual-hash index over the image library.
//!
//! ## Components
//! - `builder` - Hashes discovered files in batches, sequentially or on a
//!   rayon pool
//! - `store` - Owns the index: build, incremental update, lookup, and the
//!   atomic JSON snapshot at `<data_dir>/index.json`
//! - `types` - Entries, metadata and lookup results
//!
//! ## Snapshot Format
//! ```json
//! {
//!   "meta": { "hash": {...}, "created_at": "...", "operation": "build", ... },
//!   "items": { "<image_id>": { "path": "/photos/a.jpg", "hash": "<hex>" } }
//! }
//! ```
//!
//! Lookup is a linear scan over every entry. That is fine for libraries of
//! thousands of images; it is not meant for millions.

mod builder;
mod store;
mod types;

pub use builder::{
    max_workers, resolve_workers, BuildOutput, BuilderConfig, IndexBuilder, BATCH_TIMEOUT_ERROR,
    DEFAULT_BATCH_SIZE, DEFAULT_BATCH_TIMEOUT,
};
pub use store::{IndexSettings, IndexStore};
pub use types::{
    image_id, mime_type_for, ImageBlob, IndexData, IndexEntry, IndexItem, IndexMetadata, IndexOperation, IndexStats,
    MatchResult,
};
