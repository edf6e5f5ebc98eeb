//! # Core Module
//!
//! The front-end-agnostic lookup engine.
//!
//! ## Modules
//! - `imaging` - Decodes files and uploads, applies EXIF orientation
//! - `detector` - Finds the photograph inside a scanned frame
//! - `hasher` - Computes perceptual hashes
//! - `scanner` - Discovers library images in directories
//! - `index` - Builds, persists and searches the hash index
//! - `coordinator` - Runs one background build at a time

pub mod coordinator;
pub mod detector;
pub mod hasher;
pub mod imaging;
pub mod index;
pub mod scanner;

// Re-export commonly used types
pub use detector::{detect_main_region, BoundingBox};
pub use hasher::{ImageHasher, PHashHasher, PerceptualHash};
pub use index::{IndexStore, MatchResult};
