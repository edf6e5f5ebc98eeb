//! # Scanner Module
//!
//! Discovers image files in library directories.
//!
//! Discovery is lazy: paths are yielded while the walk is still in
//! progress, so the index builder can start hashing before the listing is
//! complete. A library entry may also name a single file.
//!
//! ## Default Formats
//! - JPEG (.jpg, .jpeg)
//! - PNG (.png)
//! - TIFF (.tif, .tiff)
//! - WebP (.webp)
//!
//! ## Example
//! ```rust,ignore
//! use photo_lookup::core::scanner::{ImageFilter, LibraryScanner, ScanConfig, WalkDirScanner};
//!
//! let scanner = WalkDirScanner::new(ScanConfig::default(), ImageFilter::new());
//! for path in scanner.discover(&["/Users/photos".into()]) {
//!     println!("{}", path.display());
//! }
//! ```

mod filter;
mod walker;

pub use filter::{normalize_extension, ImageFilter, DEFAULT_EXTENSIONS};
pub use walker::{ScanConfig, WalkDirScanner};

use std::path::PathBuf;

/// Trait for library scanners
///
/// Implement this trait to feed the index builder from another source
/// (e.g., a fixed list in tests).
pub trait LibraryScanner: Send + Sync {
    /// Lazily yield every matching file under `roots`.
    ///
    /// Missing roots are logged and skipped.
    fn discover<'a>(&'a self, roots: &'a [PathBuf]) -> Box<dyn Iterator<Item = PathBuf> + 'a>;
}
