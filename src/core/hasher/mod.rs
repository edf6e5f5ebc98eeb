//! # Hasher Module
//!
//! Computes perceptual hashes for images and regions of images.
//!
//! ## How It Works
//! 1. Crop to the requested region (if any)
//! 2. Composite transparency onto white, convert to RGB
//! 3. Compute a 16x16 DCT hash
//! 4. Compare hashes by normalized Hamming distance
//!
//! The rest of the crate only depends on the [`ImageHasher`] trait, so the
//! algorithm can be swapped as long as its [`HashDescriptor`] changes too.
//!
//! ## Example
//! ```rust,ignore
//! use photo_lookup::core::hasher::{ImageHasher, PHashHasher};
//!
//! let hasher = PHashHasher::default();
//! let hash = hasher.create_hash(&image, None)?;
//! ```

mod perceptual;
mod traits;

pub use perceptual::{PHashHasher, DEFAULT_HASH_SIZE};
pub use traits::{HashDescriptor, ImageHasher, PerceptualHash};
