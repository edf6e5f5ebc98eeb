//! # Imaging Module
//!
//! Turns files and uploaded bytes into upright, decoded images.
//!
//! Every image that reaches the detector or the hasher goes through
//! [`load_path`] or [`load_bytes`], so library files and query uploads are
//! decoded and orientation-corrected identically.
//!
//! ## Performance Optimizations
//! - `zune-jpeg` for JPEG decoding
//! - memory-mapped reads for files of 1MB and up
//! - `fast_image_resize` for the detector's grayscale downscale

pub mod fast_decode;
pub mod fast_resize;
pub mod mmap_read;
pub mod orientation;

use crate::error::HashError;
use fast_decode::FastDecoder;
use image::DynamicImage;
use std::path::Path;

/// Decode an image file and apply its EXIF orientation.
pub fn load_path(path: &Path) -> Result<DynamicImage, HashError> {
    let bytes = mmap_read::read_file_bytes(path)?;
    decode_upright(&bytes, path)
}

/// Decode uploaded image bytes and apply their EXIF orientation.
pub fn load_bytes(bytes: &[u8]) -> Result<DynamicImage, HashError> {
    decode_upright(bytes, Path::new("<upload>"))
}

fn decode_upright(bytes: &[u8], origin: &Path) -> Result<DynamicImage, HashError> {
    let image = FastDecoder::decode(bytes, origin)?;

    if image.width() == 0 || image.height() == 0 {
        return Err(HashError::EmptyImage {
            path: origin.to_path_buf(),
        });
    }

    Ok(match orientation::read_orientation(bytes) {
        Some(value) => orientation::apply_orientation(image, value),
        None => image,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    #[test]
    fn load_path_reads_png() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("photo.png");
        RgbImage::from_pixel(20, 10, Rgb([1, 2, 3])).save(&path).unwrap();

        let image = load_path(&path).unwrap();
        assert_eq!((image.width(), image.height()), (20, 10));
    }

    #[test]
    fn load_bytes_rejects_garbage() {
        assert!(load_bytes(b"definitely not pixels").is_err());
    }
}
