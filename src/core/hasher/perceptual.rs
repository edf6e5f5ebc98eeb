//! Perceptual Hash (pHash) implementation.
//!
//! pHash uses the Discrete Cosine Transform (DCT) to extract
//! frequency information from the image. This makes it robust to:
//! - Scaling
//! - Brightness/contrast changes
//! - Compression artifacts
//!
//! The image_hasher crate provides the transform; this module handles
//! region cropping and color normalization around it.

use super::traits::{HashDescriptor, ImageHasher, PerceptualHash};
use crate::core::detector::BoundingBox;
use crate::error::HashError;
use image::{DynamicImage, Rgb, RgbImage};
use image_hasher::{HashAlg, HasherConfig};

pub const DEFAULT_HASH_SIZE: u32 = 16;
/// Version 1 indexes hold median-threshold hashes from a different DCT
/// pipeline; they are not comparable with these.
const DESCRIPTOR_VERSION: u32 = 2;

/// DCT-based perceptual hasher
pub struct PHashHasher {
    hash_size: u32,
    hasher: image_hasher::Hasher,
}

impl PHashHasher {
    pub fn new(hash_size: u32) -> Self {
        let hasher = HasherConfig::new()
            .hash_size(hash_size, hash_size)
            .hash_alg(HashAlg::Mean)
            .preproc_dct()
            .to_hasher();

        Self { hash_size, hasher }
    }
}

impl Default for PHashHasher {
    fn default() -> Self {
        Self::new(DEFAULT_HASH_SIZE)
    }
}

impl ImageHasher for PHashHasher {
    fn create_hash(&self, image: &DynamicImage, region: Option<BoundingBox>) -> Result<PerceptualHash, HashError> {
        let cropped = match region {
            Some(bbox) => crop(image, bbox)?,
            None => image.clone(),
        };
        let normalized = flatten_to_rgb(&cropped);

        let hash = self.hasher.hash_image(&normalized);
        Ok(PerceptualHash::from_bytes(hash.as_bytes().to_vec()))
    }

    fn descriptor(&self) -> HashDescriptor {
        HashDescriptor {
            kind: "phash".to_string(),
            version: DESCRIPTOR_VERSION,
            hash_size: self.hash_size,
            hash_format: "hex".to_string(),
        }
    }
}

/// Crop to an inclusive box, clipped to the image first.
fn crop(image: &DynamicImage, bbox: BoundingBox) -> Result<DynamicImage, HashError> {
    let (width, height) = (image.width(), image.height());
    let region = bbox.clamped(width, height).ok_or_else(|| HashError::InvalidRegion {
        region: bbox.to_string(),
        width,
        height,
    })?;

    Ok(image.crop_imm(region.x0, region.y0, region.width(), region.height()))
}

/// Composite any transparency onto white and drop to 8-bit RGB.
fn flatten_to_rgb(image: &DynamicImage) -> DynamicImage {
    if !image.color().has_alpha() {
        return DynamicImage::ImageRgb8(image.to_rgb8());
    }

    let rgba = image.to_rgba8();
    let flattened = RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let over_white = |c: u8| ((c as u32 * a as u32 + 255 * (255 - a as u32)) / 255) as u8;
        Rgb([over_white(r), over_white(g), over_white(b)])
    });
    DynamicImage::ImageRgb8(flattened)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgba, RgbaImage};

    fn gradient_image(width: u32, height: u32) -> DynamicImage {
        let img = ImageBuffer::from_fn(width, height, |x, y| {
            let v = ((x * 7 + y * 3) % 256) as u8;
            Rgb([v, 255 - v, (x % 256) as u8])
        });
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn identical_images_produce_identical_hash() {
        let hasher = PHashHasher::default();
        let image = gradient_image(120, 90);

        let hash1 = hasher.create_hash(&image, None).unwrap();
        let hash2 = hasher.create_hash(&image, None).unwrap();

        assert_eq!(hash1, hash2);
        assert_eq!(hasher.compute_distance(&hash1, &hash2), 0.0);
    }

    #[test]
    fn hash_has_expected_bit_count() {
        let hash = PHashHasher::default().create_hash(&gradient_image(64, 64), None).unwrap();
        assert_eq!(hash.bit_count(), 256);
    }

    #[test]
    fn region_hash_matches_cropped_image() {
        let hasher = PHashHasher::default();
        let image = gradient_image(200, 150);
        let bbox = BoundingBox::new(20, 10, 119, 109);

        let via_region = hasher.create_hash(&image, Some(bbox)).unwrap();
        let via_crop = hasher.create_hash(&image.crop_imm(20, 10, 100, 100), None).unwrap();

        assert_eq!(via_region, via_crop);
    }

    #[test]
    fn oversized_region_is_clipped() {
        let hasher = PHashHasher::default();
        let image = gradient_image(100, 80);

        let clipped = hasher.create_hash(&image, Some(BoundingBox::new(0, 0, 5000, 5000))).unwrap();
        let whole = hasher.create_hash(&image, None).unwrap();

        assert_eq!(clipped, whole);
    }

    #[test]
    fn inverted_region_is_rejected() {
        let result = PHashHasher::default().create_hash(&gradient_image(100, 80), Some(BoundingBox::new(60, 0, 10, 10)));
        assert!(matches!(result, Err(HashError::InvalidRegion { .. })));
    }

    #[test]
    fn transparency_is_composited_onto_white() {
        let transparent = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 0])));
        let flattened = flatten_to_rgb(&transparent).to_rgb8();

        assert_eq!(flattened.get_pixel(0, 0), &Rgb([255, 255, 255]));
    }

    #[test]
    fn descriptor_reports_parameters() {
        let descriptor = PHashHasher::default().descriptor();

        assert_eq!(descriptor.kind, "phash");
        assert_eq!(descriptor.version, 2);
        assert_eq!(descriptor.hash_size, 16);
        assert_eq!(descriptor.hash_format, "hex");
    }
}
