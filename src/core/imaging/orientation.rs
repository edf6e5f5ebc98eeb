//! EXIF orientation handling.
//!
//! Phone and scanner output is often stored sideways with an EXIF
//! Orientation tag describing how to display it. Everything downstream
//! (detection, hashing) must see the upright image, so the tag is applied
//! right after decoding.

use exif::{In, Reader, Tag};
use image::DynamicImage;
use std::io::Cursor;

/// Read the EXIF orientation (1-8) from encoded image bytes.
///
/// Returns `None` when the container has no EXIF block or no usable tag.
pub fn read_orientation(bytes: &[u8]) -> Option<u32> {
    let mut cursor = Cursor::new(bytes);
    let exif = Reader::new().read_from_container(&mut cursor).ok()?;
    let field = exif.get_field(Tag::Orientation, In::PRIMARY)?;
    field.value.get_uint(0).filter(|value| (1..=8).contains(value))
}

/// Rotate/flip an image so the EXIF orientation becomes 1 (upright).
pub fn apply_orientation(image: DynamicImage, orientation: u32) -> DynamicImage {
    match orientation {
        2 => image.fliph(),
        3 => image.rotate180(),
        4 => image.flipv(),
        5 => image.rotate90().fliph(),
        6 => image.rotate90(),
        7 => image.rotate270().fliph(),
        8 => image.rotate270(),
        _ => image,
    }
}
