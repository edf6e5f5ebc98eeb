//! Fast image decoding with format-specific optimizations.
//!
//! Uses zune-jpeg for JPEG data (1.5-2x faster than image crate),
//! falls back to image crate for other formats.

use crate::error::HashError;
use image::{DynamicImage, ImageBuffer, Luma, Rgb, Rgba};
use std::path::Path;
use zune_core::colorspace::ColorSpace;
use zune_core::options::DecoderOptions;
use zune_jpeg::JpegDecoder;

/// Fast image decoder that picks the decoder from the data's magic bytes
pub struct FastDecoder;

impl FastDecoder {
    /// Decode an in-memory image.
    ///
    /// `origin` is only used in error messages; uploads pass an empty path.
    pub fn decode(bytes: &[u8], origin: &Path) -> Result<DynamicImage, HashError> {
        if bytes.is_empty() {
            return Err(HashError::EmptyImage {
                path: origin.to_path_buf(),
            });
        }

        if is_jpeg(bytes) {
            Self::decode_jpeg(bytes, origin).or_else(|_| Self::decode_fallback(bytes, origin))
        } else {
            Self::decode_fallback(bytes, origin)
        }
    }

    /// Fast JPEG decoding using zune-jpeg
    fn decode_jpeg(bytes: &[u8], origin: &Path) -> Result<DynamicImage, HashError> {
        let options = DecoderOptions::new_fast().jpeg_set_out_colorspace(ColorSpace::RGB);
        let mut decoder = JpegDecoder::new_with_options(bytes, options);

        let pixels = decoder.decode().map_err(|e| HashError::DecodeError {
            path: origin.to_path_buf(),
            reason: format!("zune-jpeg decode failed: {:?}", e),
        })?;

        let info = decoder.info().ok_or_else(|| HashError::DecodeError {
            path: origin.to_path_buf(),
            reason: "Failed to get image info".to_string(),
        })?;

        let width = info.width as u32;
        let height = info.height as u32;
        let buffer_error = |kind: &str| HashError::DecodeError {
            path: origin.to_path_buf(),
            reason: format!("Failed to create {} buffer", kind),
        };

        let image = match decoder.get_output_colorspace().unwrap_or(ColorSpace::RGB) {
            ColorSpace::RGB => {
                let buffer: ImageBuffer<Rgb<u8>, Vec<u8>> =
                    ImageBuffer::from_raw(width, height, pixels).ok_or_else(|| buffer_error("RGB"))?;
                DynamicImage::ImageRgb8(buffer)
            }
            ColorSpace::RGBA => {
                let buffer: ImageBuffer<Rgba<u8>, Vec<u8>> =
                    ImageBuffer::from_raw(width, height, pixels).ok_or_else(|| buffer_error("RGBA"))?;
                DynamicImage::ImageRgba8(buffer)
            }
            ColorSpace::Luma => {
                let buffer: ImageBuffer<Luma<u8>, Vec<u8>> =
                    ImageBuffer::from_raw(width, height, pixels).ok_or_else(|| buffer_error("Luma"))?;
                DynamicImage::ImageLuma8(buffer)
            }
            _ => return Self::decode_fallback(bytes, origin),
        };

        Ok(image)
    }

    /// Fallback to image crate, format guessed from content
    fn decode_fallback(bytes: &[u8], origin: &Path) -> Result<DynamicImage, HashError> {
        image::load_from_memory(bytes).map_err(|e| HashError::DecodeError {
            path: origin.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

fn is_jpeg(bytes: &[u8]) -> bool {
    bytes.starts_with(&[0xFF, 0xD8, 0xFF])
}
