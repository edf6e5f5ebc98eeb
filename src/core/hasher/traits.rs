//! Trait definitions for perceptual hashing.

use crate::core::detector::BoundingBox;
use crate::error::HashError;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A computed perceptual hash.
///
/// Stored and transmitted as lowercase hex. Two hashes are only comparable
/// when produced by hashers with the same [`HashDescriptor`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PerceptualHash {
    bytes: Vec<u8>,
}

impl PerceptualHash {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Get the hash as a hexadecimal string
    pub fn to_hex(&self) -> String {
        self.bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }

    pub fn from_hex(hex: &str) -> Result<Self, HashError> {
        let invalid = |reason: &str| HashError::InvalidHash {
            value: hex.to_string(),
            reason: reason.to_string(),
        };

        if hex.len() % 2 != 0 {
            return Err(invalid("odd number of hex digits"));
        }
        let bytes = (0..hex.len())
            .step_by(2)
            .map(|i| {
                hex.get(i..i + 2)
                    .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                    .ok_or_else(|| invalid("not a hex string"))
            })
            .collect::<Result<Vec<u8>, _>>()?;
        Ok(Self { bytes })
    }

    /// Get the total number of bits in this hash
    pub fn bit_count(&self) -> u32 {
        (self.bytes.len() * 8) as u32
    }

    /// Number of differing bits.
    ///
    /// Bits present in only one of the two hashes count as differing.
    pub fn hamming_distance(&self, other: &Self) -> u32 {
        let shared: u32 = self
            .bytes
            .iter()
            .zip(&other.bytes)
            .map(|(a, b)| (a ^ b).count_ones())
            .sum();
        let unmatched = self.bytes.len().abs_diff(other.bytes.len()) as u32 * 8;
        shared + unmatched
    }

    /// Hamming distance divided by the longer hash's bit count, in `[0, 1]`.
    pub fn normalized_distance(&self, other: &Self) -> f64 {
        let max_bits = self.bit_count().max(other.bit_count());
        if max_bits == 0 {
            return 0.0;
        }
        self.hamming_distance(other) as f64 / max_bits as f64
    }
}

impl fmt::Display for PerceptualHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for PerceptualHash {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl TryFrom<String> for PerceptualHash {
    type Error = HashError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl From<PerceptualHash> for String {
    fn from(hash: PerceptualHash) -> Self {
        hash.to_hex()
    }
}

/// Identifies the algorithm and parameters behind a set of hashes.
///
/// Recorded in index metadata; a changed descriptor means stored hashes
/// can no longer be compared against new ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashDescriptor {
    #[serde(rename = "type")]
    pub kind: String,
    pub version: u32,
    pub hash_size: u32,
    pub hash_format: String,
}

/// Trait for hash algorithm implementations
pub trait ImageHasher: Send + Sync {
    /// Hash `image`, or only the `region` of it when given.
    fn create_hash(&self, image: &DynamicImage, region: Option<BoundingBox>) -> Result<PerceptualHash, HashError>;

    /// Distance in `[0, 1]`; 0 means identical.
    fn compute_distance(&self, a: &PerceptualHash, b: &PerceptualHash) -> f64 {
        a.normalized_distance(b)
    }

    fn descriptor(&self) -> HashDescriptor;
}
