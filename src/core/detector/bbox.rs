use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Inclusive pixel rectangle `(x0, y0, x1, y1)`.
///
/// Serialized as a four-element array so it travels as `[x0, y0, x1, y1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[u32; 4]", into = "[u32; 4]")]
pub struct BoundingBox {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl BoundingBox {
    pub fn new(x0: u32, y0: u32, x1: u32, y1: u32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// The whole image. Callers guarantee non-zero dimensions.
    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width.saturating_sub(1), height.saturating_sub(1))
    }

    pub fn width(&self) -> u32 {
        self.x1.saturating_sub(self.x0) + 1
    }

    pub fn height(&self) -> u32 {
        self.y1.saturating_sub(self.y0) + 1
    }

    pub fn area(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }

    /// Clip to an image of the given size.
    ///
    /// Returns `None` when nothing of the box remains inside the image or
    /// the clipped corners are inverted.
    pub fn clamped(&self, width: u32, height: u32) -> Option<Self> {
        if width == 0 || height == 0 {
            return None;
        }
        let clipped = Self::new(
            self.x0.min(width - 1),
            self.y0.min(height - 1),
            self.x1.min(width - 1),
            self.y1.min(height - 1),
        );
        (clipped.x0 <= clipped.x1 && clipped.y0 <= clipped.y1).then_some(clipped)
    }

    pub fn as_array(&self) -> [u32; 4] {
        [self.x0, self.y0, self.x1, self.y1]
    }
}

impl From<[u32; 4]> for BoundingBox {
    fn from([x0, y0, x1, y1]: [u32; 4]) -> Self {
        Self::new(x0, y0, x1, y1)
    }
}

impl From<BoundingBox> for [u32; 4] {
    fn from(bbox: BoundingBox) -> Self {
        bbox.as_array()
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.x0, self.y0, self.x1, self.y1)
    }
}

/// Parses `"x0,y0,x1,y1"`. Negative coordinates clamp to zero.
impl FromStr for BoundingBox {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(format!("expected x0,y0,x1,y1 but got '{}'", s));
        }

        let mut coords = [0u32; 4];
        for (slot, part) in coords.iter_mut().zip(&parts) {
            let value: i64 = part
                .parse()
                .map_err(|_| format!("'{}' is not an integer coordinate", part))?;
            *slot = value.clamp(0, u32::MAX as i64) as u32;
        }
        Ok(coords.into())
    }
}
