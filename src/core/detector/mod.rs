//! # Detector Module
//!
//! Locates the photographic content inside a scanned frame (a print with a
//! mat, border or scanner bed around it).
//!
//! ## Method
//! The image is reduced to two contrast profiles: the mean absolute
//! difference between adjacent rows and between adjacent columns. A border
//! shows up as a run of low values, the photo as higher ones. Each edge is
//! located independently against a threshold halfway between the border
//! band's median and the interior band's median, then two refinements and a
//! final area guardrail clean the result up.
//!
//! Detection never fails: anything ambiguous produces the full-image box.

mod bbox;
mod edges;
pub mod params;
mod profile;

pub use bbox::BoundingBox;

use crate::core::imaging::fast_resize::grayscale_within;
use edges::{blend, find_bottom, find_left, find_right, find_top, Bands, Contrast};
use image::{imageops, DynamicImage};
use params::*;
use profile::{segments_above, smooth, GrayPlane};

/// Box in analysis-scale coordinates, signed so intermediate values can
/// run past the image before clamping.
#[derive(Debug, Clone, Copy, PartialEq)]
struct RawBox {
    x0: i64,
    y0: i64,
    x1: i64,
    y1: i64,
}

impl RawBox {
    fn area(&self) -> i64 {
        (self.x1 - self.x0 + 1) * (self.y1 - self.y0 + 1)
    }
}

/// Find the main content rectangle of `image`.
///
/// The returned box always lies inside the image.
pub fn detect_main_region(image: &DynamicImage) -> BoundingBox {
    let (width, height) = (image.width(), image.height());
    let full = BoundingBox::full(width, height);

    if width.min(height) < MIN_DETECT_DIM {
        return full;
    }

    let (gray, scale) = match grayscale_within(image, MAX_ANALYSIS_DIM) {
        Ok(result) => result,
        Err(e) => {
            tracing::warn!("Border detection fell back to full image: {}", e);
            return full;
        }
    };
    if gray.width().min(gray.height()) < MIN_DETECT_DIM {
        return full;
    }

    let blurred = imageops::blur(&gray, BLUR_SIGMA);
    let plane = GrayPlane::from_gray(&blurred);
    let row_diff = smooth(&plane.row_diff_profile(), SMOOTH_KERNEL);
    let col_diff = smooth(&plane.col_diff_profile(), SMOOTH_KERNEL);

    let rows = Bands::new(row_diff.len());
    let cols = Bands::new(col_diff.len());

    // A profile with no transitions at all has no edge to find.
    let rows_flat = is_blank(&row_diff);
    let cols_flat = is_blank(&col_diff);

    let mut raw = RawBox {
        x0: 0,
        y0: 0,
        x1: cols.len as i64,
        y1: rows.len as i64,
    };

    if !cols_flat {
        raw.x0 = find_left(&col_diff, &cols) as i64 + 1;
        raw.x1 = find_right(&col_diff, &cols) as i64 + 1;
    }

    if !rows_flat {
        raw.y0 = find_top(&row_diff, &rows) as i64 + 1;
        raw.y1 = find_bottom(&row_diff, &rows) as i64 + 1;

        let row_variance = smooth(&plane.row_variance_profile(), SMOOTH_KERNEL);
        if let Some(y1) = refine_bottom_with_variance(&row_diff, &row_variance, &rows) {
            raw.y1 = y1;
        }
        if let Some(y0) = refine_top_for_area(&row_diff, &rows, raw, cols.len) {
            raw.y0 = y0;
        }
    }

    let mut scaled = rescale(raw, scale);
    if cols_flat {
        scaled.x0 = 0;
        scaled.x1 = width as i64 - 1;
    }
    if rows_flat {
        scaled.y0 = 0;
        scaled.y1 = height as i64 - 1;
    }

    let bbox = apply_guardrails(scaled, width, height);
    tracing::debug!(
        "Detected main region {} in {}x{} image (scale {:.3})",
        bbox,
        width,
        height,
        scale
    );
    bbox
}

fn is_blank(profile: &[f32]) -> bool {
    profile.iter().all(|&v| v <= 0.0)
}

/// Re-derive the bottom edge from row variance.
///
/// Applies when the bottom margin has more row-to-row contrast than the
/// photo yet is much flatter within each row, e.g. a striped scanner lid.
fn refine_bottom_with_variance(row_diff: &[f32], row_variance: &[f32], rows: &Bands) -> Option<i64> {
    let contrast = Contrast::measure(row_diff, rows.trailing(), rows.interior.clone());
    let variance_border = row_variance.len().saturating_sub(rows.border)..row_variance.len();
    let variance = Contrast::measure(row_variance, variance_border, rows.interior.clone());

    if !(contrast.border_is_noisier() && variance.border < variance.interior * BOTTOM_VAR_RATIO) {
        return None;
    }

    let threshold = blend(variance.border, variance.interior);
    (rows.far_min..rows.len.saturating_sub(1))
        .rev()
        .find(|&i| row_variance[i] >= threshold)
        .map(|i| i as i64 + 1)
}

/// Pick a later top edge when the box still covers most of the frame.
///
/// Every above-threshold segment in the top search band is a candidate;
/// the one whose resulting area is closest to the target wins, provided it
/// does not grow the box.
fn refine_top_for_area(row_diff: &[f32], rows: &Bands, raw: RawBox, diff_width: usize) -> Option<i64> {
    let frame = (diff_width * rows.len) as f64;
    let area_ratio = raw.area() as f64 / frame;
    let contrast = Contrast::measure(row_diff, rows.leading(), rows.interior.clone());

    if area_ratio <= TOP_AREA_MAX_RATIO || contrast.border >= contrast.interior {
        return None;
    }

    let segments = segments_above(row_diff, contrast.threshold(), 0..rows.near_max);
    if segments.len() < 2 {
        return None;
    }

    let box_width = raw.x1 - raw.x0 + 1;
    let mut best: Option<(usize, f64)> = None;
    for &(_, end) in &segments {
        let candidate_y0 = end as i64 + 1;
        let candidate = (box_width * (raw.y1 - candidate_y0 + 1)) as f64 / frame;
        if candidate > area_ratio {
            continue;
        }
        let score = (candidate - TOP_AREA_TARGET_RATIO).abs();
        if best.map_or(true, |(_, best_score)| score < best_score) {
            best = Some((end, score));
        }
    }

    best.map(|(end, _)| end as i64 + 1)
}

fn rescale(raw: RawBox, scale: f64) -> RawBox {
    if scale == 1.0 {
        return raw;
    }
    let back = |v: i64| (v as f64 / scale) as i64;
    RawBox {
        x0: back(raw.x0),
        y0: back(raw.y0),
        x1: back(raw.x1),
        y1: back(raw.y1),
    }
}

/// Clamp into the image, then reject degenerate or undersized boxes.
fn apply_guardrails(raw: RawBox, width: u32, height: u32) -> BoundingBox {
    let max_x = width as i64 - 1;
    let max_y = height as i64 - 1;
    let clamped = RawBox {
        x0: raw.x0.clamp(0, max_x),
        y0: raw.y0.clamp(0, max_y),
        x1: raw.x1.clamp(0, max_x),
        y1: raw.y1.clamp(0, max_y),
    };

    let full = BoundingBox::full(width, height);
    if clamped.x1 <= clamped.x0 || clamped.y1 <= clamped.y0 {
        return full;
    }

    let ratio = clamped.area() as f64 / (width as f64 * height as f64);
    if ratio < MIN_AREA_RATIO {
        return full;
    }

    BoundingBox::new(
        clamped.x0 as u32,
        clamped.y0 as u32,
        clamped.x1 as u32,
        clamped.y1 as u32,
    )
}
