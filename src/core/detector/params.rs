//! Tuning constants for border detection.
//!
//! Fractions are relative to the length of the profile they apply to.

/// Longest side after downscaling
pub const MAX_ANALYSIS_DIM: u32 = 1000;

/// Gaussian sigma matching a 5x5 kernel
pub const BLUR_SIGMA: f32 = 1.1;

/// Moving-average width applied to every profile
pub const SMOOTH_KERNEL: usize = 11;

pub const BORDER_FRACTION: f64 = 0.05;

/// Interior reference band as (start, end) fractions
pub const INTERIOR_BAND: (f64, f64) = (0.3, 0.7);

/// Top/left edges are searched in the first 35% of the profile
pub const NEAR_SEARCH_FRACTION: f64 = 0.35;

/// Bottom/right edges are searched from 65% onward
pub const FAR_SEARCH_START: f64 = 0.65;

/// Threshold position between border and interior medians
pub const THRESHOLD_BLEND: f32 = 0.5;

/// Top crossings earlier than this fraction are treated as noise
pub const TOP_GUARD_FRACTION: f64 = 0.02;

/// Boxes covering less of the image than this fall back to the full image
pub const MIN_AREA_RATIO: f64 = 0.6;

/// Boxes larger than this trigger the top refinement
pub const TOP_AREA_MAX_RATIO: f64 = 0.85;

/// Area the top refinement aims for
pub const TOP_AREA_TARGET_RATIO: f64 = 0.72;

/// An outer segment this much weaker than the strongest is a shadow
pub const WEAK_SEGMENT_RATIO: f32 = 0.55;

/// Border variance below this share of the interior variance marks a flat bottom margin
pub const BOTTOM_VAR_RATIO: f32 = 0.5;

/// Images with a side shorter than this are returned whole
pub const MIN_DETECT_DIM: u32 = 16;
