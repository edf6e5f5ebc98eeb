//! Per-edge boundary search over a smoothed contrast profile.
//!
//! Each finder returns an index into the profile; entry `i` of a profile
//! describes the transition between pixel rows (or columns) `i` and `i + 1`.

use super::params::{
    BORDER_FRACTION, FAR_SEARCH_START, INTERIOR_BAND, NEAR_SEARCH_FRACTION, THRESHOLD_BLEND,
    TOP_GUARD_FRACTION, WEAK_SEGMENT_RATIO,
};
use super::profile::{argmax, median, segment_mean, segments_above};
use std::ops::Range;

/// Band layout for one profile.
#[derive(Debug, Clone)]
pub(crate) struct Bands {
    pub len: usize,
    pub border: usize,
    pub interior: Range<usize>,
    /// Exclusive end of the top/left search band
    pub near_max: usize,
    /// Start of the bottom/right search band
    pub far_min: usize,
}

impl Bands {
    pub fn new(len: usize) -> Self {
        let lenf = len as f64;
        Self {
            len,
            border: ((lenf * BORDER_FRACTION) as usize).max(5),
            interior: (lenf * INTERIOR_BAND.0) as usize..(lenf * INTERIOR_BAND.1) as usize,
            near_max: ((lenf * NEAR_SEARCH_FRACTION) as usize).max(2),
            far_min: (lenf * FAR_SEARCH_START) as usize,
        }
    }

    pub fn leading(&self) -> Range<usize> {
        0..self.border.min(self.len)
    }

    pub fn trailing(&self) -> Range<usize> {
        self.len.saturating_sub(self.border)..self.len
    }

    /// Indices scanned inward from the bottom/right edge, outermost first
    fn far_scan(&self) -> impl Iterator<Item = usize> {
        (self.far_min..self.len.saturating_sub(1)).rev()
    }
}

/// Border-band and interior-band medians of one profile.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Contrast {
    pub border: f32,
    pub interior: f32,
}

impl Contrast {
    pub fn measure(profile: &[f32], border: Range<usize>, interior: Range<usize>) -> Self {
        Self {
            border: median(&profile[border]),
            interior: median(&profile[interior]),
        }
    }

    pub fn threshold(&self) -> f32 {
        blend(self.border, self.interior)
    }

    /// A textured mat rather than a flat border
    pub fn border_is_noisier(&self) -> bool {
        self.border > self.interior
    }
}

pub(crate) fn blend(border: f32, interior: f32) -> f32 {
    border + THRESHOLD_BLEND * (interior - border)
}

/// First index in `1..max_idx` at or above `threshold`, else the band's peak.
fn first_above(scores: &[f32], threshold: f32, max_idx: usize) -> usize {
    (1..max_idx)
        .find(|&i| scores[i] >= threshold)
        .unwrap_or_else(|| argmax(&scores[1..max_idx]) + 1)
}

/// Inner end of the longest above-threshold run in `0..max_idx`.
fn longest_segment_end(scores: &[f32], threshold: f32, max_idx: usize) -> usize {
    let mut best: Option<(usize, usize)> = None;
    for (start, end) in segments_above(scores, threshold, 0..max_idx) {
        let length = end - start + 1;
        if best.map_or(true, |(_, best_len)| length > best_len) {
            best = Some((end, length));
        }
    }
    match best {
        Some((end, _)) => end,
        None => argmax(&scores[1..max_idx]) + 1,
    }
}

fn rises(scores: &[f32]) -> Vec<f32> {
    scores.windows(2).map(|w| w[1] - w[0]).collect()
}

/// Position of the strongest rise within the first `max_idx` entries.
pub(crate) fn strongest_rise(scores: &[f32], max_idx: usize) -> usize {
    let grad = rises(scores);
    let limit = max_idx.saturating_sub(1).max(1).min(grad.len());
    argmax(&grad[..limit])
}

/// Same as [`strongest_rise`] but measured from the far end inward.
pub(crate) fn strongest_rise_from_far(scores: &[f32], max_idx: usize) -> usize {
    let mut grad = rises(scores);
    grad.reverse();
    let limit = max_idx.saturating_sub(1).max(1).min(grad.len());
    (scores.len() - 2) - argmax(&grad[..limit])
}

pub(crate) fn find_top(profile: &[f32], bands: &Bands) -> usize {
    let contrast = Contrast::measure(profile, bands.leading(), bands.interior.clone());
    let threshold = contrast.threshold();

    if contrast.border_is_noisier() {
        return longest_segment_end(profile, threshold, bands.near_max);
    }

    let first = first_above(profile, threshold, bands.near_max);
    // A crossing this close to the edge is usually scanner noise.
    if first < (TOP_GUARD_FRACTION * bands.len as f64) as usize {
        return strongest_rise(profile, bands.near_max);
    }
    first
}

pub(crate) fn find_bottom(profile: &[f32], bands: &Bands) -> usize {
    let contrast = Contrast::measure(profile, bands.trailing(), bands.interior.clone());
    let threshold = contrast.threshold();

    bands
        .far_scan()
        .find(|&i| profile[i] >= threshold)
        .unwrap_or_else(|| argmax(&profile[bands.far_min..bands.len - 1]) + bands.far_min)
}

pub(crate) fn find_left(profile: &[f32], bands: &Bands) -> usize {
    let contrast = Contrast::measure(profile, bands.leading(), bands.interior.clone());
    let threshold = contrast.threshold();

    if contrast.border_is_noisier() {
        return strongest_rise(profile, bands.near_max);
    }

    match (1..bands.near_max).find(|&i| profile[i] >= threshold) {
        Some(first) => {
            let segments = segments_above(profile, threshold, 0..bands.near_max);
            match stronger_segment(profile, &segments, 0) {
                Some(index) => segments[index].1,
                None => first,
            }
        }
        None => argmax(&profile[1..bands.near_max]) + 1,
    }
}

pub(crate) fn find_right(profile: &[f32], bands: &Bands) -> usize {
    let contrast = Contrast::measure(profile, bands.trailing(), bands.interior.clone());
    let threshold = contrast.threshold();

    if contrast.border_is_noisier() {
        return strongest_rise_from_far(profile, bands.near_max);
    }

    match bands.far_scan().find(|&i| profile[i] >= threshold) {
        Some(first) => {
            let segments = segments_above(profile, threshold, bands.far_min..bands.len - 1);
            let outermost = segments.len().saturating_sub(1);
            match stronger_segment(profile, &segments, outermost) {
                Some(index) => segments[index].0,
                None => first,
            }
        }
        None => argmax(&profile[bands.far_min..bands.len - 1]) + bands.far_min,
    }
}

/// When the outermost segment is markedly weaker than the strongest one
/// (a shadow before the real edge), return the strongest segment's index.
fn stronger_segment(profile: &[f32], segments: &[(usize, usize)], outermost: usize) -> Option<usize> {
    if segments.len() < 2 {
        return None;
    }
    let means: Vec<f32> = segments.iter().map(|&s| segment_mean(profile, s)).collect();
    let strongest = argmax(&means);
    (means[outermost] / means[strongest] < WEAK_SEGMENT_RATIO).then_some(strongest)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Flat border of `border` entries, then a uniform interior.
    fn stepped(len: usize, border: usize, border_level: f32, interior_level: f32) -> Vec<f32> {
        (0..len)
            .map(|i| if i < border || i >= len - border { border_level } else { interior_level })
            .collect()
    }

    #[test]
    fn bands_follow_fractions() {
        let bands = Bands::new(200);

        assert_eq!(bands.border, 10);
        assert_eq!(bands.interior, 60..140);
        assert_eq!(bands.near_max, 70);
        assert_eq!(bands.far_min, 130);
    }

    #[test]
    fn small_profiles_keep_minimum_border() {
        assert_eq!(Bands::new(40).border, 5);
    }

    #[test]
    fn top_finds_first_crossing() {
        let profile = stepped(200, 20, 0.0, 10.0);
        assert_eq!(find_top(&profile, &Bands::new(200)), 20);
    }

    #[test]
    fn top_guard_replaces_early_crossing_with_strongest_rise() {
        // Faint noise crosses at index 1, the real edge rises at 30.
        let mut profile = stepped(200, 30, 0.0, 10.0);
        profile[1] = 6.0;
        profile[2] = 0.0;
        profile[30] = 40.0;
        profile[29] = 0.0;

        assert_eq!(find_top(&profile, &Bands::new(200)), 29);
    }

    #[test]
    fn top_with_noisy_border_uses_longest_segment() {
        // Textured mat (median 20) above a calmer photo (median 10).
        let mut profile = vec![10.0; 200];
        for v in profile.iter_mut().take(12) {
            *v = 20.0;
        }
        for v in profile.iter_mut().skip(188) {
            *v = 20.0;
        }
        // Threshold is 15: the mat run 0..=11 is the only segment.
        assert_eq!(find_top(&profile, &Bands::new(200)), 11);
    }

    #[test]
    fn bottom_scans_inward_from_edge() {
        let profile = stepped(200, 25, 0.0, 10.0);
        assert_eq!(find_bottom(&profile, &Bands::new(200)), 174);
    }

    #[test]
    fn left_prefers_strong_segment_over_faint_shadow() {
        let mut profile = vec![0.0; 200];
        // Faint shadow at 10..=14, true edge band 30..=69 at full strength.
        for v in &mut profile[10..15] {
            *v = 6.0;
        }
        for v in &mut profile[30..170] {
            *v = 12.0;
        }
        let bands = Bands::new(200);

        // Threshold is 6: both runs qualify, the shadow's mean is half the edge's.
        assert_eq!(find_left(&profile, &bands), 69);
    }

    #[test]
    fn left_keeps_first_crossing_when_segments_are_comparable() {
        let mut profile = vec![0.0; 200];
        for v in &mut profile[10..15] {
            *v = 11.0;
        }
        for v in &mut profile[30..170] {
            *v = 12.0;
        }

        assert_eq!(find_left(&profile, &Bands::new(200)), 10);
    }

    #[test]
    fn right_prefers_strong_segment_over_faint_shadow() {
        let mut profile = vec![0.0; 200];
        for v in &mut profile[30..170] {
            *v = 12.0;
        }
        for v in &mut profile[185..190] {
            *v = 6.0;
        }

        // The strong run inside the far band starts at 130.
        assert_eq!(find_right(&profile, &Bands::new(200)), 130);
    }

    #[test]
    fn left_with_noisy_border_uses_strongest_rise() {
        let mut profile = vec![5.0; 200];
        for v in profile.iter_mut().take(10) {
            *v = 30.0;
        }
        for v in profile.iter_mut().skip(190) {
            *v = 30.0;
        }
        profile[40] = 50.0;

        assert_eq!(find_left(&profile, &Bands::new(200)), 39);
    }

    #[test]
    fn strongest_rise_from_far_counts_from_the_end() {
        // Rise between entries 12 and 13, inside the last nine transitions.
        let profile: Vec<f32> = (0..20).map(|i| if i >= 13 { 8.0 } else { 0.0 }).collect();

        assert_eq!(strongest_rise_from_far(&profile, 10), 12);
    }
}
