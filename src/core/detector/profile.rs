//! One-dimensional contrast profiles and the helpers that scan them.

use image::GrayImage;
use std::ops::Range;

/// Grayscale pixels as floats, row-major.
pub(crate) struct GrayPlane {
    width: usize,
    height: usize,
    data: Vec<f32>,
}

impl GrayPlane {
    pub fn from_gray(gray: &GrayImage) -> Self {
        Self {
            width: gray.width() as usize,
            height: gray.height() as usize,
            data: gray.as_raw().iter().map(|&v| v as f32).collect(),
        }
    }

    fn row(&self, y: usize) -> &[f32] {
        &self.data[y * self.width..(y + 1) * self.width]
    }

    /// Mean absolute difference between each pair of adjacent rows.
    ///
    /// Entry `i` compares rows `i` and `i + 1`, so the profile has
    /// `height - 1` entries.
    pub fn row_diff_profile(&self) -> Vec<f32> {
        (0..self.height.saturating_sub(1))
            .map(|y| {
                let sum: f32 = self
                    .row(y)
                    .iter()
                    .zip(self.row(y + 1))
                    .map(|(a, b)| (b - a).abs())
                    .sum();
                sum / self.width as f32
            })
            .collect()
    }

    /// Mean absolute difference between each pair of adjacent columns.
    pub fn col_diff_profile(&self) -> Vec<f32> {
        let cols = self.width.saturating_sub(1);
        let mut sums = vec![0.0f32; cols];
        for y in 0..self.height {
            let row = self.row(y);
            for (x, sum) in sums.iter_mut().enumerate() {
                *sum += (row[x + 1] - row[x]).abs();
            }
        }
        sums.iter().map(|s| s / self.height as f32).collect()
    }

    /// Population variance of each row's intensities (`height` entries).
    pub fn row_variance_profile(&self) -> Vec<f32> {
        (0..self.height)
            .map(|y| {
                let row = self.row(y);
                let n = row.len() as f32;
                let mean = row.iter().sum::<f32>() / n;
                row.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / n
            })
            .collect()
    }
}

/// Centered moving average with zero padding past both ends.
///
/// Every output is divided by the full kernel width, so values within
/// `k / 2` of either end are pulled toward zero.
pub(crate) fn smooth(values: &[f32], kernel: usize) -> Vec<f32> {
    let k = kernel.max(3);
    let half = (k / 2) as isize;
    let n = values.len() as isize;

    let mut prefix = Vec::with_capacity(values.len() + 1);
    prefix.push(0.0f64);
    for v in values {
        let last = prefix[prefix.len() - 1];
        prefix.push(last + *v as f64);
    }

    (0..n)
        .map(|i| {
            let lo = (i - half).clamp(0, n) as usize;
            let hi = (i - half + k as isize).clamp(0, n) as usize;
            ((prefix[hi] - prefix[lo]) / k as f64) as f32
        })
        .collect()
}

/// Median, averaging the two middle values for even lengths. Empty input is 0.
pub(crate) fn median(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f32::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Index of the first maximum. Empty input is 0.
pub(crate) fn argmax(values: &[f32]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if *v > values[best] {
            best = i;
        }
    }
    best
}

/// Contiguous runs of `scores[i] >= threshold` inside `range`, as inclusive
/// `(start, end)` pairs.
pub(crate) fn segments_above(scores: &[f32], threshold: f32, range: Range<usize>) -> Vec<(usize, usize)> {
    let end = range.end.min(scores.len());
    let mut segments = Vec::new();
    let mut start = None;

    for i in range.start..end {
        if scores[i] >= threshold {
            start.get_or_insert(i);
        } else if let Some(s) = start.take() {
            segments.push((s, i - 1));
        }
    }
    if let Some(s) = start {
        segments.push((s, end - 1));
    }
    segments
}

pub(crate) fn segment_mean(scores: &[f32], (start, end): (usize, usize)) -> f32 {
    let run = &scores[start..=end];
    run.iter().sum::<f32>() / run.len() as f32
}
