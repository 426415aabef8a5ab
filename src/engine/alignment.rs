//! Sequence alignment strategies.
//!
//! An [`Aligner`] takes the reference and sensing series of one channel and
//! produces two equal-length value arrays whose elements are compared
//! pairwise by the differencer. Strategies are trait objects so they can be
//! swapped at runtime.
//!
//! - [`InterpolationAligner`]: time-based linear interpolation of the sensing
//!   tag onto reference timestamps (default)
//! - [`DtwAligner`]: banded dynamic time warping on values only
//! - [`TruncateAligner`]: index pairing up to the shorter length

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::window::ChannelSeries;
use super::EngineError;

/// Two equal-length arrays of comparable values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlignedPair {
    pub reference: Vec<f64>,
    pub sensing: Vec<f64>,
}

impl AlignedPair {
    fn with_capacity(n: usize) -> Self {
        Self {
            reference: Vec::with_capacity(n),
            sensing: Vec::with_capacity(n),
        }
    }

    fn push(&mut self, reference: f64, sensing: f64) {
        self.reference.push(reference);
        self.sensing.push(sensing);
    }

    pub fn len(&self) -> usize {
        self.reference.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reference.is_empty()
    }

    /// Iterate `(reference, sensing)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.reference.iter().copied().zip(self.sensing.iter().copied())
    }
}

/// Resamples a comparable channel pair onto common comparison points.
///
/// Both series are time-sorted and, for phase, already unwrapped.
pub trait Aligner: Send + Sync + std::fmt::Debug {
    /// Short name for logging.
    fn name(&self) -> &'static str;

    fn align(&self, reference: &ChannelSeries, sensing: &ChannelSeries) -> AlignedPair;
}

// ============================================================================
// Strategy selection
// ============================================================================

/// Configurable alignment strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AlignmentStrategy {
    #[default]
    Interpolation,
    Dtw,
    Truncate,
}

impl AlignmentStrategy {
    /// Instantiate the strategy. `window_size` bounds the DTW warping band.
    pub fn build(self, window_size: usize) -> Box<dyn Aligner> {
        match self {
            AlignmentStrategy::Interpolation => Box::new(InterpolationAligner),
            AlignmentStrategy::Dtw => Box::new(DtwAligner::new(window_size)),
            AlignmentStrategy::Truncate => Box::new(TruncateAligner),
        }
    }
}

impl std::fmt::Display for AlignmentStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AlignmentStrategy::Interpolation => "interpolation",
            AlignmentStrategy::Dtw => "dtw",
            AlignmentStrategy::Truncate => "truncate",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for AlignmentStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "interpolation" | "interp" => Ok(AlignmentStrategy::Interpolation),
            "dtw" => Ok(AlignmentStrategy::Dtw),
            "truncate" => Ok(AlignmentStrategy::Truncate),
            other => Err(format!(
                "unknown alignment '{other}' (expected interpolation, dtw or truncate)"
            )),
        }
    }
}

// ============================================================================
// Linear interpolation
// ============================================================================

/// Interpolates the sensing series at every reference timestamp.
///
/// A reference point contributes only when sensing samples exist strictly
/// before it and at-or-after it. Points outside the sensing time span are
/// skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct InterpolationAligner;

impl Aligner for InterpolationAligner {
    fn name(&self) -> &'static str {
        "interpolation"
    }

    #[allow(clippy::cast_precision_loss)]
    fn align(&self, reference: &ChannelSeries, sensing: &ChannelSeries) -> AlignedPair {
        let sens = &sensing.points;
        let mut out = AlignedPair::with_capacity(reference.len());
        let mut idx = 0usize;

        for point in &reference.points {
            let t = point.timestamp_micros;
            while idx < sens.len() && sens[idx].timestamp_micros < t {
                idx += 1;
            }
            if idx == 0 || idx >= sens.len() {
                continue;
            }

            let before = sens[idx - 1];
            let after = sens[idx];
            if after.timestamp_micros == before.timestamp_micros {
                let err = EngineError::DegenerateInterval { timestamp: t };
                trace!(error = %err, "Skipping reference point");
                continue;
            }

            let fraction = (t - before.timestamp_micros) as f64
                / (after.timestamp_micros - before.timestamp_micros) as f64;
            let interpolated = before.value + (after.value - before.value) * fraction;
            out.push(point.value, interpolated);
        }

        out
    }
}

// ============================================================================
// Dynamic time warping
// ============================================================================

/// Minimum-cost monotonic pairing under `|a - b|`, restricted to a
/// Sakoe-Chiba band.
///
/// The band radius is the configured window, widened to the length
/// difference of the inputs so the end cell is always reachable.
#[derive(Debug, Clone, Copy)]
pub struct DtwAligner {
    window: usize,
}

impl DtwAligner {
    pub fn new(window: usize) -> Self {
        Self { window }
    }

    /// Optimal warp path as `(reference_index, sensing_index)` pairs, in order.
    pub fn warp_path(&self, a: &[f64], b: &[f64]) -> Vec<(usize, usize)> {
        let (n, m) = (a.len(), b.len());
        if n == 0 || m == 0 {
            return Vec::new();
        }

        let radius = self.window.max(n.abs_diff(m)).max(1);
        let cols = m + 1;
        let mut cost = vec![f64::INFINITY; (n + 1) * cols];
        cost[0] = 0.0;

        for i in 1..=n {
            let j_lo = i.saturating_sub(radius).max(1);
            let j_hi = (i + radius).min(m);
            for j in j_lo..=j_hi {
                let d = (a[i - 1] - b[j - 1]).abs();
                let best = cost[(i - 1) * cols + (j - 1)]
                    .min(cost[(i - 1) * cols + j])
                    .min(cost[i * cols + (j - 1)]);
                cost[i * cols + j] = d + best;
            }
        }

        // Backtrack, preferring the diagonal on ties.
        let mut path = Vec::with_capacity(n + m);
        let (mut i, mut j) = (n, m);
        while i > 0 && j > 0 {
            path.push((i - 1, j - 1));
            if i == 1 && j == 1 {
                break;
            }
            let diag = cost[(i - 1) * cols + (j - 1)];
            let up = cost[(i - 1) * cols + j];
            let left = cost[i * cols + (j - 1)];
            if diag <= up && diag <= left {
                i -= 1;
                j -= 1;
            } else if up <= left {
                i -= 1;
            } else {
                j -= 1;
            }
        }
        path.reverse();
        path
    }
}

impl Aligner for DtwAligner {
    fn name(&self) -> &'static str {
        "dtw"
    }

    fn align(&self, reference: &ChannelSeries, sensing: &ChannelSeries) -> AlignedPair {
        let a = reference.values();
        let b = sensing.values();
        let path = self.warp_path(&a, &b);

        let mut out = AlignedPair::with_capacity(path.len());
        for (i, j) in path {
            out.push(a[i], b[j]);
        }
        out
    }
}

// ============================================================================
// Truncation
// ============================================================================

/// Pairs samples by index, dropping the tail of the longer series.
#[derive(Debug, Clone, Copy, Default)]
pub struct TruncateAligner;

impl Aligner for TruncateAligner {
    fn name(&self) -> &'static str {
        "truncate"
    }

    fn align(&self, reference: &ChannelSeries, sensing: &ChannelSeries) -> AlignedPair {
        let n = reference.len().min(sensing.len());
        let mut out = AlignedPair::with_capacity(n);
        for (r, s) in reference.points.iter().zip(&sensing.points) {
            out.push(r.value, s.value);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChannelKey;

    fn series(tag: &str, points: &[(i64, f64)]) -> ChannelSeries {
        let mut s = ChannelSeries::new(tag, ChannelKey::from_mhz(902.75));
        for &(t, v) in points {
            s.push(t, v);
        }
        s
    }

    #[test]
    fn test_interpolation_midpoint() {
        let reference = series("A", &[(0, 10.0), (10, 10.0), (20, 10.0)]);
        let sensing = series("B", &[(5, 2.0), (15, 4.0)]);

        let aligned = InterpolationAligner.align(&reference, &sensing);
        assert_eq!(aligned.len(), 1);
        assert_eq!(aligned.reference, vec![10.0]);
        assert!((aligned.sensing[0] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_interpolation_skips_points_outside_span() {
        let reference = series("A", &[(0, 1.0), (25, 1.0)]);
        let sensing = series("B", &[(5, 2.0), (15, 4.0)]);
        assert!(InterpolationAligner.align(&reference, &sensing).is_empty());
    }

    #[test]
    fn test_interpolation_exact_timestamp_uses_after_sample() {
        let reference = series("A", &[(15, 0.0)]);
        let sensing = series("B", &[(5, 2.0), (15, 4.0), (25, 8.0)]);
        let aligned = InterpolationAligner.align(&reference, &sensing);
        assert_eq!(aligned.sensing, vec![4.0]);
    }

    #[test]
    fn test_interpolation_fractional_position() {
        let reference = series("A", &[(7, 0.0)]);
        let sensing = series("B", &[(4, 100.0), (8, 200.0)]);
        let aligned = InterpolationAligner.align(&reference, &sensing);
        assert!((aligned.sensing[0] - 175.0).abs() < 1e-9);
    }

    #[test]
    fn test_dtw_identical_sequences_follow_diagonal() {
        let dtw = DtwAligner::new(10);
        let a = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(dtw.warp_path(&a, &a), vec![(0, 0), (1, 1), (2, 2), (3, 3)]);
    }

    #[test]
    fn test_dtw_stretches_repeated_sample() {
        let dtw = DtwAligner::new(10);
        let path = dtw.warp_path(&[1.0, 2.0, 3.0], &[1.0, 2.0, 2.0, 3.0]);
        assert_eq!(path, vec![(0, 0), (1, 1), (1, 2), (2, 3)]);
    }

    #[test]
    fn test_dtw_path_is_monotonic_and_complete() {
        let dtw = DtwAligner::new(2);
        let a: Vec<f64> = (0..12i32).map(|i| f64::from(i) * 3.0).collect();
        let b: Vec<f64> = (0..5i32).map(|i| f64::from(i) * 8.0).collect();
        let path = dtw.warp_path(&a, &b);

        assert_eq!(path.first(), Some(&(0, 0)));
        assert_eq!(path.last(), Some(&(11, 4)));
        for w in path.windows(2) {
            let (di, dj) = (w[1].0 - w[0].0, w[1].1 - w[0].1);
            assert!(di <= 1 && dj <= 1 && di + dj >= 1);
        }
    }

    #[test]
    fn test_dtw_align_returns_equal_lengths() {
        let reference = series("A", &[(0, 10.0), (1, 20.0), (2, 30.0)]);
        let sensing = series("B", &[(0, 11.0), (1, 29.0)]);
        let aligned = DtwAligner::new(100).align(&reference, &sensing);
        assert_eq!(aligned.reference.len(), aligned.sensing.len());
        assert!(!aligned.is_empty());
    }

    #[test]
    fn test_truncate_pairs_by_index() {
        let reference = series("A", &[(0, 1.0), (1, 2.0), (2, 3.0)]);
        let sensing = series("B", &[(0, 5.0), (1, 6.0)]);
        let aligned = TruncateAligner.align(&reference, &sensing);
        assert_eq!(aligned.reference, vec![1.0, 2.0]);
        assert_eq!(aligned.sensing, vec![5.0, 6.0]);
    }

    #[test]
    fn test_strategy_parse_and_build() {
        assert_eq!("DTW".parse::<AlignmentStrategy>(), Ok(AlignmentStrategy::Dtw));
        assert_eq!(AlignmentStrategy::default().build(10).name(), "interpolation");
        assert_eq!(AlignmentStrategy::Truncate.build(10).name(), "truncate");
    }
}
