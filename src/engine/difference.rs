//! Differential samples and their pooled mean.

use super::alignment::AlignedPair;
use crate::config::defaults::FOLD_PERIOD_DEG;
use crate::types::MetricKind;

/// Fold an angle into `[0, 90]` degrees, periodic in 180°.
///
/// A phase change of `d` and of `180 - d` are taken as the same magnitude,
/// since backscatter phase covers the round trip.
pub fn fold(degrees: f64) -> f64 {
    let mut m = degrees % FOLD_PERIOD_DEG;
    if m < 0.0 {
        m += FOLD_PERIOD_DEG;
    }
    m.min(FOLD_PERIOD_DEG - m)
}

/// Per-sample differences for one aligned channel pair.
///
/// Phase samples are `fold(|reference - sensing|)`; RSSI samples keep their
/// sign as `reference - sensing` in dB.
pub fn differential_samples(kind: MetricKind, aligned: &AlignedPair) -> Vec<f64> {
    match kind {
        MetricKind::Phase => aligned.iter().map(|(r, s)| fold((r - s).abs())).collect(),
        MetricKind::Rssi => aligned.iter().map(|(r, s)| r - s).collect(),
    }
}

/// Running accumulator pooling samples across channels.
#[derive(Debug, Clone, Copy, Default)]
pub struct SamplePool {
    sum: f64,
    count: usize,
}

impl SamplePool {
    pub fn extend(&mut self, samples: &[f64]) {
        self.sum += samples.iter().sum::<f64>();
        self.count += samples.len();
    }

    pub fn count(&self) -> usize {
        self.count
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fold_range_and_period() {
        for i in -720..=720i32 {
            let d = f64::from(i) * 0.5;
            let f = fold(d);
            assert!((0.0..=90.0).contains(&f), "fold({d}) = {f}");
            assert!((fold(d + 360.0) - f).abs() < 1e-9);
            assert!((fold(d + 180.0) - f).abs() < 1e-9);
        }
    }

    #[test]
    fn test_fold_known_values() {
        assert_eq!(fold(0.0), 0.0);
        assert_eq!(fold(180.0), 0.0);
        assert_eq!(fold(90.0), 90.0);
        assert_eq!(fold(30.0), 30.0);
        assert_eq!(fold(150.0), 30.0);
        assert!((fold(350.0) - fold(10.0)).abs() < 1e-9);
        assert_eq!(fold(-30.0), 30.0);
    }

    #[test]
    fn test_phase_samples_are_folded_magnitudes() {
        let aligned = AlignedPair {
            reference: vec![10.0, 370.0, 0.0],
            sensing: vec![40.0, 10.0, 200.0],
        };
        let samples = differential_samples(MetricKind::Phase, &aligned);
        assert_eq!(samples, vec![30.0, 0.0, 20.0]);
    }

    #[test]
    fn test_rssi_samples_keep_sign() {
        let aligned = AlignedPair {
            reference: vec![-50.0, -60.0],
            sensing: vec![-55.0, -58.0],
        };
        assert_eq!(
            differential_samples(MetricKind::Rssi, &aligned),
            vec![5.0, -2.0]
        );
    }

    #[test]
    fn test_pool_mean_across_channels() {
        let mut pool = SamplePool::default();
        assert_eq!(pool.mean(), None);
        pool.extend(&[10.0, 20.0]);
        pool.extend(&[30.0]);
        assert_eq!(pool.count(), 3);
        assert_eq!(pool.mean(), Some(20.0));
    }
}
