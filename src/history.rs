//! In-memory differential history for one collection session.
//!
//! Phase and RSSI results are kept in separate series. Only real readings
//! are recorded; no-reading results never enter the history.

use std::collections::VecDeque;

use tracing::debug;

use crate::types::{MetricKind, MetricResult};

/// Ordered series of recorded metric values with drop-oldest capacity.
#[derive(Debug, Clone)]
pub struct HistoryRecorder {
    /// Max values per series; 0 means unbounded
    capacity: usize,
    phase: VecDeque<f64>,
    rssi: VecDeque<f64>,
    dropped: u64,
}

impl HistoryRecorder {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            phase: VecDeque::new(),
            rssi: VecDeque::new(),
            dropped: 0,
        }
    }

    fn series(&self, kind: MetricKind) -> &VecDeque<f64> {
        match kind {
            MetricKind::Phase => &self.phase,
            MetricKind::Rssi => &self.rssi,
        }
    }

    fn series_mut(&mut self, kind: MetricKind) -> &mut VecDeque<f64> {
        match kind {
            MetricKind::Phase => &mut self.phase,
            MetricKind::Rssi => &mut self.rssi,
        }
    }

    /// Append a result. Returns `false` when it was a no-reading.
    pub fn record(&mut self, kind: MetricKind, result: &MetricResult) -> bool {
        let Some(value) = result.value() else {
            return false;
        };

        let capacity = self.capacity;
        let series = self.series_mut(kind);
        series.push_back(value);
        if capacity > 0 && series.len() > capacity {
            series.pop_front();
            self.dropped += 1;
            if self.dropped == 1 {
                debug!(capacity, "History full, dropping oldest values");
            }
        }
        true
    }

    /// Copy of the recorded series, oldest first. Does not clear.
    pub fn export(&self, kind: MetricKind) -> Vec<f64> {
        self.series(kind).iter().copied().collect()
    }

    /// Clear both series.
    pub fn reset(&mut self) {
        self.phase.clear();
        self.rssi.clear();
        self.dropped = 0;
    }

    pub fn len(&self, kind: MetricKind) -> usize {
        self.series(kind).len()
    }

    pub fn is_empty(&self, kind: MetricKind) -> bool {
        self.series(kind).is_empty()
    }

    /// Values evicted by the capacity limit since the last reset.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn mean(&self, kind: MetricKind) -> Option<f64> {
        let series = self.series(kind);
        if series.is_empty() {
            return None;
        }
        Some(series.iter().sum::<f64>() / series.len() as f64)
    }
}

impl Default for HistoryRecorder {
    fn default() -> Self {
        Self::new(crate::config::defaults::DEFAULT_HISTORY_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NoReadingReason;

    #[test]
    fn test_no_reading_is_not_recorded() {
        let mut history = HistoryRecorder::new(0);
        assert!(history.record(MetricKind::Phase, &MetricResult::Value(12.0)));
        assert!(!history.record(
            MetricKind::Phase,
            &MetricResult::NoReading(NoReadingReason::InsufficientEvents)
        ));
        assert_eq!(history.export(MetricKind::Phase), vec![12.0]);
    }

    #[test]
    fn test_export_does_not_clear() {
        let mut history = HistoryRecorder::new(0);
        history.record(MetricKind::Phase, &MetricResult::Value(1.0));
        history.record(MetricKind::Phase, &MetricResult::Value(2.0));
        assert_eq!(history.export(MetricKind::Phase), vec![1.0, 2.0]);
        assert_eq!(history.export(MetricKind::Phase), vec![1.0, 2.0]);

        history.reset();
        assert!(history.is_empty(MetricKind::Phase));
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let mut history = HistoryRecorder::new(3);
        for v in 0..5i32 {
            history.record(MetricKind::Phase, &MetricResult::Value(f64::from(v)));
        }
        assert_eq!(history.export(MetricKind::Phase), vec![2.0, 3.0, 4.0]);
        assert_eq!(history.dropped(), 2);
    }

    #[test]
    fn test_series_are_separate() {
        let mut history = HistoryRecorder::new(0);
        history.record(MetricKind::Phase, &MetricResult::Value(30.0));
        history.record(MetricKind::Rssi, &MetricResult::Value(-4.0));
        history.record(MetricKind::Rssi, &MetricResult::Value(-6.0));

        assert_eq!(history.len(MetricKind::Phase), 1);
        assert_eq!(history.mean(MetricKind::Rssi), Some(-5.0));
        assert_eq!(HistoryRecorder::new(0).mean(MetricKind::Phase), None);
    }
}
