//! Phase unwrapping for a single (tag, channel) series.

use super::window::ChannelSeries;
use crate::config::defaults::{FULL_TURN_DEG, PHASE_WRAP_THRESHOLD_DEG};

/// Remove 0°/360° wrap discontinuities from a sequence of raw phases.
///
/// Each output value is `raw + offset`. The offset starts at zero and moves by
/// one full turn whenever two consecutive *raw* values jump by more than half
/// a turn, so consecutive outputs never differ by more than 180°.
///
/// Input must belong to a single tag on a single channel and be sorted by time.
pub fn unwrap_phases(raw: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(raw.len());
    let Some((&first, rest)) = raw.split_first() else {
        return out;
    };

    let mut offset = 0.0;
    let mut last = first;
    out.push(first);

    for &current in rest {
        let jump = current - last;
        if jump > PHASE_WRAP_THRESHOLD_DEG {
            offset -= FULL_TURN_DEG;
        } else if jump < -PHASE_WRAP_THRESHOLD_DEG {
            offset += FULL_TURN_DEG;
        }
        last = current;
        out.push(current + offset);
    }

    out
}

/// Unwrap a series in place. The series must already be time-sorted.
pub fn unwrap_series(series: &mut ChannelSeries) {
    let raw = series.values();
    for (point, unwrapped) in series.points.iter_mut().zip(unwrap_phases(&raw)) {
        point.value = unwrapped;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChannelKey;

    #[test]
    fn test_small_steps_are_untouched() {
        let raw = vec![10.0, 40.0, 200.0, 30.0 + 180.0, 100.0, 0.0];
        assert_eq!(unwrap_phases(&raw), raw);
    }

    #[test]
    fn test_downward_wrap_is_small_upward_change() {
        assert_eq!(unwrap_phases(&[350.0, 10.0]), vec![350.0, 370.0]);
    }

    #[test]
    fn test_upward_wrap_is_small_downward_change() {
        assert_eq!(unwrap_phases(&[10.0, 350.0]), vec![10.0, -10.0]);
    }

    #[test]
    fn test_multiple_turns_accumulate() {
        let raw = [300.0, 20.0, 100.0, 190.0, 280.0, 10.0];
        let out = unwrap_phases(&raw);
        assert_eq!(out, vec![300.0, 380.0, 460.0, 550.0, 640.0, 730.0]);
        assert!(out.windows(2).all(|w| (w[1] - w[0]).abs() <= 180.0));
    }

    #[test]
    fn test_empty_and_single() {
        assert!(unwrap_phases(&[]).is_empty());
        assert_eq!(unwrap_phases(&[123.0]), vec![123.0]);
    }

    #[test]
    fn test_unwrap_series_keeps_timestamps() {
        let mut series = ChannelSeries::new("A", ChannelKey::from_mhz(902.75));
        series.push(1, 355.0);
        series.push(2, 5.0);
        unwrap_series(&mut series);
        assert_eq!(series.values(), vec![355.0, 365.0]);
        assert_eq!(series.points[1].timestamp_micros, 2);
    }
}
