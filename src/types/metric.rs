//! Metric result types

use serde::{Deserialize, Serialize};

use crate::config::defaults::NO_READING_SENTINEL;

/// Which tag-read quantity the differential is computed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Unwrapped, folded phase difference (degrees)
    #[default]
    Phase,
    /// Signed signal-strength difference (dB)
    Rssi,
}

impl MetricKind {
    pub fn name(&self) -> &'static str {
        match self {
            MetricKind::Phase => "phase",
            MetricKind::Rssi => "rssi",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            MetricKind::Phase => "°",
            MetricKind::Rssi => "dB",
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for MetricKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "phase" => Ok(MetricKind::Phase),
            "rssi" => Ok(MetricKind::Rssi),
            other => Err(format!("unknown metric '{other}' (expected phase or rssi)")),
        }
    }
}

/// Why an evaluation produced no reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoReadingReason {
    /// Fewer than two distinct tag identities configured
    InsufficientTags,
    /// Window held fewer events than the minimum
    InsufficientEvents,
    /// No comparable channel pair produced a differential sample
    NoComparableChannels,
}

impl std::fmt::Display for NoReadingReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NoReadingReason::InsufficientTags => write!(f, "fewer than two tags configured"),
            NoReadingReason::InsufficientEvents => write!(f, "not enough events in window"),
            NoReadingReason::NoComparableChannels => write!(f, "no comparable channel pairs"),
        }
    }
}

/// Result of one metric evaluation.
///
/// `NoReading` must be shown as "no reading yet" by display and broadcast
/// consumers. It only becomes a number through [`MetricResult::as_sentinel`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MetricResult {
    Value(f64),
    NoReading(NoReadingReason),
}

impl MetricResult {
    pub fn value(&self) -> Option<f64> {
        match self {
            MetricResult::Value(v) => Some(*v),
            MetricResult::NoReading(_) => None,
        }
    }

    pub fn is_reading(&self) -> bool {
        matches!(self, MetricResult::Value(_))
    }

    /// Numeric form for consumers that only understand scalars.
    pub fn as_sentinel(&self) -> f64 {
        self.value().unwrap_or(NO_READING_SENTINEL)
    }
}

impl std::fmt::Display for MetricResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricResult::Value(v) => write!(f, "{v:.2}"),
            MetricResult::NoReading(reason) => write!(f, "no reading ({reason})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_only_for_no_reading() {
        assert_eq!(MetricResult::Value(12.5).as_sentinel(), 12.5);
        assert_eq!(
            MetricResult::NoReading(NoReadingReason::InsufficientEvents).as_sentinel(),
            -1000.0
        );
        assert!(!MetricResult::NoReading(NoReadingReason::InsufficientTags).is_reading());
    }

    #[test]
    fn test_metric_kind_parse() {
        assert_eq!("RSSI".parse::<MetricKind>(), Ok(MetricKind::Rssi));
        assert!("amplitude".parse::<MetricKind>().is_err());
    }
}
