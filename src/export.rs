//! Session export
//!
//! Three logical exports are produced from the event buffer and history:
//!
//! - **Sequential log**: every buffered read in arrival order with its
//!   timestamp made relative to the earliest read, in milliseconds
//! - **Aggregated log**: the same records grouped per tag into parallel
//!   arrays
//! - **Differential history**: the recorded metric values
//!
//! [`SessionExporter`] writes them as pretty JSON under
//! `<data_dir>/json/{tags,raw,phases}/`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::config::ExportConfig;
use crate::history::HistoryRecorder;
use crate::types::{MetricKind, TagEvent};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Export I/O error ({}): {}", .0.display(), .1)]
    Io(PathBuf, std::io::Error),

    #[error("Export serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// ============================================================================
// Logical exports
// ============================================================================

/// One read with a session-relative timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequentialRecord {
    pub epc: String,
    pub phase: f64,
    pub rssi: f64,
    pub channel: f64,
    /// Milliseconds since the earliest read in the export
    pub timestamp: f64,
}

/// Parallel arrays of one tag's reads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TagSeries {
    pub timestamps: Vec<f64>,
    pub rssis: Vec<f64>,
    pub channels: Vec<f64>,
    pub phases: Vec<f64>,
}

/// Convert events into relative-time records, preserving order.
#[allow(clippy::cast_precision_loss)]
pub fn sequential_log(events: &[TagEvent]) -> Vec<SequentialRecord> {
    let Some(start) = events.iter().map(|e| e.timestamp_micros).min() else {
        return Vec::new();
    };

    events
        .iter()
        .map(|e| SequentialRecord {
            epc: e.tag_id.clone(),
            phase: e.phase_degrees,
            rssi: e.rssi_dbm,
            channel: e.channel_mhz,
            timestamp: (e.timestamp_micros - start) as f64 / 1000.0,
        })
        .collect()
}

/// Group relative-time records by tag.
pub fn aggregated_log(events: &[TagEvent]) -> BTreeMap<String, TagSeries> {
    let mut grouped: BTreeMap<String, TagSeries> = BTreeMap::new();
    for record in sequential_log(events) {
        let series = grouped.entry(record.epc).or_default();
        series.timestamps.push(record.timestamp);
        series.rssis.push(record.rssi);
        series.channels.push(record.channel);
        series.phases.push(record.phase);
    }
    grouped
}

// ============================================================================
// File writer
// ============================================================================

/// Paths written by one export.
#[derive(Debug, Clone, Default)]
pub struct ExportReport {
    pub written: Vec<PathBuf>,
}

/// Writes session exports to disk.
#[derive(Debug, Clone)]
pub struct SessionExporter {
    data_dir: PathBuf,
    store_data: bool,
}

impl SessionExporter {
    pub fn new(data_dir: impl Into<PathBuf>, store_data: bool) -> Self {
        Self {
            data_dir: data_dir.into(),
            store_data,
        }
    }

    pub fn from_config(config: &ExportConfig) -> Self {
        Self::new(config.data_dir.clone(), config.store_data)
    }

    /// Export using the current local time as the file stamp.
    pub fn export(
        &self,
        name: &str,
        events: &[TagEvent],
        history: &HistoryRecorder,
    ) -> Result<ExportReport, ExportError> {
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();
        self.export_with_stamp(name, &stamp, events, history)
    }

    /// Export with an explicit file stamp.
    ///
    /// Empty inputs are skipped. Nothing is written when storage is disabled.
    pub fn export_with_stamp(
        &self,
        name: &str,
        stamp: &str,
        events: &[TagEvent],
        history: &HistoryRecorder,
    ) -> Result<ExportReport, ExportError> {
        let mut report = ExportReport::default();
        if !self.store_data {
            info!("Data storage disabled, skipping export");
            return Ok(report);
        }

        let json_dir = self.data_dir.join("json");

        if events.is_empty() {
            info!("No tag data to save");
        } else {
            let seq = sequential_log(events);
            let path = json_dir.join("tags").join(format!("{name}_{stamp}_seq.json"));
            write_json(&path, &seq)?;
            info!(path = %path.display(), records = seq.len(), "Sequential log saved");
            report.written.push(path);

            let grouped = aggregated_log(events);
            let path = json_dir.join("raw").join(format!("{name}_{stamp}_raw.json"));
            write_json(&path, &grouped)?;
            for (epc, series) in &grouped {
                info!(tag = %epc, records = series.timestamps.len(), "Aggregated tag");
            }
            info!(path = %path.display(), tags = grouped.len(), "Aggregated log saved");
            report.written.push(path);
        }

        for (kind, suffix) in [(MetricKind::Phase, "phases"), (MetricKind::Rssi, "rssi")] {
            let values = history.export(kind);
            if values.is_empty() {
                if kind == MetricKind::Phase {
                    info!("No phase differences to save");
                }
                continue;
            }
            let path = json_dir
                .join("phases")
                .join(format!("{name}_{stamp}_{suffix}.json"));
            write_json(&path, &values)?;
            info!(path = %path.display(), values = values.len(), metric = %kind, "History saved");
            report.written.push(path);
        }

        Ok(report)
    }
}

/// Write pretty JSON atomically (temp file, then rename).
fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), ExportError> {
    let json = serde_json::to_string_pretty(value)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ExportError::Io(parent.to_path_buf(), e))?;
    }
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, json).map_err(|e| ExportError::Io(tmp_path.clone(), e))?;
    std::fs::rename(&tmp_path, path).map_err(|e| ExportError::Io(path.to_path_buf(), e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MetricResult;

    fn events() -> Vec<TagEvent> {
        vec![
            TagEvent::new("A", 2_000_000, 902.75, 10.0, -50.0),
            TagEvent::new("B", 2_001_500, 902.75, 40.0, -55.0),
            TagEvent::new("A", 2_003_000, 915.75, 12.0, -51.0),
        ]
    }

    #[test]
    fn test_sequential_log_relative_millis() {
        let log = sequential_log(&events());
        let stamps: Vec<f64> = log.iter().map(|r| r.timestamp).collect();
        assert_eq!(stamps, vec![0.0, 1.5, 3.0]);
        assert_eq!(log[1].epc, "B");
        assert_eq!(log[2].channel, 915.75);
    }

    #[test]
    fn test_relative_time_uses_minimum_not_first() {
        let log = sequential_log(&[
            TagEvent::new("A", 5_000, 902.75, 0.0, -50.0),
            TagEvent::new("A", 1_000, 902.75, 0.0, -50.0),
        ]);
        assert_eq!(log[0].timestamp, 4.0);
        assert_eq!(log[1].timestamp, 0.0);
    }

    #[test]
    fn test_aggregated_log_groups_by_tag() {
        let grouped = aggregated_log(&events());
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped["A"].phases, vec![10.0, 12.0]);
        assert_eq!(grouped["A"].timestamps, vec![0.0, 3.0]);
        assert_eq!(grouped["B"].rssis, vec![-55.0]);
    }

    #[test]
    fn test_export_writes_three_files() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = SessionExporter::new(dir.path(), true);
        let mut history = HistoryRecorder::new(0);
        history.record(MetricKind::Phase, &MetricResult::Value(30.0));

        let report = exporter
            .export_with_stamp("soil", "20240101_120000", &events(), &history)
            .unwrap();
        assert_eq!(report.written.len(), 3);

        let seq = dir.path().join("json/tags/soil_20240101_120000_seq.json");
        let parsed: Vec<SequentialRecord> =
            serde_json::from_str(&std::fs::read_to_string(seq).unwrap()).unwrap();
        assert_eq!(parsed.len(), 3);

        let phases = dir.path().join("json/phases/soil_20240101_120000_phases.json");
        let values: Vec<f64> =
            serde_json::from_str(&std::fs::read_to_string(phases).unwrap()).unwrap();
        assert_eq!(values, vec![30.0]);
        assert!(dir.path().join("json/raw/soil_20240101_120000_raw.json").exists());
    }

    #[test]
    fn test_store_data_disabled_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = SessionExporter::new(dir.path().join("out"), false);
        let report = exporter
            .export_with_stamp("soil", "x", &events(), &HistoryRecorder::new(0))
            .unwrap();
        assert!(report.written.is_empty());
        assert!(!dir.path().join("out").exists());
    }

    #[test]
    fn test_empty_session_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = SessionExporter::new(dir.path(), true);
        let report = exporter
            .export_with_stamp("soil", "x", &[], &HistoryRecorder::new(0))
            .unwrap();
        assert!(report.written.is_empty());
    }
}
