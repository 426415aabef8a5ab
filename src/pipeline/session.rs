//! Collection session runner.
//!
//! A session wires one [`EventSource`] to the engine through an
//! [`IngestLoop`] and a [`MetricLoop`], runs for the collection time (or
//! until cancelled or the source ends) and tears down in a fixed order:
//!
//! 1. stop the producer and join it
//! 2. stop the metric loop (it evaluates once more) and join it
//! 3. copy the buffer for export, with no writer left

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::processing_loop::{IngestLoop, IngestStats, MetricLoop, MetricUpdate};
use super::source::EventSource;
use crate::config::defaults::DEFAULT_COLLECTION_SECS;
use crate::config::{ConfigError, EngineConfig};
use crate::engine::DifferentialEngine;
use crate::export::{ExportError, ExportReport, SessionExporter};
use crate::history::HistoryRecorder;
use crate::types::{MetricKind, TagEvent};

// ============================================================================
// Collection Time
// ============================================================================

/// Parsed collection time with the label used in export file names.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionTime {
    pub duration: Duration,
    /// e.g. `"5m"`, `"30s"`
    pub label: String,
}

/// Parse `10s`, `5m`, `2h`, `1d` or a bare number of seconds.
///
/// Anything unparsable, negative, or zero falls back to the default
/// collection time.
pub fn parse_duration(input: &str) -> CollectionTime {
    let trimmed = input.trim();
    let (number, multiplier, labelled) = match trimmed.char_indices().last() {
        Some((i, 's')) => (&trimmed[..i], 1.0, true),
        Some((i, 'm')) => (&trimmed[..i], 60.0, true),
        Some((i, 'h')) => (&trimmed[..i], 3_600.0, true),
        Some((i, 'd')) => (&trimmed[..i], 86_400.0, true),
        _ => (trimmed, 1.0, false),
    };

    match number.trim().parse::<f64>() {
        Ok(v) if v.is_finite() && v > 0.0 => CollectionTime {
            duration: Duration::from_secs_f64(v * multiplier),
            label: if labelled {
                trimmed.to_string()
            } else {
                format!("{trimmed}s")
            },
        },
        _ => default_collection_time(),
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn default_collection_time() -> CollectionTime {
    CollectionTime {
        duration: Duration::from_secs_f64(DEFAULT_COLLECTION_SECS),
        label: format!("{}s", DEFAULT_COLLECTION_SECS as u64),
    }
}

// ============================================================================
// Session
// ============================================================================

#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Stop after this long; `None` runs until cancelled or EOF
    pub duration: Option<Duration>,
    pub metric: MetricKind,
    pub track_rssi: bool,
    pub tick_interval: Duration,
    pub history_capacity: usize,
    /// Only buffer reads from these EPCs; `None` accepts every tag
    pub accepted_epcs: Option<Vec<String>>,
}

impl SessionSettings {
    pub fn from_config(config: &EngineConfig, duration: Option<Duration>) -> Result<Self, ConfigError> {
        let profile = config.active_profile()?;
        let mut accepted = profile.epcs.clone();
        accepted.extend(profile.reference_epc.iter().cloned());
        accepted.extend(profile.sensing_epc.iter().cloned());

        Ok(Self {
            duration,
            metric: config.engine.metric,
            track_rssi: config.engine.track_rssi,
            tick_interval: Duration::from_millis(config.engine.tick_interval_ms),
            history_capacity: config.buffer.history_capacity,
            accepted_epcs: Some(accepted),
        })
    }
}

/// Summary counters of a finished session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionStats {
    pub ingested: u64,
    pub malformed: u64,
    pub ignored: u64,
    /// Non-zero when the source failed before EOF
    pub source_errors: u64,
    pub evaluations: u64,
    /// Evaluations of the primary metric that produced a reading
    pub valid: u64,
    pub phase_mean: Option<f64>,
    pub rssi_mean: Option<f64>,
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} events ingested ({} malformed, {} ignored), {}/{} evaluations valid",
            self.ingested, self.malformed, self.ignored, self.valid, self.evaluations
        )?;
        if self.source_errors > 0 {
            write!(f, ", input truncated by {} source error(s)", self.source_errors)?;
        }
        if let Some(mean) = self.phase_mean {
            write!(f, ", mean phase differential {mean:.2}°")?;
        }
        if let Some(mean) = self.rssi_mean {
            write!(f, ", mean RSSI differential {mean:.2} dB")?;
        }
        Ok(())
    }
}

/// Everything a finished session leaves behind.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub stats: SessionStats,
    pub history: HistoryRecorder,
    /// Buffer contents after the producer stopped
    pub events: Vec<TagEvent>,
}

impl SessionReport {
    pub fn export(&self, exporter: &SessionExporter, name: &str) -> Result<ExportReport, ExportError> {
        exporter.export(name, &self.events, &self.history)
    }
}

pub struct Session {
    engine: Arc<DifferentialEngine>,
    duration: Option<Duration>,
    accepted_epcs: Option<Vec<String>>,
    metric_loop: MetricLoop,
    cancel_token: CancellationToken,
    producer_token: CancellationToken,
    consumer_token: CancellationToken,
}

impl Session {
    /// Build a session. The receiver sees every published evaluation.
    pub fn new(
        engine: Arc<DifferentialEngine>,
        settings: SessionSettings,
        cancel_token: CancellationToken,
    ) -> (Self, watch::Receiver<MetricUpdate>) {
        let producer_token = cancel_token.child_token();
        let consumer_token = cancel_token.child_token();
        let (metric_loop, receiver) = MetricLoop::new(
            Arc::clone(&engine),
            settings.metric,
            settings.track_rssi,
            settings.tick_interval,
            HistoryRecorder::new(settings.history_capacity),
            consumer_token.clone(),
        );

        (
            Self {
                engine,
                duration: settings.duration,
                accepted_epcs: settings.accepted_epcs,
                metric_loop,
                cancel_token,
                producer_token,
                consumer_token,
            },
            receiver,
        )
    }

    /// Run the session to completion.
    pub async fn run<S: EventSource>(self, source: S) -> Result<SessionReport> {
        let mut ingest = IngestLoop::new(Arc::clone(&self.engine), self.producer_token.clone());
        if let Some(epcs) = self.accepted_epcs {
            ingest = ingest.accept_only(epcs);
        }

        info!(
            window = self.engine.window_size(),
            aligner = self.engine.aligner_name(),
            duration_secs = self.duration.map(|d| d.as_secs_f64()),
            "Starting collection"
        );

        let mut producer = tokio::spawn(ingest.run(source));
        let consumer = tokio::spawn(self.metric_loop.run());

        let duration = self.duration;
        let deadline = async move {
            match duration {
                Some(d) => tokio::time::sleep(d).await,
                None => std::future::pending::<()>().await,
            }
        };

        let mut producer_result = None;
        tokio::select! {
            _ = self.cancel_token.cancelled() => {
                info!("Stop requested");
            }
            _ = deadline => {
                info!("Collection time elapsed");
            }
            joined = &mut producer => {
                producer_result = Some(joined);
            }
        }

        // 1. producer
        self.producer_token.cancel();
        let joined = match producer_result {
            Some(joined) => joined,
            None => producer.await,
        };
        let ingest_stats: IngestStats = match joined.context("Ingest task panicked")? {
            Ok(stats) => stats,
            Err(e) => {
                error!(error = %e, "Ingest loop failed");
                self.consumer_token.cancel();
                let _ = consumer.await;
                return Err(e).context("Ingest loop failed");
            }
        };

        // 2. consumer
        self.consumer_token.cancel();
        let outcome = consumer
            .await
            .context("Metric task panicked")?
            .context("Metric loop failed")?;

        // 3. snapshot for export
        let events = self.engine.buffer().snapshot_all()?;

        let stats = SessionStats {
            ingested: ingest_stats.ingested,
            malformed: ingest_stats.malformed,
            ignored: ingest_stats.ignored,
            source_errors: ingest_stats.source_errors,
            evaluations: outcome.evaluations,
            valid: outcome.valid,
            phase_mean: outcome.history.mean(MetricKind::Phase),
            rssi_mean: outcome.history.mean(MetricKind::Rssi),
        };
        if ingest_stats.is_truncated() {
            warn!(%stats, "Collection finished early on a source error");
        } else {
            info!(%stats, "Collection finished");
        }

        Ok(SessionReport {
            stats,
            history: outcome.history,
            events,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("10s").duration, Duration::from_secs(10));
        assert_eq!(parse_duration("5m").duration, Duration::from_secs(300));
        assert_eq!(parse_duration("2h").duration, Duration::from_secs(7_200));
        assert_eq!(parse_duration("1d").duration, Duration::from_secs(86_400));
        assert_eq!(parse_duration("1.5m").duration, Duration::from_secs(90));
    }

    #[test]
    fn test_parse_duration_bare_number_is_seconds() {
        let t = parse_duration("45");
        assert_eq!(t.duration, Duration::from_secs(45));
        assert_eq!(t.label, "45s");
        assert_eq!(parse_duration("2h").label, "2h");
    }

    #[test]
    fn test_parse_duration_falls_back_to_default() {
        for input in ["", "soon", "-5s", "0", "m"] {
            let t = parse_duration(input);
            assert_eq!(t, default_collection_time(), "input {input:?}");
        }
        assert_eq!(default_collection_time().label, "30s");
    }

    #[test]
    fn test_settings_accept_profile_epcs() {
        let config = EngineConfig::default();
        let settings = SessionSettings::from_config(&config, None).unwrap();
        assert_eq!(settings.accepted_epcs.as_ref().map(Vec::len), Some(2));
        assert_eq!(settings.tick_interval, Duration::from_millis(10));
    }

    #[test]
    fn test_stats_display() {
        let stats = SessionStats {
            ingested: 10,
            valid: 2,
            evaluations: 3,
            phase_mean: Some(12.345),
            ..Default::default()
        };
        let text = stats.to_string();
        assert!(text.contains("10 events ingested"));
        assert!(text.contains("2/3 evaluations valid"));
        assert!(text.contains("12.35"));
        assert!(!text.contains("truncated"));

        let truncated = SessionStats {
            source_errors: 1,
            ..stats
        };
        assert!(truncated.to_string().contains("input truncated by 1 source error"));
    }
}
