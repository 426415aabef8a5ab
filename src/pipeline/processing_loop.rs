//! Producer and consumer loops of a collection session.
//!
//! - [`IngestLoop`] pulls events from an [`EventSource`] and appends them to
//!   the engine buffer. It is the only writer.
//! - [`MetricLoop`] evaluates the engine on a fixed tick, records readings
//!   into the history and publishes every result on a `watch` channel.
//!
//! Both loops stop on their cancellation token.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::source::{EventSource, SourceEvent};
use crate::config::defaults::STATUS_LOG_INTERVAL_MS;
use crate::engine::{DifferentialEngine, EngineError};
use crate::history::HistoryRecorder;
use crate::types::{MetricKind, MetricResult};

// ============================================================================
// Ingest Loop (producer)
// ============================================================================

/// Counters kept by the ingest loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Events appended to the buffer
    pub ingested: u64,
    /// Records dropped because they could not be parsed
    pub malformed: u64,
    /// Valid reads from tags outside the active profile
    pub ignored: u64,
    /// Read failures that ended the input before EOF
    pub source_errors: u64,
}

impl IngestStats {
    /// The source failed instead of reaching EOF or being stopped.
    pub fn is_truncated(&self) -> bool {
        self.source_errors > 0
    }
}

pub struct IngestLoop {
    engine: Arc<DifferentialEngine>,
    accepted: Option<HashSet<String>>,
    cancel_token: CancellationToken,
}

impl IngestLoop {
    pub fn new(engine: Arc<DifferentialEngine>, cancel_token: CancellationToken) -> Self {
        Self {
            engine,
            accepted: None,
            cancel_token,
        }
    }

    /// Only buffer reads from these EPCs.
    pub fn accept_only(mut self, epcs: impl IntoIterator<Item = String>) -> Self {
        self.accepted = Some(epcs.into_iter().collect());
        self
    }

    /// Run until the source is exhausted or cancellation.
    ///
    /// Returns `Err` only for fatal buffer failures. A failing source stops
    /// the loop and is counted in [`IngestStats::source_errors`].
    pub async fn run<S: EventSource>(self, mut source: S) -> Result<IngestStats, EngineError> {
        let mut stats = IngestStats::default();
        info!(source = source.source_name(), "Reading tag events");

        loop {
            let event = tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    debug!("[IngestLoop] Stop requested");
                    break;
                }
                result = source.next_event() => {
                    match result {
                        Ok(ev) => ev,
                        Err(e) => {
                            stats.source_errors += 1;
                            error!(
                                error = %e,
                                ingested = stats.ingested,
                                "[IngestLoop] Source failed, input truncated"
                            );
                            break;
                        }
                    }
                }
            };

            match event {
                SourceEvent::Event(event) => {
                    if let Some(accepted) = &self.accepted {
                        if !accepted.contains(&event.tag_id) {
                            stats.ignored += 1;
                            continue;
                        }
                    }
                    if let Err(e) = self.engine.append(event) {
                        error!(error = %e, "[IngestLoop] Buffer append failed");
                        return Err(e);
                    }
                    stats.ingested += 1;
                }
                SourceEvent::Malformed(reason) => {
                    stats.malformed += 1;
                    let err = EngineError::MalformedEvent(reason);
                    warn!(error = %err, "Dropping record");
                }
                SourceEvent::Eof => {
                    info!(
                        source = source.source_name(),
                        ingested = stats.ingested,
                        "Source reached end"
                    );
                    break;
                }
            }
        }

        Ok(stats)
    }
}

// ============================================================================
// Metric Loop (consumer)
// ============================================================================

/// Latest evaluation, as published to display collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MetricUpdate {
    /// Evaluation counter, 0 before the first tick
    pub tick: u64,
    pub phase: Option<MetricResult>,
    pub rssi: Option<MetricResult>,
}

impl MetricUpdate {
    pub fn get(&self, kind: MetricKind) -> Option<MetricResult> {
        match kind {
            MetricKind::Phase => self.phase,
            MetricKind::Rssi => self.rssi,
        }
    }
}

/// What the metric loop hands back when it stops.
#[derive(Debug, Clone)]
pub struct MetricOutcome {
    pub history: HistoryRecorder,
    pub evaluations: u64,
    pub valid: u64,
}

pub struct MetricLoop {
    engine: Arc<DifferentialEngine>,
    kinds: Vec<MetricKind>,
    tick_interval: Duration,
    history: HistoryRecorder,
    publisher: watch::Sender<MetricUpdate>,
    cancel_token: CancellationToken,
}

impl MetricLoop {
    /// `primary` is always evaluated; `track_rssi` adds the RSSI series.
    pub fn new(
        engine: Arc<DifferentialEngine>,
        primary: MetricKind,
        track_rssi: bool,
        tick_interval: Duration,
        history: HistoryRecorder,
        cancel_token: CancellationToken,
    ) -> (Self, watch::Receiver<MetricUpdate>) {
        let mut kinds = vec![primary];
        if track_rssi && primary != MetricKind::Rssi {
            kinds.push(MetricKind::Rssi);
        }
        let (publisher, receiver) = watch::channel(MetricUpdate::default());
        (
            Self {
                engine,
                kinds,
                tick_interval: tick_interval.max(Duration::from_millis(1)),
                history,
                publisher,
                cancel_token,
            },
            receiver,
        )
    }

    fn evaluate_once(&mut self, tick: u64) -> Result<MetricUpdate, EngineError> {
        let window = self.engine.snapshot_window()?;
        let mut update = MetricUpdate {
            tick,
            ..MetricUpdate::default()
        };
        for &kind in &self.kinds {
            let result = self.engine.evaluate(&window, kind);
            debug!(metric = %kind, result = %result, events = window.len(), "Evaluated");
            self.history.record(kind, &result);
            match kind {
                MetricKind::Phase => update.phase = Some(result),
                MetricKind::Rssi => update.rssi = Some(result),
            }
        }
        // Receivers may all be gone; publishing is best effort
        let _ = self.publisher.send(update);
        Ok(update)
    }

    /// Tick until cancelled, then run one final evaluation.
    pub async fn run(mut self) -> Result<MetricOutcome, EngineError> {
        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let status_every = (STATUS_LOG_INTERVAL_MS / millis(self.tick_interval)).max(1);

        let primary = self.kinds[0];
        let mut evaluations = 0u64;
        let mut valid = 0u64;

        loop {
            let stopping = tokio::select! {
                biased;
                _ = self.cancel_token.cancelled() => true,
                _ = ticker.tick() => false,
            };

            evaluations += 1;
            let update = match self.evaluate_once(evaluations) {
                Ok(u) => u,
                Err(e) => {
                    error!(error = %e, "[MetricLoop] Fatal evaluation error");
                    return Err(e);
                }
            };
            let latest = update.get(primary);
            if latest.is_some_and(|r| r.is_reading()) {
                valid += 1;
            }

            if evaluations % status_every == 0 {
                if let Some(result) = latest {
                    info!(
                        metric = %primary,
                        result = %result,
                        buffered = self.engine.buffer().len(),
                        "Differential"
                    );
                }
            }

            if stopping {
                break;
            }
        }

        Ok(MetricOutcome {
            history: self.history,
            evaluations,
            valid,
        })
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{AlignmentStrategy, EventBuffer, TagPair};
    use crate::pipeline::source::VecSource;
    use crate::types::TagEvent;

    fn engine() -> Arc<DifferentialEngine> {
        Arc::new(DifferentialEngine::new(
            Arc::new(EventBuffer::new(100)),
            100,
            Some(TagPair {
                reference: "REF".to_string(),
                sensing: "SEN".to_string(),
            }),
            AlignmentStrategy::Truncate.build(100),
        ))
    }

    fn offset_events(n: i64) -> Vec<TagEvent> {
        (0..n)
            .flat_map(|i| {
                [
                    TagEvent::new("REF", i * 10, 902.75, 40.0, -50.0),
                    TagEvent::new("SEN", i * 10 + 5, 902.75, 60.0, -53.0),
                ]
            })
            .collect()
    }

    #[tokio::test]
    async fn test_ingest_filters_foreign_tags() {
        let engine = engine();
        let mut events = offset_events(3);
        events.push(TagEvent::new("OTHER", 99, 902.75, 0.0, -40.0));

        let stats = IngestLoop::new(Arc::clone(&engine), CancellationToken::new())
            .accept_only(["REF".to_string(), "SEN".to_string()])
            .run(VecSource::new(events, 0))
            .await
            .unwrap();

        assert_eq!(stats.ingested, 6);
        assert_eq!(stats.ignored, 1);
        assert_eq!(engine.buffer().len(), 6);
    }

    struct FailingSource {
        events: std::vec::IntoIter<TagEvent>,
    }

    #[async_trait::async_trait]
    impl EventSource for FailingSource {
        async fn next_event(&mut self) -> anyhow::Result<SourceEvent> {
            match self.events.next() {
                Some(e) => Ok(SourceEvent::Event(e)),
                None => Err(anyhow::anyhow!("connection reset")),
            }
        }

        fn source_name(&self) -> &str {
            "failing"
        }
    }

    #[tokio::test]
    async fn test_ingest_counts_source_failure() {
        let engine = engine();
        let source = FailingSource {
            events: offset_events(2).into_iter(),
        };
        let stats = IngestLoop::new(Arc::clone(&engine), CancellationToken::new())
            .run(source)
            .await
            .unwrap();

        assert_eq!(stats.ingested, 4);
        assert_eq!(stats.source_errors, 1);
        assert!(stats.is_truncated());
    }

    #[tokio::test]
    async fn test_ingest_eof_is_not_truncated() {
        let stats = IngestLoop::new(engine(), CancellationToken::new())
            .run(VecSource::new(offset_events(2), 0))
            .await
            .unwrap();
        assert_eq!(stats.source_errors, 0);
        assert!(!stats.is_truncated());
    }

    #[tokio::test]
    async fn test_metric_loop_publishes_and_records() {
        let engine = engine();
        for e in offset_events(5) {
            engine.append(e).unwrap();
        }

        let cancel = CancellationToken::new();
        let (metric_loop, mut rx) = MetricLoop::new(
            Arc::clone(&engine),
            MetricKind::Phase,
            true,
            Duration::from_millis(5),
            HistoryRecorder::new(0),
            cancel.clone(),
        );
        let handle = tokio::spawn(metric_loop.run());

        rx.changed().await.unwrap();
        let update = *rx.borrow();
        assert_eq!(update.phase, Some(MetricResult::Value(20.0)));
        assert_eq!(update.rssi, Some(MetricResult::Value(3.0)));

        cancel.cancel();
        let outcome = handle.await.unwrap().unwrap();
        assert!(outcome.evaluations >= 2);
        assert_eq!(outcome.valid, outcome.evaluations);
        assert_eq!(outcome.history.len(MetricKind::Phase) as u64, outcome.evaluations);
    }

    #[tokio::test]
    async fn test_metric_loop_no_reading_is_not_recorded() {
        let engine = engine();
        let cancel = CancellationToken::new();
        let (metric_loop, _rx) = MetricLoop::new(
            engine,
            MetricKind::Phase,
            false,
            Duration::from_millis(5),
            HistoryRecorder::new(0),
            cancel.clone(),
        );
        cancel.cancel();
        let outcome = metric_loop.run().await.unwrap();
        assert_eq!(outcome.evaluations, 1);
        assert_eq!(outcome.valid, 0);
        assert!(outcome.history.is_empty(MetricKind::Phase));
    }
}
