//! Event source abstraction for tag read ingestion.
//!
//! Provides a unified trait for reading tag events from different sources:
//! report lines on stdin, a replayed capture file, the built-in simulator,
//! and pre-loaded event lists.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use crate::acquisition::{parse_reader_line, SimulatedReader};
use crate::config::PhaseUnit;
use crate::types::TagEvent;

/// Events produced by an event source.
#[derive(Debug)]
pub enum SourceEvent {
    /// A valid tag read.
    Event(TagEvent),
    /// A record that could not be parsed; the source keeps going.
    Malformed(String),
    /// Source reached end of data.
    Eof,
}

/// Trait abstracting where tag reads come from.
///
/// Implementations handle parsing and pacing internally. The ingest loop
/// calls [`next_event`](EventSource::next_event) in a `select!` with
/// cancellation.
#[async_trait]
pub trait EventSource: Send + 'static {
    /// Read the next event. Returns `Err` only on unrecoverable I/O errors.
    async fn next_event(&mut self) -> Result<SourceEvent>;

    /// Human-readable name for logging (e.g. "stdin", "replay", "simulator").
    fn source_name(&self) -> &str;
}

// ============================================================================
// Line Source (stdin / capture replay)
// ============================================================================

/// Reads reader report lines (`epc,timestamp,channel,phase,rssi[,count]`).
///
/// Blank lines and `#` comments are skipped. With a non-zero `speed`, reads
/// are paced by their reader timestamps divided by `speed`.
pub struct LineSource<R> {
    reader: R,
    name: &'static str,
    unit: PhaseUnit,
    speed: f64,
    last_timestamp: Option<i64>,
    line_buffer: String,
}

impl<R: AsyncBufRead + Unpin + Send + 'static> LineSource<R> {
    pub fn new(reader: R, name: &'static str, unit: PhaseUnit) -> Self {
        Self {
            reader,
            name,
            unit,
            speed: 0.0,
            last_timestamp: None,
            line_buffer: String::with_capacity(256),
        }
    }

    /// Replay pacing divisor; 0 disables delays.
    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = if speed.is_finite() && speed > 0.0 { speed } else { 0.0 };
        self
    }

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn pacing_delay(&mut self, timestamp: i64) -> Option<Duration> {
        let previous = self.last_timestamp.replace(timestamp)?;
        if self.speed <= 0.0 || timestamp <= previous {
            return None;
        }
        let micros = (timestamp - previous) as f64 / self.speed;
        Some(Duration::from_micros(micros as u64))
    }
}

/// Report lines from stdin.
pub type StdinSource = LineSource<BufReader<tokio::io::Stdin>>;

impl StdinSource {
    pub fn stdin(unit: PhaseUnit) -> Self {
        LineSource::new(BufReader::new(tokio::io::stdin()), "stdin", unit)
    }
}

/// Report lines replayed from a capture file.
pub type ReplaySource = LineSource<BufReader<tokio::fs::File>>;

impl ReplaySource {
    pub async fn open(path: &Path, unit: PhaseUnit, speed: f64) -> Result<Self> {
        let file = tokio::fs::File::open(path)
            .await
            .with_context(|| format!("Failed to open replay file {}", path.display()))?;
        Ok(LineSource::new(BufReader::new(file), "replay", unit).with_speed(speed))
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send + 'static> EventSource for LineSource<R> {
    async fn next_event(&mut self) -> Result<SourceEvent> {
        loop {
            self.line_buffer.clear();
            let bytes = self.reader.read_line(&mut self.line_buffer).await?;
            if bytes == 0 {
                return Ok(SourceEvent::Eof);
            }
            let line = self.line_buffer.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            return match parse_reader_line(line, self.unit) {
                Ok(event) => {
                    if let Some(delay) = self.pacing_delay(event.timestamp_micros) {
                        tokio::time::sleep(delay).await;
                    }
                    Ok(SourceEvent::Event(event))
                }
                Err(e) => Ok(SourceEvent::Malformed(format!("{e} in line '{line}'"))),
            };
        }
    }

    fn source_name(&self) -> &str {
        self.name
    }
}

// ============================================================================
// Simulated Source
// ============================================================================

/// Live simulated reader, one read per `1 / read_rate` seconds.
pub struct SimulatedSource {
    reader: SimulatedReader,
    paced: bool,
    limit: Option<u64>,
}

impl SimulatedSource {
    pub fn new(reader: SimulatedReader) -> Self {
        Self {
            reader,
            paced: true,
            limit: None,
        }
    }

    /// Emit reads as fast as they are polled.
    pub fn unpaced(mut self) -> Self {
        self.paced = false;
        self
    }

    /// Report EOF after `limit` reads.
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[async_trait]
impl EventSource for SimulatedSource {
    async fn next_event(&mut self) -> Result<SourceEvent> {
        if self.limit.is_some_and(|limit| self.reader.reads() >= limit) {
            return Ok(SourceEvent::Eof);
        }
        if self.paced && self.reader.reads() > 0 {
            let micros = u64::try_from(self.reader.interval_micros()).unwrap_or(0);
            tokio::time::sleep(Duration::from_micros(micros)).await;
        }
        Ok(SourceEvent::Event(self.reader.next_event()))
    }

    fn source_name(&self) -> &str {
        "simulator"
    }
}

// ============================================================================
// Vec Source (pre-loaded events)
// ============================================================================

/// Replays pre-loaded events with optional inter-event delay.
pub struct VecSource {
    events: std::vec::IntoIter<TagEvent>,
    delay_ms: u64,
    yielded_first: bool,
}

impl VecSource {
    pub fn new(events: Vec<TagEvent>, delay_ms: u64) -> Self {
        Self {
            events: events.into_iter(),
            delay_ms,
            yielded_first: false,
        }
    }
}

#[async_trait]
impl EventSource for VecSource {
    async fn next_event(&mut self) -> Result<SourceEvent> {
        if self.yielded_first && self.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        }
        match self.events.next() {
            Some(e) => {
                self.yielded_first = true;
                Ok(SourceEvent::Event(e))
            }
            None => Ok(SourceEvent::Eof),
        }
    }

    fn source_name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_line_source_skips_blank_and_reports_malformed() {
        let input: &[u8] = b"# capture\n\nA,1,902.75,10,-50\nA,oops,902.75,10,-50\nB,2,902.75,20,-51\n";
        let mut source = LineSource::new(input, "test", PhaseUnit::Degrees);

        assert!(matches!(source.next_event().await.unwrap(), SourceEvent::Event(e) if e.tag_id == "A"));
        assert!(matches!(source.next_event().await.unwrap(), SourceEvent::Malformed(_)));
        assert!(matches!(source.next_event().await.unwrap(), SourceEvent::Event(e) if e.tag_id == "B"));
        assert!(matches!(source.next_event().await.unwrap(), SourceEvent::Eof));
    }

    #[tokio::test]
    async fn test_replay_source_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.csv");
        std::fs::write(&path, "A,1,902.75,1.0,-50\n").unwrap();

        let mut source = ReplaySource::open(&path, PhaseUnit::Radians, 0.0).await.unwrap();
        match source.next_event().await.unwrap() {
            SourceEvent::Event(e) => assert!((e.phase_degrees - 1.0f64.to_degrees()).abs() < 1e-9),
            other => panic!("expected event, got {other:?}"),
        }
        assert_eq!(source.source_name(), "replay");
    }

    #[tokio::test]
    async fn test_replay_missing_file_is_error() {
        assert!(ReplaySource::open(Path::new("/nonexistent/capture.csv"), PhaseUnit::Degrees, 0.0)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_vec_source_ends_with_eof() {
        let mut source = VecSource::new(vec![TagEvent::new("A", 1, 902.75, 0.0, -50.0)], 0);
        assert!(matches!(source.next_event().await.unwrap(), SourceEvent::Event(_)));
        assert!(matches!(source.next_event().await.unwrap(), SourceEvent::Eof));
    }

    #[test]
    fn test_pacing_scales_reader_time() {
        let mut source = LineSource::new(&b""[..], "test", PhaseUnit::Degrees).with_speed(2.0);
        assert_eq!(source.pacing_delay(1_000), None);
        assert_eq!(source.pacing_delay(3_000), Some(Duration::from_micros(1_000)));
        assert_eq!(source.pacing_delay(2_000), None);
    }
}
