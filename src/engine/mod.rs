//! Differential Engine
//!
//! Computes one differential reading between a reference tag and a sensing
//! tag from the most recent window of reads.
//!
//! ## Evaluation
//!
//! 1. Copy the last `window_size` events out of the [`EventBuffer`]
//! 2. Partition reads by tag and by exact channel frequency
//! 3. Sort each series by time and unwrap phase
//! 4. Align each comparable channel pair with the configured [`Aligner`]
//! 5. Pool the folded (phase) or signed (RSSI) differences into one mean
//!
//! Every step after the copy works on owned data, so the reader keeps
//! appending while the metric is computed.

pub mod alignment;
pub mod buffer;
pub mod difference;
pub mod unwrap;
pub mod window;

pub use alignment::{
    AlignedPair, Aligner, AlignmentStrategy, DtwAligner, InterpolationAligner, TruncateAligner,
};
pub use buffer::EventBuffer;
pub use difference::{differential_samples, fold, SamplePool};
pub use unwrap::{unwrap_phases, unwrap_series};
pub use window::{ChannelSeries, PartitionedWindow, SeriesPoint, TagPair, Window};

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::config::defaults::{MIN_POINTS_PER_CHANNEL, MIN_WINDOW_EVENTS};
use crate::config::{ConfigError, EngineConfig};
use crate::types::{MetricKind, MetricResult, NoReadingReason, TagEvent};

/// Errors raised while ingesting or evaluating.
///
/// Only [`EngineError::BufferPoisoned`] escapes an evaluation; the rest are
/// logged and turned into skipped data or a no-reading result.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Insufficient tags: {configured} distinct identity configured, need 2")]
    InsufficientTags { configured: usize },

    #[error("Insufficient data: need {needed}, have {available}")]
    InsufficientData { needed: usize, available: usize },

    #[error("Degenerate interpolation interval at t={timestamp}us")]
    DegenerateInterval { timestamp: i64 },

    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    #[error("Event buffer lock poisoned")]
    BufferPoisoned,
}

impl EngineError {
    /// Fatal errors stop the session; everything else degrades to a skip.
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::BufferPoisoned)
    }
}

/// Buffer plus evaluation settings for one tag-pair sensor.
#[derive(Debug)]
pub struct DifferentialEngine {
    buffer: Arc<EventBuffer>,
    window_size: usize,
    pair: Option<TagPair>,
    aligner: Box<dyn Aligner>,
}

impl DifferentialEngine {
    pub fn new(
        buffer: Arc<EventBuffer>,
        window_size: usize,
        pair: Option<TagPair>,
        aligner: Box<dyn Aligner>,
    ) -> Self {
        Self {
            buffer,
            window_size,
            pair,
            aligner,
        }
    }

    /// Build an engine for the config's active sensor profile.
    ///
    /// A profile that cannot designate two tags still yields an engine; it
    /// reports `NoReading(InsufficientTags)` on every evaluation.
    pub fn from_config(config: &EngineConfig) -> Result<Self, ConfigError> {
        let profile = config.active_profile()?;
        let window_size = profile.window_size(config.reader.read_rate);
        let pair = match profile.tag_pair() {
            Ok(pair) => Some(pair),
            Err(e) => {
                warn!(sensor = %config.active_sensor, error = %e, "Tag designation failed");
                None
            }
        };

        Ok(Self::new(
            Arc::new(EventBuffer::new(config.buffer.buffer_size)),
            window_size,
            pair,
            config.engine.alignment.build(window_size),
        ))
    }

    pub fn buffer(&self) -> &Arc<EventBuffer> {
        &self.buffer
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn tag_pair(&self) -> Option<&TagPair> {
        self.pair.as_ref()
    }

    pub fn aligner_name(&self) -> &'static str {
        self.aligner.name()
    }

    pub fn append(&self, event: TagEvent) -> Result<(), EngineError> {
        self.buffer.append(event)
    }

    /// Copy the current evaluation window out of the buffer.
    pub fn snapshot_window(&self) -> Result<Window, EngineError> {
        Ok(Window::new(self.buffer.snapshot_tail(self.window_size)?))
    }

    /// Snapshot the buffer and evaluate one metric over it.
    pub fn compute_metric(&self, kind: MetricKind) -> Result<MetricResult, EngineError> {
        if self.pair.is_none() {
            return Ok(MetricResult::NoReading(NoReadingReason::InsufficientTags));
        }
        let window = self.snapshot_window()?;
        Ok(self.evaluate(&window, kind))
    }

    /// Evaluate one metric over an already-copied window.
    ///
    /// Pure with respect to `window`: the same window always gives the same
    /// result.
    pub fn evaluate(&self, window: &Window, kind: MetricKind) -> MetricResult {
        let Some(pair) = &self.pair else {
            return MetricResult::NoReading(NoReadingReason::InsufficientTags);
        };
        if window.len() < MIN_WINDOW_EVENTS {
            debug!(events = window.len(), "Window too small for evaluation");
            return MetricResult::NoReading(NoReadingReason::InsufficientEvents);
        }

        let parts = window.partition(pair, kind);
        let mut pool = SamplePool::default();

        for (reference, sensing) in parts.comparable_pairs() {
            let available = reference.len().min(sensing.len());
            if available < MIN_POINTS_PER_CHANNEL {
                let err = EngineError::InsufficientData {
                    needed: MIN_POINTS_PER_CHANNEL,
                    available,
                };
                debug!(channel = %reference.channel, error = %err, "Skipping channel");
                continue;
            }

            let mut reference = reference.clone();
            let mut sensing = sensing.clone();
            reference.sort_by_time();
            sensing.sort_by_time();
            if kind == MetricKind::Phase {
                unwrap_series(&mut reference);
                unwrap_series(&mut sensing);
            }

            let aligned = self.aligner.align(&reference, &sensing);
            let samples = differential_samples(kind, &aligned);
            debug!(
                channel = %reference.channel,
                aligner = self.aligner.name(),
                reference_points = reference.len(),
                sensing_points = sensing.len(),
                samples = samples.len(),
                "Channel aligned"
            );
            pool.extend(&samples);
        }

        match pool.mean() {
            Some(mean) => MetricResult::Value(mean),
            None => MetricResult::NoReading(NoReadingReason::NoComparableChannels),
        }
    }
}
