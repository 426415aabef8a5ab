//! Window extraction and channel partitioning.
//!
//! A [`Window`] is an immutable copy of the buffer tail. Partitioning splits
//! it into per-(tag, channel) [`ChannelSeries`] for the reference and sensing
//! tags; reads from any other tag are ignored for that evaluation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::EngineError;
use crate::types::{ChannelKey, MetricKind, TagEvent};

// ============================================================================
// Tag designation
// ============================================================================

/// Which tag is the reference and which one carries the sensing element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagPair {
    pub reference: String,
    pub sensing: String,
}

impl TagPair {
    /// Resolve a designation from an ordered EPC list and optional overrides.
    ///
    /// Without overrides the first EPC is the reference and the next distinct
    /// EPC is the sensing tag. Fails with `InsufficientTags` when two distinct
    /// identities cannot be found.
    pub fn designate(
        epcs: &[String],
        reference: Option<&str>,
        sensing: Option<&str>,
    ) -> Result<Self, EngineError> {
        let mut distinct: Vec<&str> = Vec::with_capacity(epcs.len() + 2);
        for epc in reference
            .into_iter()
            .chain(epcs.iter().map(String::as_str))
            .chain(sensing)
        {
            if !distinct.contains(&epc) {
                distinct.push(epc);
            }
        }

        let reference =
            reference.or_else(|| distinct.iter().copied().find(|epc| Some(*epc) != sensing));
        let sensing =
            sensing.or_else(|| distinct.iter().copied().find(|epc| Some(*epc) != reference));

        match (reference, sensing) {
            (Some(r), Some(s)) if r != s => Ok(Self {
                reference: r.to_string(),
                sensing: s.to_string(),
            }),
            // at most one usable identity remains when designation fails
            _ => Err(EngineError::InsufficientTags {
                configured: distinct.len().min(1),
            }),
        }
    }

    pub fn contains(&self, tag_id: &str) -> bool {
        self.reference == tag_id || self.sensing == tag_id
    }
}

// ============================================================================
// Channel series
// ============================================================================

/// One timestamped sample of a single tag on a single channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesPoint {
    pub timestamp_micros: i64,
    pub value: f64,
}

/// Samples of one tag on one channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSeries {
    pub tag_id: String,
    pub channel: ChannelKey,
    pub points: Vec<SeriesPoint>,
}

impl ChannelSeries {
    pub fn new(tag_id: impl Into<String>, channel: ChannelKey) -> Self {
        Self {
            tag_id: tag_id.into(),
            channel,
            points: Vec::new(),
        }
    }

    pub fn push(&mut self, timestamp_micros: i64, value: f64) {
        self.points.push(SeriesPoint {
            timestamp_micros,
            value,
        });
    }

    /// Stable sort by timestamp; equal timestamps keep arrival order.
    pub fn sort_by_time(&mut self) {
        self.points.sort_by_key(|p| p.timestamp_micros);
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

// ============================================================================
// Window
// ============================================================================

/// Point-in-time copy of the most recent events.
#[derive(Debug, Clone, Default)]
pub struct Window {
    events: Vec<TagEvent>,
}

impl Window {
    pub fn new(events: Vec<TagEvent>) -> Self {
        Self { events }
    }

    pub fn events(&self) -> &[TagEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Split the window into arrival-ordered series per channel for both tags.
    ///
    /// Events whose value or channel is not finite are dropped with a warning.
    pub fn partition(&self, pair: &TagPair, kind: MetricKind) -> PartitionedWindow {
        let mut reference: BTreeMap<ChannelKey, ChannelSeries> = BTreeMap::new();
        let mut sensing: BTreeMap<ChannelKey, ChannelSeries> = BTreeMap::new();
        let mut dropped = 0usize;

        for event in &self.events {
            let side = if event.tag_id == pair.reference {
                &mut reference
            } else if event.tag_id == pair.sensing {
                &mut sensing
            } else {
                continue;
            };

            let value = match kind {
                MetricKind::Phase => event.phase_degrees,
                MetricKind::Rssi => event.rssi_dbm,
            };
            if !value.is_finite() || !event.channel_mhz.is_finite() {
                dropped += 1;
                continue;
            }

            let channel = event.channel_key();
            side.entry(channel)
                .or_insert_with(|| ChannelSeries::new(event.tag_id.clone(), channel))
                .push(event.timestamp_micros, value);
        }

        if dropped > 0 {
            let err = EngineError::MalformedEvent(format!(
                "{dropped} event(s) with non-finite {kind} or channel"
            ));
            warn!(error = %err, "Dropping unusable reads from window");
        }

        PartitionedWindow { reference, sensing }
    }
}

/// Per-channel series for the reference and sensing tag of one window.
#[derive(Debug, Clone, Default)]
pub struct PartitionedWindow {
    pub reference: BTreeMap<ChannelKey, ChannelSeries>,
    pub sensing: BTreeMap<ChannelKey, ChannelSeries>,
}

impl PartitionedWindow {
    /// Channels read for both tags, in ascending frequency order.
    pub fn comparable_pairs(&self) -> impl Iterator<Item = (&ChannelSeries, &ChannelSeries)> {
        self.reference
            .iter()
            .filter_map(|(channel, r)| self.sensing.get(channel).map(|s| (r, s)))
    }

    pub fn shared_channel_count(&self) -> usize {
        self.comparable_pairs().count()
    }
}
