//! Shared data structures for the RFID differencing pipeline
//!
//! This module defines the core types that flow between stages:
//! - Ingestion: TagEvent (one reader observation)
//! - Partitioning: ChannelKey (exact-match frequency key)
//! - Differencing: MetricKind, MetricResult (per-evaluation scalar or "no reading")

mod event;
mod metric;

pub use event::*;
pub use metric::*;
