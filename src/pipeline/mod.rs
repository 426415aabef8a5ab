//! Collection Pipeline
//!
//! ```text
//! EventSource ──▶ IngestLoop ──append──▶ EventBuffer
//!                                            │ snapshot_tail
//!                 MetricLoop ◀───────────────┘
//!                     │ every tick_interval_ms
//!                     ├──▶ HistoryRecorder
//!                     └──▶ watch::Sender<MetricUpdate>
//! ```
//!
//! The buffer is the only state shared between the two loops.

pub mod processing_loop;
pub mod session;
pub mod source;

pub use processing_loop::{IngestLoop, IngestStats, MetricLoop, MetricOutcome, MetricUpdate};
pub use session::{
    default_collection_time, parse_duration, CollectionTime, Session, SessionReport,
    SessionSettings, SessionStats,
};
pub use source::{
    EventSource, LineSource, ReplaySource, SimulatedSource, SourceEvent, StdinSource, VecSource,
};
