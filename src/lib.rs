//! rfsense: Streaming RFID Phase-Differencing Engine
//!
//! Turns a stream of passive-tag reads into one scalar per evaluation: the
//! phase (or RSSI) differential between a reference tag and a sensing tag
//! averaged over every channel both were read on.
//!
//! ## Architecture
//!
//! - **Acquisition**: reader report lines and a simulated reader
//! - **Engine**: bounded event buffer, per-channel partitioning, phase
//!   unwrapping, alignment (interpolation, DTW, truncation) and folding
//! - **History / Export**: recorded readings and JSON session exports
//! - **Pipeline**: producer/consumer session on tokio with cancellation

pub mod acquisition;
pub mod config;
pub mod engine;
pub mod export;
pub mod history;
pub mod pipeline;
pub mod types;

// Re-export configuration
pub use config::{ConfigError, EngineConfig};

// Re-export commonly used types
pub use types::{ChannelKey, MetricKind, MetricResult, NoReadingReason, TagEvent};

// Re-export the engine
pub use engine::{AlignmentStrategy, DifferentialEngine, EngineError, EventBuffer, TagPair};

// Re-export history and export
pub use export::{ExportError, SessionExporter};
pub use history::HistoryRecorder;
