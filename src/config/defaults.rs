//! System-wide default constants.
//!
//! Centralises magic numbers used across the pipeline.
//! Grouped by subsystem for easy discovery.

// ============================================================================
// Metric
// ============================================================================

/// Numeric stand-in for "no reading" when a result must be a plain number.
pub const NO_READING_SENTINEL: f64 = -1000.0;

/// Minimum events a window must hold before a metric is attempted.
pub const MIN_WINDOW_EVENTS: usize = 4;

/// Minimum points per tag on a channel for that channel to contribute.
pub const MIN_POINTS_PER_CHANNEL: usize = 2;

// ============================================================================
// Phase geometry (degrees)
// ============================================================================

/// Consecutive raw jumps larger than this are treated as a wrap.
pub const PHASE_WRAP_THRESHOLD_DEG: f64 = 180.0;

/// One full turn of the reported phase angle.
pub const FULL_TURN_DEG: f64 = 360.0;

/// Period of the ambiguity between two independently wrapped phases.
pub const FOLD_PERIOD_DEG: f64 = 180.0;

// ============================================================================
// Reader & buffering
// ============================================================================

/// Nominal reads per second across all tags.
pub const DEFAULT_READ_RATE: f64 = 100.0;

/// Event buffer capacity (reads). 10 000 = 100 s at 100 reads/s.
pub const DEFAULT_BUFFER_SIZE: usize = 10_000;

/// History series capacity (results). 0 disables the cap.
pub const DEFAULT_HISTORY_CAPACITY: usize = 100_000;

/// Sensor window length (seconds).
pub const DEFAULT_WINDOW_SECONDS: f64 = 1.0;

// ============================================================================
// Session
// ============================================================================

/// Interval between metric evaluations (ms).
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 10;

/// How often the latest metric is logged (ms).
pub const STATUS_LOG_INTERVAL_MS: u64 = 1_000;

/// Collection time when none (or an unparsable one) is given (seconds).
pub const DEFAULT_COLLECTION_SECS: f64 = 30.0;

/// Sensor profile selected when the config names none.
pub const DEFAULT_SENSOR: &str = "soil";

/// Reference tag of the built-in profile and simulator.
pub const DEFAULT_REFERENCE_EPC: &str = "E28011606000020A4D65A0A1";

/// Sensing tag of the built-in profile and simulator.
pub const DEFAULT_SENSING_EPC: &str = "E28011606000020A4D65A0B2";

/// Root directory for exported session files.
pub const DEFAULT_DATA_DIR: &str = "./data";

// ============================================================================
// Simulation
// ============================================================================

/// Carrier frequencies the simulated reader hops across (MHz).
pub const SIMULATED_CHANNELS_MHZ: [f64; 4] = [902.75, 910.25, 915.75, 927.25];

/// Reads the simulated reader emits on one channel before hopping.
pub const SIMULATED_DWELL_READS: usize = 20;
