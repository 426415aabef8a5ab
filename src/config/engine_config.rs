//! Engine Configuration - reader, buffering, and sensor profiles as TOML values
//!
//! Each struct implements `Default`, so a missing file or a partial file
//! yields a runnable configuration built around the default sensor profile.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use super::defaults;
use crate::engine::{AlignmentStrategy, TagPair};
use crate::types::MetricKind;

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for one reader deployment.
///
/// Load with `EngineConfig::load()` which searches:
/// 1. `$RFSENSE_CONFIG` env var
/// 2. `./rfsense.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Name of the sensor profile in `sensors` that drives the engine
    #[serde(default = "default_active_sensor")]
    pub active_sensor: String,

    /// Reader characteristics
    #[serde(default)]
    pub reader: ReaderConfig,

    /// Event buffer and history sizing
    #[serde(default)]
    pub buffer: BufferConfig,

    /// Metric computation settings
    #[serde(default)]
    pub engine: ComputeConfig,

    /// Session export settings
    #[serde(default)]
    pub export: ExportConfig,

    /// Sensor profiles keyed by name
    #[serde(default = "default_sensors")]
    pub sensors: BTreeMap<String, SensorProfile>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            active_sensor: default_active_sensor(),
            reader: ReaderConfig::default(),
            buffer: BufferConfig::default(),
            engine: ComputeConfig::default(),
            export: ExportConfig::default(),
            sensors: default_sensors(),
        }
    }
}

impl EngineConfig {
    /// Load configuration using the standard search order:
    /// 1. `$RFSENSE_CONFIG` environment variable
    /// 2. `./rfsense.toml` in the current working directory
    /// 3. Built-in defaults
    pub fn load() -> Self {
        // 1. Check env var
        if let Ok(path) = std::env::var("RFSENSE_CONFIG") {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), sensor = %config.active_sensor, "Loaded engine config from RFSENSE_CONFIG");
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from RFSENSE_CONFIG, falling back");
                    }
                }
            } else {
                warn!(path = %path, "RFSENSE_CONFIG points to non-existent file, falling back");
            }
        }

        // 2. Check ./rfsense.toml
        let local = PathBuf::from("rfsense.toml");
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!(sensor = %config.active_sensor, "Loaded engine config from ./rfsense.toml");
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./rfsense.toml, using defaults");
                }
            }
        }

        // 3. Defaults
        info!("No rfsense.toml found, using built-in defaults");
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Parse(_, inner) => ConfigError::Parse(path.to_path_buf(), inner),
            other => other,
        })
    }

    /// Parse and validate a TOML document.
    ///
    /// Unknown keys only produce warnings.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }

        let config: Self = toml::from_str(contents)
            .map_err(|e| ConfigError::Parse(PathBuf::from("<inline>"), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Save config to a file.
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = self.to_toml()?;
        std::fs::write(path, contents).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        info!(path = %path.display(), "Engine config saved");
        Ok(())
    }

    /// The profile named by `active_sensor`.
    pub fn active_profile(&self) -> Result<&SensorProfile, ConfigError> {
        self.sensors
            .get(&self.active_sensor)
            .ok_or_else(|| ConfigError::UnknownSensor(self.active_sensor.clone()))
    }

    /// Event count of one metric window for the active profile.
    ///
    /// `floor(window_seconds × read_rate)`.
    pub fn window_size(&self) -> Result<usize, ConfigError> {
        Ok(self.active_profile()?.window_size(self.reader.read_rate))
    }

    /// Validate internal consistency.
    ///
    /// Rules:
    /// - Rates, sizes, and windows must be positive and finite
    /// - The metric window must hold at least `MIN_WINDOW_EVENTS` and fit inside the event buffer
    /// - The active profile must exist and designate two distinct tags
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        if !self.reader.read_rate.is_finite() || self.reader.read_rate <= 0.0 {
            errors.push(format!(
                "reader.read_rate must be a positive number, got {}",
                self.reader.read_rate
            ));
        }
        if self.buffer.buffer_size == 0 {
            errors.push("buffer.buffer_size must be > 0".to_string());
        }
        if self.engine.tick_interval_ms == 0 {
            errors.push("engine.tick_interval_ms must be > 0".to_string());
        }

        for (name, profile) in &self.sensors {
            if !profile.window_seconds.is_finite() || profile.window_seconds <= 0.0 {
                errors.push(format!(
                    "sensors.{name}.window_seconds must be > 0, got {}",
                    profile.window_seconds
                ));
            }
        }

        match self.active_profile() {
            Ok(profile) => {
                if let Err(e) = profile.tag_pair() {
                    errors.push(format!("sensors.{}: {}", self.active_sensor, e));
                }
                let window = profile.window_size(self.reader.read_rate);
                if window < defaults::MIN_WINDOW_EVENTS {
                    errors.push(format!(
                        "sensors.{}: window of {} events is below the {} events an evaluation needs",
                        self.active_sensor,
                        window,
                        defaults::MIN_WINDOW_EVENTS
                    ));
                }
                if window > self.buffer.buffer_size {
                    errors.push(format!(
                        "sensors.{}: window of {} events exceeds buffer.buffer_size ({})",
                        self.active_sensor, window, self.buffer.buffer_size
                    ));
                }
            }
            Err(e) => errors.push(e.to_string()),
        }

        let (range_errors, range_warnings) = super::validation::validate_physical_ranges(self);
        errors.extend(range_errors);
        for w in &range_warnings {
            warn!("{}", w);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config I/O error ({}): {}", .0.display(), .1)]
    Io(PathBuf, std::io::Error),

    #[error("Config parse error ({}): {}", .0.display(), .1)]
    Parse(PathBuf, toml::de::Error),

    #[error("Config serialization error: {0}")]
    Serialize(toml::ser::Error),

    #[error("Config validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("Unknown sensor profile '{0}'")]
    UnknownSensor(String),
}

// ============================================================================
// Reader
// ============================================================================

/// Unit the reader reports phase angles in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PhaseUnit {
    #[default]
    Degrees,
    Radians,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReaderConfig {
    /// Nominal reads per second, used to size metric windows
    #[serde(default = "default_read_rate")]
    pub read_rate: f64,

    /// Unit of the phase column in reader lines
    #[serde(default)]
    pub phase_unit: PhaseUnit,

    /// Reader host, informational
    #[serde(default)]
    pub host: String,

    /// Reader port, informational
    #[serde(default = "default_reader_port")]
    pub port: u16,
}

fn default_read_rate() -> f64 { defaults::DEFAULT_READ_RATE }
fn default_reader_port() -> u16 { 5084 }

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            read_rate: default_read_rate(),
            phase_unit: PhaseUnit::default(),
            host: String::new(),
            port: default_reader_port(),
        }
    }
}

// ============================================================================
// Buffer
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferConfig {
    /// Maximum buffered tag reads; oldest are evicted first
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Maximum recorded metric results per series (0 = unbounded)
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
}

fn default_buffer_size() -> usize { defaults::DEFAULT_BUFFER_SIZE }
fn default_history_capacity() -> usize { defaults::DEFAULT_HISTORY_CAPACITY }

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
            history_capacity: default_history_capacity(),
        }
    }
}

// ============================================================================
// Compute
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputeConfig {
    /// Sequence alignment strategy
    #[serde(default)]
    pub alignment: AlignmentStrategy,

    /// Quantity the headline metric is computed over
    #[serde(default)]
    pub metric: MetricKind,

    /// Interval between metric evaluations (ms)
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,

    /// Also evaluate and record the RSSI differential every tick
    #[serde(default)]
    pub track_rssi: bool,
}

fn default_tick_interval() -> u64 { defaults::DEFAULT_TICK_INTERVAL_MS }

impl Default for ComputeConfig {
    fn default() -> Self {
        Self {
            alignment: AlignmentStrategy::default(),
            metric: MetricKind::default(),
            tick_interval_ms: default_tick_interval(),
            track_rssi: false,
        }
    }
}

// ============================================================================
// Export
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Write session files at shutdown
    #[serde(default = "default_store_data")]
    pub store_data: bool,

    /// Root directory for session files
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_store_data() -> bool { true }
fn default_data_dir() -> PathBuf { PathBuf::from(defaults::DEFAULT_DATA_DIR) }

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            store_data: default_store_data(),
            data_dir: default_data_dir(),
        }
    }
}

// ============================================================================
// Sensor Profiles
// ============================================================================

/// One tag-pair sensor: which EPCs to track and how long a window is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorProfile {
    /// Tag EPCs belonging to this sensor, in designation order
    #[serde(default)]
    pub epcs: Vec<String>,

    /// Explicit reference tag (defaults to the first EPC)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_epc: Option<String>,

    /// Explicit sensing tag (defaults to the next distinct EPC)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensing_epc: Option<String>,

    /// Window length in seconds
    #[serde(default = "default_window_seconds")]
    pub window_seconds: f64,

    /// Display range hint for chart collaborators
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y_range: Option<f64>,
}

fn default_window_seconds() -> f64 { defaults::DEFAULT_WINDOW_SECONDS }

impl SensorProfile {
    pub fn new(epcs: Vec<String>, window_seconds: f64) -> Self {
        Self {
            epcs,
            reference_epc: None,
            sensing_epc: None,
            window_seconds,
            y_range: None,
        }
    }

    /// Window size in events for the given read rate.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn window_size(&self, read_rate: f64) -> usize {
        (self.window_seconds * read_rate).floor().max(0.0) as usize
    }

    /// Resolve the reference/sensing designation for this profile.
    pub fn tag_pair(&self) -> Result<TagPair, crate::engine::EngineError> {
        TagPair::designate(
            &self.epcs,
            self.reference_epc.as_deref(),
            self.sensing_epc.as_deref(),
        )
    }
}

fn default_active_sensor() -> String {
    defaults::DEFAULT_SENSOR.to_string()
}

fn default_sensors() -> BTreeMap<String, SensorProfile> {
    let mut sensors = BTreeMap::new();
    sensors.insert(
        defaults::DEFAULT_SENSOR.to_string(),
        SensorProfile::new(
            vec![
                defaults::DEFAULT_REFERENCE_EPC.to_string(),
                defaults::DEFAULT_SENSING_EPC.to_string(),
            ],
            defaults::DEFAULT_WINDOW_SECONDS,
        ),
    );
    sensors
}
