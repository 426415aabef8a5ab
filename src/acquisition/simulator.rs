//! Simulated two-tag reader
//!
//! Produces alternating reference/sensing reads that hop across a fixed
//! channel plan. Both tags see the same slowly rotating carrier phase; the
//! sensing tag adds a constant offset, so the expected differential is
//! `fold(offset)`.

use rand::prelude::*;
use rand_distr::{Distribution, Normal};

use super::AcquisitionError;
use crate::config::defaults::{
    DEFAULT_READ_RATE, FULL_TURN_DEG, SIMULATED_CHANNELS_MHZ, SIMULATED_DWELL_READS,
};
use crate::engine::TagPair;
use crate::types::TagEvent;

/// Phase rotation per read on every channel (degrees)
const PHASE_DRIFT_PER_READ: f64 = 0.5;
/// Reference tag RSSI (dBm)
const REFERENCE_RSSI: f64 = -55.0;
/// Sensing tag attenuation relative to the reference (dB)
const SENSING_ATTENUATION: f64 = 3.0;

#[derive(Debug, Clone)]
pub struct SimulatorSettings {
    pub pair: TagPair,
    /// Phase offset of the sensing tag (degrees)
    pub offset_degrees: f64,
    /// Reads per second across both tags
    pub read_rate: f64,
    pub phase_noise_std: f64,
    pub rssi_noise_std: f64,
    /// Reader clock of the first read (microseconds)
    pub start_micros: i64,
    pub seed: Option<u64>,
}

impl SimulatorSettings {
    pub fn new(pair: TagPair, offset_degrees: f64) -> Self {
        Self {
            pair,
            offset_degrees,
            read_rate: DEFAULT_READ_RATE,
            phase_noise_std: 2.0,
            rssi_noise_std: 1.0,
            start_micros: 0,
            seed: None,
        }
    }
}

pub struct SimulatedReader {
    settings: SimulatorSettings,
    rng: StdRng,
    phase_noise: Normal<f64>,
    rssi_noise: Normal<f64>,
    /// Initial carrier phase per channel
    base_phase: Vec<f64>,
    interval_micros: i64,
    reads: u64,
}

impl SimulatedReader {
    pub fn new(settings: SimulatorSettings) -> Result<Self, AcquisitionError> {
        let mut rng = match settings.seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        let phase_noise = noise("phase_noise_std", settings.phase_noise_std)?;
        let rssi_noise = noise("rssi_noise_std", settings.rssi_noise_std)?;
        if !settings.read_rate.is_finite() || settings.read_rate <= 0.0 {
            return Err(AcquisitionError::InvalidNumber {
                field: "read_rate",
                value: settings.read_rate.to_string(),
            });
        }

        let base_phase = SIMULATED_CHANNELS_MHZ
            .iter()
            .map(|_| rng.gen_range(0.0..FULL_TURN_DEG))
            .collect();

        #[allow(clippy::cast_possible_truncation)]
        let interval_micros = ((1_000_000.0 / settings.read_rate).round() as i64).max(1);

        Ok(Self {
            settings,
            rng,
            phase_noise,
            rssi_noise,
            base_phase,
            interval_micros,
            reads: 0,
        })
    }

    pub fn reads(&self) -> u64 {
        self.reads
    }

    /// Microseconds between consecutive reads.
    pub fn interval_micros(&self) -> i64 {
        self.interval_micros
    }

    /// Generate the next read.
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    pub fn next_event(&mut self) -> TagEvent {
        let n = self.reads;
        self.reads += 1;

        let hop = (n as usize / SIMULATED_DWELL_READS) % SIMULATED_CHANNELS_MHZ.len();
        let sensing = n % 2 == 1;
        let timestamp_micros = self.settings.start_micros + n as i64 * self.interval_micros;

        let carrier = self.base_phase[hop] + PHASE_DRIFT_PER_READ * n as f64;
        let (tag_id, phase, rssi) = if sensing {
            (
                &self.settings.pair.sensing,
                carrier + self.settings.offset_degrees,
                REFERENCE_RSSI - SENSING_ATTENUATION,
            )
        } else {
            (&self.settings.pair.reference, carrier, REFERENCE_RSSI)
        };

        let phase = phase + self.phase_noise.sample(&mut self.rng);
        let rssi = rssi + self.rssi_noise.sample(&mut self.rng);

        TagEvent {
            tag_id: tag_id.clone(),
            timestamp_micros,
            channel_mhz: SIMULATED_CHANNELS_MHZ[hop],
            phase_degrees: phase.rem_euclid(FULL_TURN_DEG),
            rssi_dbm: rssi,
        }
    }
}

impl Iterator for SimulatedReader {
    type Item = TagEvent;

    fn next(&mut self) -> Option<TagEvent> {
        Some(self.next_event())
    }
}

/// Zero-mean noise; the standard deviation must be finite and non-negative.
fn noise(field: &'static str, std: f64) -> Result<Normal<f64>, AcquisitionError> {
    let invalid = || AcquisitionError::InvalidNumber {
        field,
        value: std.to_string(),
    };
    if !(std.is_finite() && std >= 0.0) {
        return Err(invalid());
    }
    Normal::new(0.0, std).map_err(|_| invalid())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(offset: f64) -> SimulatorSettings {
        let mut s = SimulatorSettings::new(
            TagPair {
                reference: "REF".to_string(),
                sensing: "SEN".to_string(),
            },
            offset,
        );
        s.phase_noise_std = 0.0;
        s.rssi_noise_std = 0.0;
        s.seed = Some(7);
        s
    }

    #[test]
    fn test_alternates_tags_and_hops_channels() {
        let events: Vec<TagEvent> = SimulatedReader::new(settings(30.0))
            .unwrap()
            .take(SIMULATED_DWELL_READS * 2)
            .collect();

        assert_eq!(events[0].tag_id, "REF");
        assert_eq!(events[1].tag_id, "SEN");
        assert_eq!(events[0].channel_mhz, SIMULATED_CHANNELS_MHZ[0]);
        assert_eq!(events[SIMULATED_DWELL_READS].channel_mhz, SIMULATED_CHANNELS_MHZ[1]);
        assert_eq!(events[1].timestamp_micros - events[0].timestamp_micros, 10_000);
    }

    #[test]
    fn test_phases_are_wrapped_with_offset_between_tags() {
        let mut reader = SimulatedReader::new(settings(30.0)).unwrap();
        for _ in 0..1_000 {
            let e = reader.next_event();
            assert!((0.0..360.0).contains(&e.phase_degrees));
        }

        let mut reader = SimulatedReader::new(settings(30.0)).unwrap();
        let r = reader.next_event();
        let s = reader.next_event();
        let delta = (s.phase_degrees - r.phase_degrees).rem_euclid(360.0);
        assert!((delta - 30.0 - PHASE_DRIFT_PER_READ).abs() < 1e-9);
        assert_eq!(r.rssi_dbm - s.rssi_dbm, SENSING_ATTENUATION);
    }

    #[test]
    fn test_invalid_noise_rejected() {
        let mut s = settings(0.0);
        s.phase_noise_std = -1.0;
        assert!(matches!(
            SimulatedReader::new(s),
            Err(AcquisitionError::InvalidNumber { field: "phase_noise_std", .. })
        ));

        let mut s = settings(0.0);
        s.rssi_noise_std = f64::NAN;
        assert!(SimulatedReader::new(s).is_err());
    }

    #[test]
    fn test_zero_noise_accepted() {
        assert!(SimulatedReader::new(settings(0.0)).is_ok());
    }
}
