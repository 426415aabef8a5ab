//! Reader report line parser
//!
//! Line format: `epc,timestamp,channel,phase,rssi[,read_count]`
//!
//! - `epc`: hex identity; any whitespace inside it is removed
//! - `timestamp`: last-seen time in microseconds
//! - `channel`: carrier frequency in MHz
//! - `phase`: phase angle, degrees or radians per [`PhaseUnit`]
//! - `rssi`: peak RSSI in dBm
//! - `read_count`: optional, ignored

use super::AcquisitionError;
use crate::config::defaults::FULL_TURN_DEG;
use crate::config::PhaseUnit;
use crate::types::TagEvent;

/// Parse one report line into an event with phase in `[0, 360)` degrees.
pub fn parse_reader_line(line: &str, unit: PhaseUnit) -> Result<TagEvent, AcquisitionError> {
    let mut fields = line.trim().split(',').map(str::trim);

    let epc: String = fields
        .next()
        .unwrap_or_default()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    if epc.is_empty() {
        return Err(AcquisitionError::MissingField("epc"));
    }

    let raw = next_field(&mut fields, "timestamp")?;
    let timestamp_micros: i64 = raw.parse().map_err(|_| invalid("timestamp", raw))?;
    let channel_mhz = parse_finite(&mut fields, "channel")?;
    let phase = parse_finite(&mut fields, "phase")?;
    let rssi_dbm = parse_finite(&mut fields, "rssi")?;

    let degrees = match unit {
        PhaseUnit::Degrees => phase,
        PhaseUnit::Radians => phase.to_degrees(),
    };

    Ok(TagEvent {
        tag_id: epc,
        timestamp_micros,
        channel_mhz,
        phase_degrees: degrees.rem_euclid(FULL_TURN_DEG),
        rssi_dbm,
    })
}

/// Render an event in the report line format (phase in degrees).
pub fn format_reader_line(event: &TagEvent) -> String {
    format!(
        "{},{},{},{:.4},{:.1}",
        event.tag_id, event.timestamp_micros, event.channel_mhz, event.phase_degrees, event.rssi_dbm
    )
}

fn next_field<'a>(
    fields: &mut impl Iterator<Item = &'a str>,
    name: &'static str,
) -> Result<&'a str, AcquisitionError> {
    match fields.next() {
        Some(f) if !f.is_empty() => Ok(f),
        _ => Err(AcquisitionError::MissingField(name)),
    }
}

fn parse_finite<'a>(
    fields: &mut impl Iterator<Item = &'a str>,
    name: &'static str,
) -> Result<f64, AcquisitionError> {
    let raw = next_field(fields, name)?;
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(invalid(name, raw)),
    }
}

fn invalid(field: &'static str, value: &str) -> AcquisitionError {
    AcquisitionError::InvalidNumber {
        field,
        value: value.to_string(),
    }
}
