//! Simulated RFID Reader
//!
//! Writes reader report lines (`epc,timestamp,channel,phase,rssi`) for a
//! reference and a sensing tag to stdout, with a known phase offset between
//! them.
//!
//! # Usage
//! ```bash
//! ./simulation --offset 45 --seconds 20 | ./rfsense --stdin
//! ./simulation --fast --reads 5000 > capture.csv
//! ```

use std::io::{self, BufWriter, Write};
use std::time::Duration;

use anyhow::Result;
use clap::Parser;

use rfsense::acquisition::{format_reader_line, SimulatedReader, SimulatorSettings};
use rfsense::config::defaults::{DEFAULT_READ_RATE, DEFAULT_REFERENCE_EPC, DEFAULT_SENSING_EPC};
use rfsense::engine::TagPair;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "rfsense-simulation")]
#[command(about = "Simulated two-tag RFID reader for rfsense testing")]
#[command(version = "1.0")]
struct Args {
    /// Phase offset of the sensing tag (degrees)
    #[arg(long, default_value = "30")]
    offset: f64,

    /// Reads per second across both tags
    #[arg(long, default_value_t = DEFAULT_READ_RATE)]
    rate: f64,

    /// Simulated duration in seconds (ignored when --reads is set)
    #[arg(long, default_value = "30")]
    seconds: f64,

    /// Exact number of reads to emit
    #[arg(long)]
    reads: Option<u64>,

    /// Phase noise standard deviation (degrees)
    #[arg(long, default_value = "2.0")]
    phase_noise: f64,

    /// RSSI noise standard deviation (dB)
    #[arg(long, default_value = "1.0")]
    rssi_noise: f64,

    /// Reference tag EPC
    #[arg(long, default_value = DEFAULT_REFERENCE_EPC)]
    reference: String,

    /// Sensing tag EPC
    #[arg(long, default_value = DEFAULT_SENSING_EPC)]
    sensing: String,

    /// Emit phase in radians, as the vendor listener does
    #[arg(long)]
    radians: bool,

    /// Write as fast as possible instead of at the read rate
    #[arg(long)]
    fast: bool,

    /// Random seed for reproducibility
    #[arg(long)]
    seed: Option<u64>,
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn main() -> Result<()> {
    let args = Args::parse();

    let mut settings = SimulatorSettings::new(
        TagPair {
            reference: args.reference.clone(),
            sensing: args.sensing.clone(),
        },
        args.offset,
    );
    settings.read_rate = args.rate;
    settings.phase_noise_std = args.phase_noise;
    settings.rssi_noise_std = args.rssi_noise;
    settings.seed = args.seed;
    settings.start_micros = chrono::Utc::now().timestamp_micros();

    let mut reader = SimulatedReader::new(settings)?;
    let total = args
        .reads
        .unwrap_or_else(|| (args.seconds.max(0.0) * args.rate).round() as u64);
    let interval = Duration::from_micros(u64::try_from(reader.interval_micros()).unwrap_or(0));

    eprintln!(
        "Simulating {} reads at {} reads/s, offset {}°",
        total, args.rate, args.offset
    );

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    for _ in 0..total {
        let mut event = reader.next_event();
        if args.radians {
            event.phase_degrees = event.phase_degrees.to_radians();
        }
        let line = format_reader_line(&event);
        if writeln!(out, "{line}").is_err() {
            // Downstream closed the pipe
            break;
        }
        if !args.fast {
            if out.flush().is_err() {
                break;
            }
            std::thread::sleep(interval);
        }
    }
    out.flush().ok();

    Ok(())
}
