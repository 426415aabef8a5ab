//! rfsense - Streaming RFID phase-differencing engine
//!
//! Collects tag reads for a fixed time, evaluates the reference/sensing
//! differential on every tick and exports the session as JSON.
//!
//! # Usage
//!
//! ```bash
//! # Built-in simulated reader with a 30° offset between tags
//! cargo run --release -- --duration 10s
//!
//! # Reader report lines piped from the listener
//! ./simulation --offset 45 | ./rfsense --stdin --duration 5m --name trial1
//!
//! # Replay a capture at 10x reader time
//! ./rfsense --replay capture.csv --speed 10
//! ```
//!
//! # Environment Variables
//!
//! - `RFSENSE_CONFIG`: Path to the TOML config (default: ./rfsense.toml)
//! - `RFSENSE_SENSOR`: Sensor profile to use
//! - `RUST_LOG`: Logging level (default: info)

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use rfsense::acquisition::{SimulatedReader, SimulatorSettings};
use rfsense::config::{self, EngineConfig};
use rfsense::engine::{AlignmentStrategy, DifferentialEngine};
use rfsense::export::SessionExporter;
use rfsense::pipeline::{
    parse_duration, EventSource, MetricUpdate, ReplaySource, Session, SessionReport,
    SessionSettings, SimulatedSource, StdinSource,
};
use rfsense::types::MetricKind;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "rfsense")]
#[command(about = "Streaming RFID phase-differencing engine for passive tag sensors")]
#[command(version)]
struct CliArgs {
    /// Read reader report lines (epc,timestamp,channel,phase,rssi) from stdin
    #[arg(long)]
    stdin: bool,

    /// Replay a capture file of reader report lines
    #[arg(long, value_name = "FILE", conflicts_with = "stdin")]
    replay: Option<PathBuf>,

    /// Replay speed divisor on reader time (1 = real time, 0 = no delay)
    #[arg(long, default_value = "1")]
    speed: f64,

    /// Collection time: 10s, 5m, 2h, 1d or a number of seconds
    #[arg(short, long, default_value = "30")]
    duration: String,

    /// Experiment name used as export file prefix (default: sensor name)
    #[arg(short, long)]
    name: Option<String>,

    /// Sensor profile to use (overrides active_sensor)
    #[arg(long, env = "RFSENSE_SENSOR")]
    sensor: Option<String>,

    /// Alignment strategy: interpolation, dtw or truncate
    #[arg(long)]
    alignment: Option<AlignmentStrategy>,

    /// Primary metric: phase or rssi
    #[arg(long)]
    metric: Option<MetricKind>,

    /// Path to config TOML (default: $RFSENSE_CONFIG, then ./rfsense.toml)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Simulated phase offset between reference and sensing tag (degrees)
    #[arg(long, default_value = "30")]
    offset: f64,

    /// Simulator random seed for reproducible runs
    #[arg(long)]
    seed: Option<u64>,

    /// Print every evaluation to stdout as `tick,value` lines
    #[arg(long)]
    print: bool,

    /// Skip writing export files
    #[arg(long)]
    no_export: bool,
}

// ============================================================================
// Configuration
// ============================================================================

fn load_config(args: &CliArgs) -> Result<EngineConfig> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => EngineConfig::load(),
    };

    if let Some(sensor) = &args.sensor {
        config.active_sensor = sensor.clone();
    }
    if let Some(alignment) = args.alignment {
        config.engine.alignment = alignment;
    }
    if let Some(metric) = args.metric {
        config.engine.metric = metric;
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

// ============================================================================
// Session Runner
// ============================================================================

/// Print published evaluations until the session drops its sender.
fn spawn_printer(mut rx: watch::Receiver<MetricUpdate>, kind: MetricKind) {
    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let update = *rx.borrow_and_update();
            if let Some(result) = update.get(kind) {
                println!("{},{:.4}", update.tick, result.as_sentinel());
            }
        }
    });
}

async fn run_session<S: EventSource>(
    source: S,
    engine: Arc<DifferentialEngine>,
    settings: SessionSettings,
    print: bool,
    cancel_token: CancellationToken,
) -> Result<SessionReport> {
    let metric = settings.metric;
    let (session, rx) = Session::new(engine, settings, cancel_token);
    if print {
        spawn_printer(rx, metric);
    }
    session.run(source).await
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = CliArgs::parse();

    let engine_config = load_config(&args)?;
    config::init(engine_config);
    let cfg = config::get();

    let collection = parse_duration(&args.duration);
    let sensor_name = args.name.clone().unwrap_or_else(|| cfg.active_sensor.clone());
    let experiment = format!("{}_{}", sensor_name, collection.label);

    let engine = Arc::new(DifferentialEngine::from_config(cfg)?);
    let settings = SessionSettings::from_config(cfg, Some(collection.duration))?;

    info!(
        experiment = %experiment,
        sensor = %cfg.active_sensor,
        metric = %settings.metric,
        alignment = %cfg.engine.alignment,
        window = engine.window_size(),
        "rfsense starting"
    );
    match engine.tag_pair() {
        Some(pair) => info!(reference = %pair.reference, sensing = %pair.sensing, "Tag pair"),
        None => warn!("No usable tag pair, every evaluation will report no reading"),
    }

    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, stopping collection...");
        shutdown_token.cancel();
    });

    let unit = cfg.reader.phase_unit;
    let report = if let Some(path) = &args.replay {
        info!(path = %path.display(), speed = args.speed, "Input: capture replay");
        let source = ReplaySource::open(path, unit, args.speed).await?;
        run_session(source, Arc::clone(&engine), settings, args.print, cancel_token).await?
    } else if args.stdin {
        info!("Input: stdin (reader report lines)");
        let source = StdinSource::stdin(unit);
        run_session(source, Arc::clone(&engine), settings, args.print, cancel_token).await?
    } else {
        let pair = engine
            .tag_pair()
            .cloned()
            .context("Simulator needs a reference and a sensing tag")?;
        let mut sim = SimulatorSettings::new(pair, args.offset);
        sim.read_rate = cfg.reader.read_rate;
        sim.seed = args.seed;
        sim.start_micros = chrono::Utc::now().timestamp_micros();
        info!(offset = args.offset, read_rate = sim.read_rate, "Input: simulated reader");
        let source = SimulatedSource::new(SimulatedReader::new(sim)?);
        run_session(source, Arc::clone(&engine), settings, args.print, cancel_token).await?
    };

    info!("{}", report.stats);

    if args.no_export {
        info!("Export skipped");
    } else {
        let exporter = SessionExporter::from_config(&cfg.export);
        let written = report
            .export(&exporter, &experiment)
            .context("Session export failed")?;
        info!(files = written.written.len(), "Export complete");
    }

    info!("rfsense shutdown complete");
    Ok(())
}
