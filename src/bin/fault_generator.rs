//! Bearing Fault Generator
//!
//! Prints synthetic raw acceleration batches as JSON lines for feeding
//! Vibralyzer without a sensor:
//!
//! ```bash
//! ./fault-generator --schedule healthy:120,low:5,medium:5,high:5 | ./vibralyzer --stdin
//! ```
//!
//! Each line is `{"topic": "vibration/raw/<ASSET>/<POINT>", "payload": {...}}`,
//! or the flat `{"asset", "point", "acceleration", ...}` form with `--flat`.

use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use serde_json::json;
use std::io::{self, Write};
use std::time::Duration;
use tracing::info;

use vibralyzer::config::defaults::{RAW_TOPIC_PREFIX, SIMULATION_ASSET, SIMULATION_POINT, SIMULATION_SCHEDULE};
use vibralyzer::simulation::{BearingFaultGenerator, FaultSchedule};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "fault-generator")]
#[command(about = "Synthetic bearing-fault acceleration batches for Vibralyzer testing")]
#[command(version)]
struct Args {
    /// Comma-separated <severity>:<batches> phases (healthy, low, medium, high)
    #[arg(short, long, default_value = SIMULATION_SCHEDULE)]
    schedule: FaultSchedule,

    #[arg(long, default_value = SIMULATION_ASSET)]
    asset: String,

    #[arg(long, default_value = SIMULATION_POINT)]
    point: String,

    /// Random seed for reproducibility
    #[arg(long)]
    seed: Option<u64>,

    /// Delay between batches in milliseconds
    #[arg(long, default_value = "0")]
    delay_ms: u64,

    /// Set `temperature_alarm` on every batch from this index on
    #[arg(long, value_name = "BATCH")]
    temperature_alarm_from: Option<u64>,

    /// Emit the flat line form instead of topic/payload
    #[arg(long)]
    flat: bool,

    /// Suppress progress logging on stderr
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    if !args.quiet {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .with_target(false)
            .with_writer(io::stderr)
            .init();
    }

    let mut generator = BearingFaultGenerator::new(args.seed);
    let topic = format!("{RAW_TOPIC_PREFIX}/{}/{}", args.asset, args.point);
    info!(
        %topic,
        batches = args.schedule.total_batches(),
        shaft_hz = generator.shaft_hz(),
        bpfo_hz = generator.bpfo_hz(),
        "Generating bearing-fault batches"
    );

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut previous = None;

    for (index, severity) in args.schedule.iter().enumerate() {
        if index > 0 && args.delay_ms > 0 {
            std::thread::sleep(Duration::from_millis(args.delay_ms));
        }
        if previous != Some(severity) {
            info!(batch = index, %severity, "Severity phase");
            previous = Some(severity);
        }

        let temperature_alarm = args.temperature_alarm_from.is_some_and(|from| index as u64 >= from);
        let acceleration = generator.next_batch(severity);
        let timestamp = Utc::now().to_rfc3339();

        let line = if args.flat {
            json!({
                "asset": args.asset,
                "point": args.point,
                "acceleration": acceleration,
                "temperature_alarm": temperature_alarm,
                "timestamp": timestamp,
            })
        } else {
            json!({
                "topic": topic,
                "payload": {
                    "acceleration": acceleration,
                    "temperature_alarm": temperature_alarm,
                    "timestamp": timestamp,
                },
            })
        };

        if let Err(e) = writeln!(out, "{line}") {
            // Downstream closed the pipe
            if e.kind() == io::ErrorKind::BrokenPipe {
                return Ok(());
            }
            return Err(e.into());
        }
    }

    out.flush()?;
    Ok(())
}
