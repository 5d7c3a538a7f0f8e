//! Vibralyzer - edge vibration analytics
//!
//! Turns raw accelerometer batches into per-sensor early-fault states and
//! runs asynchronous L2 diagnosis on sustained degradation.
//!
//! # Usage
//!
//! ```bash
//! # Built-in bearing-fault simulation
//! cargo run --release
//!
//! # JSON raw batches from stdin
//! fault-generator --schedule low:5,high:5 | ./vibralyzer --stdin
//!
//! # Write events to a file instead of stdout
//! ./vibralyzer --stdin --output events.jsonl
//! ```
//!
//! # Environment Variables
//!
//! - `VIBRALYZER_CONFIG`: Path to the TOML config (default: ./vibralyzer.toml)
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufWriter;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use vibralyzer::baseline::AdaptiveBaseline;
use vibralyzer::config::{defaults, AnalyticsConfig};
use vibralyzer::diagnostic::{DiagnosticEngine, DiagnosticWorker, WindowDiagnoser};
use vibralyzer::pipeline::{
    run_heartbeat, PipelineCoordinator, ProcessingLoop, StdinSource, SyntheticSource,
};
use vibralyzer::publish::{ChannelPublisher, JsonLineSink, Publisher};
use vibralyzer::simulation::FaultSchedule;
use vibralyzer::types::SensorKey;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "vibralyzer")]
#[command(about = "Edge vibration analytics: early-fault detection with asynchronous L2 diagnosis")]
#[command(version)]
struct CliArgs {
    /// Config file (fatal if unreadable). Without it: $VIBRALYZER_CONFIG,
    /// then ./vibralyzer.toml, then built-in defaults
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Read raw batches from stdin (JSON lines) instead of the simulation.
    /// Use with the generator: fault-generator | ./vibralyzer --stdin
    #[arg(long)]
    stdin: bool,

    /// Severity schedule for the built-in simulation
    #[arg(long, default_value = defaults::SIMULATION_SCHEDULE)]
    schedule: FaultSchedule,

    /// Sensor key for the built-in simulation, as ASSET:POINT
    #[arg(long, value_name = "ASSET:POINT")]
    sim_key: Option<String>,

    /// Random seed for the simulation
    #[arg(long)]
    seed: Option<u64>,

    /// Delay between simulated batches in milliseconds (0 = as fast as possible)
    #[arg(long, default_value = "0")]
    delay_ms: u64,

    /// Write output events to this file instead of stdout
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,

    /// Override `ingest.workers`
    #[arg(long, env = "VIBRALYZER_INGEST_WORKERS")]
    ingest_workers: Option<usize>,

    /// Print the effective config as TOML and exit
    #[arg(long)]
    dump_config: bool,
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_tracing(args.log_json);

    let config = load_config(&args)?;
    if args.dump_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("  Vibralyzer - edge vibration analytics");
    info!(
        "  service: {} | window: {} @ {:.0} Hz | L2: {}",
        config.service.name,
        config.window.size,
        config.window.sampling_rate_hz,
        if config.diagnostic.enabled { "enabled" } else { "disabled" }
    );
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    // Graceful shutdown via Ctrl+C
    let ingest_cancel = CancellationToken::new();
    let shutdown_token = ingest_cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("🛑 Received Ctrl+C, initiating shutdown...");
        shutdown_token.cancel();
    });

    // ------------------------------------------------------------------
    // Output sink
    // ------------------------------------------------------------------
    let (publisher, outbound) = ChannelPublisher::new(config.publish.channel_capacity);
    let publisher = Arc::new(publisher);
    let sink_cancel = CancellationToken::new();
    let sink_task = match &args.output {
        Some(path) => {
            let file = tokio::fs::File::create(path)
                .await
                .with_context(|| format!("Failed to create output file {}", path.display()))?;
            info!(path = %path.display(), "📤 Output: file");
            tokio::spawn(JsonLineSink::new(outbound, BufWriter::new(file)).run(sink_cancel.clone()))
        }
        None => {
            info!("📤 Output: stdout");
            tokio::spawn(JsonLineSink::new(outbound, tokio::io::stdout()).run(sink_cancel.clone()))
        }
    };

    // ------------------------------------------------------------------
    // Pipeline + L2 worker
    // ------------------------------------------------------------------
    let sink: Arc<dyn Publisher> = publisher.clone();
    let mut coordinator = PipelineCoordinator::new(&config, Arc::clone(&sink))
        .context("Failed to build the processing pipeline")?;

    if let Some(path) = config.baseline.state_path() {
        coordinator = coordinator.with_baseline(AdaptiveBaseline::load_or_new(&config.baseline, path));
    }

    let worker_cancel = CancellationToken::new();
    let worker_task = if config.diagnostic.enabled {
        let diagnoser = WindowDiagnoser::new(DiagnosticEngine::new(&config.diagnostic), coordinator.extractor());
        let (worker, queue) = DiagnosticWorker::new(config.diagnostic.queue_capacity, Arc::new(diagnoser));
        coordinator = coordinator.with_diagnostics(queue);
        Some(tokio::spawn(worker.run(worker_cancel.clone())))
    } else {
        info!("L2 diagnosis disabled by config");
        None
    };
    let coordinator = Arc::new(coordinator);

    let heartbeat_cancel = CancellationToken::new();
    let heartbeat_task = tokio::spawn(run_heartbeat(
        Arc::clone(&coordinator),
        Arc::clone(&sink),
        config.service.name.clone(),
        Duration::from_secs(config.service.heartbeat_interval_secs.max(1)),
        Duration::from_secs(config.service.stale_after_secs),
        heartbeat_cancel.clone(),
    ));

    // ------------------------------------------------------------------
    // Ingest (runs until EOF or Ctrl+C)
    // ------------------------------------------------------------------
    let processing = ProcessingLoop::new(Arc::clone(&coordinator), &config.ingest, ingest_cancel.clone());
    let summary = if args.stdin {
        info!("📥 Input: stdin (JSON raw batches)");
        processing.run(&mut StdinSource::stdin()).await
    } else {
        let key = simulation_key(args.sim_key.as_deref())?;
        info!(
            %key,
            batches = args.schedule.total_batches(),
            delay_ms = args.delay_ms,
            "📥 Input: bearing-fault simulation"
        );
        let mut source = SyntheticSource::new(key, args.schedule.clone(), args.seed, args.delay_ms);
        processing.run(&mut source).await
    };
    info!(batches = summary.batches_read, "Ingest finished");

    // ------------------------------------------------------------------
    // Shutdown
    // ------------------------------------------------------------------
    shutdown_diagnostics(
        &coordinator,
        worker_task,
        worker_cancel,
        !ingest_cancel.is_cancelled(),
    )
    .await;

    if let Some(path) = config.baseline.state_path() {
        match coordinator.baseline().save_to_file(path) {
            Ok(()) => info!(path = %path.display(), keys = coordinator.baseline().key_count(), "Baseline saved"),
            Err(e) => error!(path = %path.display(), error = %e, "Failed to save baseline"),
        }
    }

    heartbeat_cancel.cancel();
    if let Err(e) = heartbeat_task.await {
        warn!(error = %e, "Heartbeat task ended abnormally");
    }

    sink_cancel.cancel();
    match tokio::time::timeout(Duration::from_secs(defaults::SINK_DRAIN_TIMEOUT_SECS), sink_task).await {
        Ok(Ok(Ok(written))) => info!(written, dropped = publisher.dropped(), "Output flushed"),
        Ok(Ok(Err(e))) => error!(error = %e, "Output sink failed"),
        Ok(Err(e)) => error!(error = %e, "Output sink task panicked"),
        Err(_) => warn!("Output sink did not flush in time"),
    }

    info!("✓ Vibralyzer shutdown complete");
    Ok(())
}

// ============================================================================
// Setup helpers
// ============================================================================

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    // stdout carries the event stream
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(args: &CliArgs) -> Result<AnalyticsConfig> {
    let mut config = match &args.config {
        Some(path) => AnalyticsConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => AnalyticsConfig::load(),
    };

    if let Some(workers) = args.ingest_workers {
        config.ingest.workers = workers;
        config.validate().context("Invalid --ingest-workers")?;
    }
    Ok(config)
}

fn simulation_key(raw: Option<&str>) -> Result<SensorKey> {
    let Some(raw) = raw else {
        return Ok(SensorKey::new(defaults::SIMULATION_ASSET, defaults::SIMULATION_POINT));
    };
    let (asset, point) = raw
        .split_once(':')
        .filter(|(a, p)| !a.is_empty() && !p.is_empty())
        .ok_or_else(|| anyhow::anyhow!("--sim-key must be ASSET:POINT, got '{raw}'"))?;
    Ok(SensorKey::new(asset, point))
}

/// Close the L2 queue and stop its worker.
///
/// After a clean end of input the queued jobs are given a chance to run;
/// after Ctrl+C only the in-flight job finishes.
async fn shutdown_diagnostics(
    coordinator: &PipelineCoordinator,
    worker_task: Option<tokio::task::JoinHandle<()>>,
    worker_cancel: CancellationToken,
    drain_queue: bool,
) {
    let Some(task) = worker_task else { return };
    let deadline = Duration::from_secs(defaults::DIAGNOSTIC_DRAIN_TIMEOUT_SECS);

    if let Some(queue) = coordinator.diagnostics() {
        queue.close();
        if drain_queue {
            let drained = tokio::time::timeout(deadline, async {
                while !queue.is_empty() {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                }
            })
            .await;
            if drained.is_err() {
                warn!(pending = queue.len(), "L2 queue not drained in time");
            }
        }
    }

    worker_cancel.cancel();
    match tokio::time::timeout(deadline, task).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "L2 worker task panicked"),
        Err(_) => warn!("L2 worker did not stop in time"),
    }
    if let Some(queue) = coordinator.diagnostics() {
        let c = queue.counts();
        info!(
            enqueued = c.enqueued,
            dropped = c.dropped,
            completed = c.completed,
            failed = c.failed,
            "L2 diagnostics stopped"
        );
    }
}
