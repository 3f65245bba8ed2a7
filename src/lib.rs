pub mod control;
pub mod engine;
pub mod gesture;
pub mod metrics;
pub mod observer;
pub mod settings;
pub mod simulator;
mod utils;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use control::{ControlConfig, ControlLoopController, LogActionExecutor, LoopEvent, StopOutcome};
use engine::EngineConfig;
use observer::StatusObserver;
use settings::Settings;
use simulator::{demo_script, FrameProducer, JitterGenerator, DEFAULT_FPS};

const DISPLAY_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Parser, Debug)]
#[command(
    name = "gesturegate",
    about = "Turns a stream of hand-pose labels into deliberate gesture triggers"
)]
struct Cli {
    /// Settings file (JSON); missing keys take defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the effective settings to PATH and exit
    #[arg(long, value_name = "PATH")]
    write_config: Option<PathBuf>,

    /// Drive the loop with a seeded random script instead of the demo
    #[arg(long)]
    random: bool,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Length of the random script
    #[arg(long, default_value_t = 30)]
    seconds: u64,

    /// Per-frame probability of a misclassified label in random mode
    #[arg(long, default_value_t = 0.05)]
    noise: f64,

    #[arg(long, default_value_t = DEFAULT_FPS)]
    fps: u32,

    /// Print events and the final summary as JSON lines
    #[arg(long)]
    json: bool,
}

pub fn run() -> Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let cli = Cli::parse();
    let settings = match &cli.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };

    if let Some(path) = &cli.write_config {
        settings.save(path)?;
        info!("Settings written to {}", path.display());
        return Ok(());
    }

    let engine = settings.engine_config()?;
    let control = settings.control_config()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    runtime.block_on(run_session(cli, engine, control))
}

async fn run_session(cli: Cli, engine: EngineConfig, control: ControlConfig) -> Result<()> {
    let script = if cli.random {
        JitterGenerator::new(cli.seed, cli.noise).random_script(Duration::from_secs(cli.seconds))
    } else {
        demo_script()
    };
    let mut producer = FrameProducer::new(cli.fps);
    if cli.random {
        producer = producer.with_jitter(JitterGenerator::new(cli.seed.wrapping_add(1), cli.noise));
    }

    // About one second of frames may queue before the producer waits.
    let (frames_tx, frames_rx) = mpsc::channel(cli.fps.max(1) as usize);
    let mut controller = ControlLoopController::new();
    let handle = controller.start(engine, control, frames_rx, Box::new(LogActionExecutor))?;
    let mut observer = StatusObserver::new(handle);

    let cancel_token = CancellationToken::new();
    let producer_token = cancel_token.clone();
    let producer_task = tokio::spawn(async move {
        // Dropping the sender afterwards closes the session.
        producer.play(&script, &frames_tx, &producer_token).await
    });

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut display = tokio::time::interval(DISPLAY_INTERVAL);
    let mut last_status = String::new();

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Interrupted; stopping");
                break;
            }
            _ = display.tick() => {
                for event in observer.poll() {
                    print_event(&event, cli.json)?;
                }
                let status = observer.status_text();
                if !cli.json && status != last_status {
                    println!("STATUS: {status}");
                    last_status = status;
                }
                if observer.summary().is_some() {
                    break;
                }
            }
        }
    }

    cancel_token.cancel();
    let frames_sent = producer_task.await.context("frame producer panicked")?;

    let summary = match controller.stop().await? {
        StopOutcome::Clean(summary) => Some(summary),
        StopOutcome::Forced => {
            log::warn!("Control loop was force-stopped");
            None
        }
        StopOutcome::NotRunning => None,
    };
    observer.poll();
    let summary = summary.or_else(|| observer.summary().cloned());

    if cli.json {
        if let Some(summary) = &summary {
            println!("{}", serde_json::to_string(summary)?);
        }
        return Ok(());
    }

    println!("--- {} frames sent ---", frames_sent);
    for entry in observer.activity().entries() {
        println!("{entry}");
    }
    if let Some(summary) = summary {
        println!(
            "session {}: {} frames, {} triggers, {} status updates dropped, final state {}",
            summary.session_id,
            summary.frames_processed,
            summary.triggers_emitted,
            summary.status_dropped,
            summary.final_state.as_str()
        );
    }
    if let Some(metrics) = observer.metrics() {
        println!(
            "{:.1} fps, {}us mean / {}us max per frame, cpu {:.1}%, mem {:.1} MB",
            metrics.fps,
            metrics.avg_latency_us,
            metrics.max_latency_us,
            metrics.system.cpu_percent,
            metrics.system.memory_mb
        );
    }
    Ok(())
}

fn print_event(event: &LoopEvent, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(event)?);
        return Ok(());
    }
    match event {
        LoopEvent::Triggered(record) => println!(
            "[{}]  {}  →  {}",
            record.triggered_at.format("%H:%M:%S"),
            record.label.display_name(),
            record.action.description()
        ),
        LoopEvent::ActionCompleted(report) if !report.success && report.action.is_mapped() => {
            println!("  ! {} failed: {}", report.action, report.message);
        }
        LoopEvent::ActionCompleted(_) | LoopEvent::Stopped(_) => {}
    }
    Ok(())
}
