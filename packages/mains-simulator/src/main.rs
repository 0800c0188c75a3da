//! main.rs — Mains waveform simulator entry point
//!
//! Runs two concurrent loops:
//!   1. Tick loop: advances the session at tick_rate_hz, fires scripted commands,
//!      optionally streams JSON-lines telemetry to stdout
//!   2. Command loop: reads `{ "cmd": ..., "args": ... }` lines from stdin
//!
//! Both share one `RwLock`, so a command is always applied between two ticks.
//! Logs go to stderr; stdout carries telemetry only.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::RwLock;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use mains_simulator::{
    apply, parse_command, Command, FileConfig, Script, Session, TelemetryFrame, TelemetryWriter,
    TickOutcome,
};

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "mains-sim", about = "Split-phase mains waveform and fault simulator")]
struct Args {
    /// Config file path (built-in defaults if absent)
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Simulation speed multiplier (0.001 to 1.0)
    #[arg(long)]
    speed: Option<f64>,
    /// Seed for fault noise, for replayable runs
    #[arg(long)]
    seed: Option<u64>,
    /// Fault to inject at start, e.g. `--fault neutral-loss` (repeatable)
    #[arg(long = "fault")]
    faults: Vec<String>,
    /// Stop after this many simulated seconds
    #[arg(long)]
    duration: Option<f64>,
    /// Write telemetry frames to stdout as JSON lines
    #[arg(long)]
    telemetry: bool,
}

// ── Shared state ──────────────────────────────────────────────────────────────

struct DriverState {
    session: Session,
    script: Script,
    ticks: u64,
}

type SharedState = Arc<RwLock<DriverState>>;

struct LoopConfig {
    tick: Duration,
    telemetry_every: u64,
    status_every: u64,
    telemetry: bool,
    duration: Option<f64>,
}

// ── Main ──────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mains_simulator=info,mains_sim=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let cfg = FileConfig::load_or_default(args.config.as_deref())
        .context("failed to load simulator config")?;
    let (params, mut options) = cfg.session_parts();
    if let Some(speed) = args.speed {
        options.speed = speed;
    }
    if args.seed.is_some() {
        options.seed = args.seed;
    }

    let mut session = Session::new(params, options);
    for name in &args.faults {
        session.trigger_fault_named(name);
    }

    info!(
        "🔌 Mains simulator starting: {:.0} Hz, {:.0} V peak, {}x speed, {} scripted command(s)",
        session.params().frequency_hz,
        session.params().amplitude_v,
        session.speed(),
        cfg.script.len()
    );
    info!("   {}", session.readout().standard.label());

    let started = Instant::now();
    let shared: SharedState = Arc::new(RwLock::new(DriverState {
        session,
        script: Script::new(cfg.script.clone()),
        ticks: 0,
    }));

    let shared_cmd = shared.clone();
    tokio::spawn(async move {
        command_loop(shared_cmd, started).await;
    });

    let tick = cfg.tick_interval();
    let loop_cfg = LoopConfig {
        tick,
        telemetry_every: cfg.simulation.telemetry_every_ticks,
        status_every: ((cfg.simulation.tick_rate_hz * 5.0).round() as u64).max(1),
        telemetry: args.telemetry,
        duration: args.duration,
    };
    sim_loop(shared, started, loop_cfg).await;
    Ok(())
}

// ── Tick loop ─────────────────────────────────────────────────────────────────

async fn sim_loop(state: SharedState, started: Instant, cfg: LoopConfig) {
    let mut ticker = interval(cfg.tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut writer = cfg.telemetry.then(|| TelemetryWriter::new(std::io::stdout()));

    info!("⚓ Tick loop running every {:.1}ms", cfg.tick.as_secs_f64() * 1000.0);

    loop {
        ticker.tick().await;
        let now = started.elapsed();

        let mut guard = state.write().await;
        let s = &mut *guard;
        s.ticks += 1;

        let sim_time = match s.session.tick(now) {
            TickOutcome::Paused => continue,
            TickOutcome::Advanced { sim_time, expired, .. } => {
                if !expired.is_empty() {
                    debug!("Pruned {} expired fault(s) at t={sim_time:.3}s", expired.len());
                }
                sim_time
            }
        };

        // scripted resets do not rewind the script
        for cmd in s.script.due(sim_time) {
            if let Err(e) = apply(&mut s.session, cmd, now) {
                warn!("Scripted command failed: {e}");
            }
        }

        if let Some(w) = writer.as_mut() {
            if s.ticks % cfg.telemetry_every == 0 {
                let frame = TelemetryFrame::capture(&mut s.session, s.ticks);
                w.write(&frame);
            }
        }

        if s.ticks % cfg.status_every == 0 {
            let stats = s.session.statistics_snapshot();
            info!(
                "〰 {} | faults={} | peaks +{:.1}/{:.1}V",
                s.session.readout(),
                s.session.faults().len(),
                stats.peak_high,
                stats.peak_low
            );
        }

        if let Some(limit) = cfg.duration {
            if s.session.time() >= limit {
                info!("🏁 Reached {limit:.2}s simulated after {} ticks", s.ticks);
                break;
            }
        }
    }
}

// ── Stdin control ─────────────────────────────────────────────────────────────

async fn command_loop(state: SharedState, started: Instant) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if !line.is_empty() {
                    handle_command(&state, line, started).await;
                }
            }
            Ok(None) => {
                debug!("stdin closed, no more control commands");
                break;
            }
            Err(e) => {
                warn!("Failed to read control input: {e}");
                break;
            }
        }
    }
}

async fn handle_command(state: &SharedState, raw: &str, started: Instant) {
    let cmd = match parse_command(raw) {
        Ok(cmd) => cmd,
        Err(e) => {
            warn!("Ignoring control input: {e}");
            return;
        }
    };
    let mut guard = state.write().await;
    let s = &mut *guard;
    if cmd == Command::Reset {
        s.script.rewind();
    }
    if let Err(e) = apply(&mut s.session, cmd, started.elapsed()) {
        warn!("Control command rejected: {e}");
    }
}
