//! CLI Entry Point for vna-headless
//!
//! Provides command-line access to the acquisition library:
//! - Discover analyzers and print their identification
//! - Run or load a calibration
//! - Take a single sweep, stream sweeps (optionally recording them), or
//!   replay a recording
//!
//! # Usage
//!
//! ```bash
//! vna-headless --simulate single --points 51
//! vna-headless stream --count 100 --record sweeps.csv
//! vna-headless replay sweeps.csv --loop
//! ```
//!
//! Streams stop on Ctrl-C; the producer thread is joined before exit.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::sync::oneshot;
use tracing::{info, warn};

use vna_headless::acquisition::{StopHandle, StreamSource, SweepStream};
use vna_headless::calibration::{AutoConfirm, CalibrationOutcome, ConsolePrompt};
use vna_headless::config::Settings;
use vna_headless::logging;
use vna_headless::measurement::SweepResult;
use vna_headless::recording::RecordingWriter;
use vna_headless::session::{LiveSession, PlaybackSession, Session};

#[derive(Parser)]
#[command(name = "vna-headless")]
#[command(about = "Headless NanoVNA sweeps, calibration and streaming", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use the simulated analyzer instead of hardware
    #[arg(long, global = true)]
    simulate: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List serial ports that look like a NanoVNA
    Ports,

    /// Connect and print firmware and features
    Info,

    /// Print the effective configuration as TOML
    Config,

    /// Run the calibration guide, or load a saved calibration
    Calibrate {
        /// Where to save the result (default: timestamped file)
        #[arg(long)]
        save: Option<PathBuf>,

        /// Load this calibration instead of measuring
        #[arg(long, conflicts_with = "save")]
        load: Option<PathBuf>,

        /// Do not wait for the operator between standards
        #[arg(long)]
        auto_confirm: bool,
    },

    /// Take one sweep and print it
    Single {
        #[command(flatten)]
        sweep: SweepArgs,

        /// Calibration file to apply
        #[arg(long)]
        calibration: Option<PathBuf>,
    },

    /// Sweep continuously until the count is reached or Ctrl-C
    Stream {
        #[command(flatten)]
        sweep: SweepArgs,

        /// Stop after this many sweeps
        #[arg(long)]
        count: Option<usize>,

        /// Record sweeps to this CSV file
        #[arg(long)]
        record: Option<PathBuf>,

        /// Calibration file to apply
        #[arg(long)]
        calibration: Option<PathBuf>,
    },

    /// Replay a recording
    Replay {
        /// Recording CSV file
        path: PathBuf,

        /// Start over at the end of the file
        #[arg(long = "loop")]
        looping: bool,

        /// Stop after this many sweeps
        #[arg(long)]
        count: Option<usize>,
    },
}

/// Sweep overrides on top of the configured `[sweep]` section.
#[derive(Args, Debug, Clone, Default)]
struct SweepArgs {
    /// Start frequency in Hz
    #[arg(long)]
    start: Option<u64>,

    /// Stop frequency in Hz
    #[arg(long)]
    stop: Option<u64>,

    /// Number of segments
    #[arg(long)]
    segments: Option<usize>,

    /// Points per segment
    #[arg(long)]
    points: Option<usize>,
}

impl SweepArgs {
    fn apply(&self, settings: &mut Settings) -> Result<()> {
        if let Some(start) = self.start {
            settings.sweep.start_hz = start;
        }
        if let Some(stop) = self.stop {
            settings.sweep.stop_hz = stop;
        }
        if let Some(segments) = self.segments {
            settings.sweep.segments = segments;
        }
        if let Some(points) = self.points {
            settings.sweep.points = points;
        }
        settings.validate().context("Invalid sweep arguments")?;
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings =
        Settings::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if cli.simulate {
        settings.device.simulate = true;
    }
    if let Some(level) = cli.log_level {
        settings.application.log_level = level;
    }
    settings.validate().context("Invalid configuration")?;
    logging::init_from_settings(&settings).map_err(anyhow::Error::msg)?;

    match cli.command {
        Commands::Ports => list_ports(),
        Commands::Info => blocking(move || show_info(&settings)).await,
        Commands::Config => {
            print!("{}", toml::to_string_pretty(&settings)?);
            Ok(())
        }
        Commands::Calibrate {
            save,
            load,
            auto_confirm,
        } => blocking(move || calibrate(&settings, save, load, auto_confirm)).await,
        Commands::Single { sweep, calibration } => {
            sweep.apply(&mut settings)?;
            blocking(move || single(&settings, calibration)).await
        }
        Commands::Stream {
            sweep,
            count,
            record,
            calibration,
        } => {
            sweep.apply(&mut settings)?;
            let (stop_tx, stop_rx) = oneshot::channel();
            interruptible(
                move || stream(&settings, count, record, calibration, stop_tx),
                stop_rx,
            )
            .await
        }
        Commands::Replay {
            path,
            looping,
            count,
        } => {
            let (stop_tx, stop_rx) = oneshot::channel();
            interruptible(move || replay(path, looping, count, stop_tx), stop_rx).await
        }
    }
}

/// Run instrument work off the async runtime.
async fn blocking<F>(job: F) -> Result<()>
where
    F: FnOnce() -> Result<()> + Send + 'static,
{
    tokio::task::spawn_blocking(job).await?
}

/// Run a streaming job, stopping its stream on Ctrl-C.
async fn interruptible<F>(job: F, stop_rx: oneshot::Receiver<StopHandle>) -> Result<()>
where
    F: FnOnce() -> Result<()> + Send + 'static,
{
    let mut worker = tokio::task::spawn_blocking(job);
    tokio::select! {
        joined = &mut worker => return joined?,
        interrupted = wait_for_interrupt(stop_rx) => {
            if let Some(handle) = interrupted {
                info!("Interrupted, stopping stream");
                handle.stop();
            }
        }
    }
    worker.await?
}

async fn wait_for_interrupt(stop_rx: oneshot::Receiver<StopHandle>) -> Option<StopHandle> {
    let handle = stop_rx.await.ok()?;
    tokio::signal::ctrl_c().await.ok()?;
    Some(handle)
}

#[cfg(feature = "instrument_serial")]
fn list_ports() -> Result<()> {
    let interfaces = vna_driver::list_interfaces().context("Failed to enumerate serial ports")?;
    if interfaces.is_empty() {
        println!("No NanoVNA found");
    }
    for (index, iface) in interfaces.iter().enumerate() {
        println!("[{}] {} ({})", index, iface.port_name, iface.description);
    }
    Ok(())
}

#[cfg(not(feature = "instrument_serial"))]
fn list_ports() -> Result<()> {
    println!("Built without serial instrument support");
    Ok(())
}

fn show_info(settings: &Settings) -> Result<()> {
    let mut session = LiveSession::from_settings(settings).context("Failed to open analyzer")?;
    println!("Device:   {}", session.device_name());
    for line in session.firmware().lines() {
        println!("Firmware: {}", line);
    }
    println!("Features: {}", session.features().join(", "));
    session.shutdown()?;
    Ok(())
}

fn calibrate(
    settings: &Settings,
    save: Option<PathBuf>,
    load: Option<PathBuf>,
    auto_confirm: bool,
) -> Result<()> {
    let session = LiveSession::from_settings(settings).context("Failed to open analyzer")?;
    let mut session = if auto_confirm {
        session.with_prompt(AutoConfirm::new())
    } else {
        session.with_prompt(ConsolePrompt)
    };

    match session.calibrate(save.as_deref(), load.as_deref())? {
        CalibrationOutcome::Loaded { path } => {
            println!("Loaded calibration from {}", path.display())
        }
        CalibrationOutcome::Completed { steps, saved_to } => println!(
            "Calibration finished in {} steps, saved to {}",
            steps,
            saved_to.display()
        ),
    }
    session.shutdown()?;
    Ok(())
}

fn open_calibrated(settings: &Settings, calibration: Option<&Path>) -> Result<LiveSession> {
    let mut session = LiveSession::from_settings(settings).context("Failed to open analyzer")?;
    if let Some(path) = calibration {
        session
            .calibrate(None, Some(path))
            .with_context(|| format!("Failed to apply calibration {}", path.display()))?;
    }
    Ok(session)
}

fn single(settings: &Settings, calibration: Option<PathBuf>) -> Result<()> {
    let mut session = open_calibrated(settings, calibration.as_deref())?;
    let sweep = session.run_single()?;

    println!("{:>14} {:>10} {:>10}", "freq", "|S11|", "|S21|");
    for ((freq, s11), s21) in sweep
        .freq
        .iter()
        .zip(sweep.s11_magnitude())
        .zip(sweep.s21_magnitude())
    {
        println!("{:>14} {:>10.5} {:>10.5}", freq, s11, s21);
    }
    let skipped = session.orchestrator_mut().take_faults();
    if !skipped.is_empty() {
        eprintln!("{} points skipped as malformed", skipped.len());
    }
    session.shutdown()?;
    Ok(())
}

fn stream(
    settings: &Settings,
    count: Option<usize>,
    record: Option<PathBuf>,
    calibration: Option<PathBuf>,
    stop_tx: oneshot::Sender<StopHandle>,
) -> Result<()> {
    let mut session = open_calibrated(settings, calibration.as_deref())?;
    let mut writer = record.map(RecordingWriter::create).transpose()?;

    let stream = session.open_stream(StreamSource::Live)?;
    let seen = drain(stream, count, writer.as_mut(), stop_tx)?;
    if let Some(writer) = writer.as_mut() {
        writer.flush()?;
        info!(sweeps = writer.sweeps_written(), "Recording complete");
    }

    let faults = session.orchestrator_mut().take_faults();
    for fault in &faults {
        warn!(pass = fault.pass, error = %fault.error, "Pass failed");
    }
    println!("{} sweeps, {} failed passes", seen, faults.len());
    session.shutdown()?;
    Ok(())
}

fn replay(
    path: PathBuf,
    looping: bool,
    count: Option<usize>,
    stop_tx: oneshot::Sender<StopHandle>,
) -> Result<()> {
    let mut session = PlaybackSession::new(&path, looping)
        .with_context(|| format!("Failed to open recording {}", path.display()))?;
    let seen = drain(session.stream()?, count, None, stop_tx)?;
    println!("{} sweeps replayed", seen);
    session.shutdown()?;
    Ok(())
}

/// Print (and optionally record) sweeps until the stream ends or `count` is reached.
fn drain(
    mut stream: SweepStream<'_>,
    count: Option<usize>,
    mut writer: Option<&mut RecordingWriter<std::fs::File>>,
    stop_tx: oneshot::Sender<StopHandle>,
) -> Result<usize> {
    // The receiver is gone only if the runtime is shutting down
    let _ = stop_tx.send(stream.stop_handle());

    let limit = count.unwrap_or(usize::MAX);
    let mut seen = 0;
    for sweep in stream.by_ref().take(limit) {
        seen += 1;
        println!("{:>6}  {}", seen, summarize(&sweep));
        if let Some(writer) = writer.as_deref_mut() {
            writer.write_sweep(&sweep)?;
        }
    }
    stream.close()?;
    Ok(seen)
}

/// One-line `freq |S11| |S21|` summary at the S11 minimum.
fn summarize(sweep: &SweepResult) -> String {
    let s11 = sweep.s11_magnitude();
    let s21 = sweep.s21_magnitude();
    let best = s11
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i);
    match best {
        Some(i) => format!(
            "{} points, min |S11| {:.4} at {} Hz, |S21| {:.4}",
            sweep.len(),
            s11[i],
            sweep.freq[i],
            s21.get(i).copied().unwrap_or(f64::NAN)
        ),
        None => "empty sweep".to_string(),
    }
}
