//! Onset Synchrony CLI
//!
//! Captures two onset streams in parallel and reports their timing and lag.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use onset_synchrony::{
    collector::{wall_clock_secs, CancellationToken, DualCapture, Metronome, OnsetPredicate},
    config::Config,
    core::ReportBuilder,
    observe::{create_shared_stats, FanoutSink, TracingSink},
    VERSION,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "onset-sync")]
#[command(version = VERSION)]
#[command(about = "Dual-source onset timing capture and synchrony analysis", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture two synthetic metronome sources and report their synchrony
    Simulate {
        /// Beat period of both sources, in milliseconds
        #[arg(long, default_value_t = 500)]
        period: u64,

        /// Phase delay of the second source, in milliseconds
        #[arg(long, default_value_t = 20)]
        offset: u64,

        /// Capture length in seconds
        #[arg(long, default_value_t = 10.0)]
        duration: f64,

        /// Interleave MIDI clock ticks with the onsets
        #[arg(long)]
        clock: bool,

        /// Only count onsets of this note
        #[arg(long)]
        note: Option<u8>,

        /// Aggregation window width in seconds
        #[arg(long)]
        window_size: Option<f64>,

        /// Cross-correlation bin width in seconds
        #[arg(long)]
        resolution: Option<f64>,

        /// Outlier cutoff for intervals in seconds
        #[arg(long)]
        threshold: Option<f64>,

        /// Log clock ticks as they arrive
        #[arg(long)]
        print_clock: bool,

        /// Write the JSON report to this file
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Show configuration
    Config,

    /// Write the default configuration file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate {
            period,
            offset,
            duration,
            clock,
            note,
            window_size,
            resolution,
            threshold,
            print_clock,
            output,
        } => {
            let mut config = Config::load().unwrap_or_else(|e| {
                tracing::warn!(error = %e, "could not load configuration; using defaults");
                Config::default()
            });
            if note.is_some() {
                config.note_filter = note;
            }
            if let Some(window_size) = window_size {
                config.window_size = window_size;
            }
            if let Some(resolution) = resolution {
                config.resolution = resolution;
            }
            if let Some(threshold) = threshold {
                config.difference_threshold = threshold;
            }
            config.print_clock |= print_clock;

            let timing = SimulationTiming {
                period: Duration::from_millis(period),
                offset: Duration::from_millis(offset),
                duration,
                clock,
            };
            cmd_simulate(config, timing, output)
        }
        Commands::Config => cmd_config(),
        Commands::InitConfig { force } => cmd_init_config(force),
    }
}

struct SimulationTiming {
    period: Duration,
    offset: Duration,
    duration: f64,
    clock: bool,
}

fn cmd_simulate(config: Config, timing: SimulationTiming, output: Option<PathBuf>) -> Result<()> {
    config.validate().context("invalid configuration")?;
    if !(timing.duration.is_finite() && timing.duration > 0.0) {
        bail!("--duration must be a positive number of seconds");
    }
    if timing.period.is_zero() {
        bail!("--period must be greater than zero");
    }

    println!("Onset Synchrony v{VERSION}");
    println!();

    let note = config.note_filter.unwrap_or(60);
    let source = Metronome::new(timing.period)
        .with_note(note, 100)
        .with_clock_ticks(timing.clock);
    let delayed = source.clone().with_offset(timing.offset);

    println!("  Period: {} ms", timing.period.as_millis());
    println!(
        "  Offset of source 2: {} ms",
        delayed.phase_offset().as_millis()
    );
    println!("  Duration: {:.1} s", timing.duration);
    println!();
    println!("Press Ctrl+C to stop early");
    println!();

    let token = CancellationToken::new();
    let handler_token = token.clone();
    ctrlc::set_handler(move || handler_token.cancel())
        .context("failed to set Ctrl+C handler")?;

    // Sampled before the sources start so no event predates the session.
    let start_time = wall_clock_secs();
    let (stream1, producer1) = source.spawn(token.clone());
    let (stream2, producer2) = delayed.spawn(token.clone());

    let stats = create_shared_stats(2);
    let sink = FanoutSink::new()
        .with(Arc::new(TracingSink::new(config.print_clock)))
        .with(stats.clone());

    let outcome = DualCapture::new(OnsetPredicate::new(config.note_filter))
        .with_poll_interval(config.poll_interval)
        .with_deadline(Duration::from_secs_f64(timing.duration))
        .with_start_time(start_time)
        .with_sink(Arc::new(sink))
        .run(stream1, stream2, &token);

    // Recorders are done; make sure the producers are too.
    token.cancel();
    for (device_id, producer) in [(1, producer1), (2, producer2)] {
        match producer.join() {
            Ok(beats) => tracing::debug!(device_id, beats, "metronome stopped"),
            Err(_) => tracing::error!(device_id, "metronome thread panicked"),
        }
    }

    for fault in outcome.faults() {
        tracing::error!(device_id = fault.device_id(), error = %fault, "capture fault");
    }

    let report = ReportBuilder::new(&config).build(&outcome);

    println!();
    println!("{}", stats.summary());
    println!();
    println!("{}", report.summary());

    if let Some(path) = output {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(&report).context("failed to serialize report")?;
        std::fs::write(&path, json)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!();
        println!("Report written to {:?}", path);
    }

    Ok(())
}

fn cmd_config() -> Result<()> {
    let config = Config::load().context("failed to load configuration")?;

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn cmd_init_config(force: bool) -> Result<()> {
    let path = Config::config_path();
    if path.exists() && !force {
        println!("Config file already exists at {:?}", path);
        println!("Use --force to overwrite it.");
        return Ok(());
    }

    Config::default()
        .save()
        .with_context(|| format!("failed to write {}", path.display()))?;
    println!("Wrote default configuration to {:?}", path);
    Ok(())
}
