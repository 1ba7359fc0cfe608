//! Command-line front end for a single source session.
//!
//! ```bash
//! rust_mts --config rust_mts.toml firmware --wait
//! rust_mts --config rust_mts.toml set-loadpoint loadpoint.json
//! rust_mts --config rust_mts.toml off
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};

use rust_mts::channel::SerialChannel;
use rust_mts::config::Settings;
use rust_mts::loadpoint::Loadpoint;
use rust_mts::logging;
use rust_mts::retry::{spawn_retry, Attempt, RetryOutcome, RetryPolicy};
use rust_mts::source::{SerialPortSource, Source};

/// Drive an MT768 or FG30x source from the command line
#[derive(Debug, Parser)]
#[clap(author, version, about)]
struct Args {
    /// Settings file (TOML)
    #[clap(short = 'c', long, default_value = "rust_mts.toml", env = "RUST_MTS_CONFIG")]
    config: PathBuf,

    /// Log level override (trace, debug, info, warn, error)
    #[clap(short = 'l', long)]
    log_level: Option<String>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the device model and firmware version
    Firmware {
        /// Keep asking until the device answers
        #[clap(long)]
        wait: bool,
        /// Delay between attempts while waiting, in milliseconds
        #[clap(long, default_value_t = 1000)]
        interval_ms: u64,
    },
    /// Print the operating envelope of the configured hardware
    Capabilities,
    /// Print the discrete voltage and current ranges
    Ranges,
    /// Print the device error conditions
    Status,
    /// Validate and apply a loadpoint read from a JSON file
    SetLoadpoint { file: PathBuf },
    /// Switch all outputs off
    Off,
}

#[derive(Serialize)]
struct Ranges {
    voltage: Vec<f64>,
    current: Vec<f64>,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn open_source(settings: &Settings) -> Result<SerialPortSource> {
    let selection = settings.transport_selection()?;
    let channel = SerialChannel::open(&selection, settings.timeout())
        .await
        .with_context(|| format!("failed to open {selection}"))?;
    let source = SerialPortSource::new(channel, settings.family()?);
    if let Some(amplifiers) = settings.amplifier_selection()? {
        source.set_amplifiers(amplifiers)?;
    }
    Ok(source)
}

async fn wait_for_firmware(source: Arc<SerialPortSource>, interval: Duration) -> Result<()> {
    let handle = spawn_retry("firmware", RetryPolicy::forever(interval), move || {
        let source = Arc::clone(&source);
        async move {
            let firmware = source.firmware_version().await?;
            info!(model = %firmware.model_name, version = %firmware.version, "device answered");
            println!("{}", serde_json::to_string_pretty(&firmware).unwrap_or_default());
            Ok(Attempt::Finished)
        }
    });

    // Dropping the handle on Ctrl-C cancels the retry task.
    let outcome = tokio::select! {
        outcome = handle.join() => outcome,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted while waiting for the device");
            return Ok(());
        }
    };

    match outcome {
        RetryOutcome::Succeeded { .. } => Ok(()),
        RetryOutcome::Failed { error, .. } => Err(error.into()),
        RetryOutcome::Exhausted { attempts } | RetryOutcome::Cancelled { attempts } => {
            anyhow::bail!("device did not answer after {attempts} attempts")
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let settings = Settings::load(&args.config)
        .with_context(|| format!("failed to load settings from {}", args.config.display()))?;
    logging::init(args.log_level.as_deref().unwrap_or(&settings.log_level))?;

    let source = open_source(&settings).await?;
    info!(family = %source.family(), "session opened");

    match args.command {
        Command::Firmware { wait: true, interval_ms } => {
            wait_for_firmware(Arc::new(source), Duration::from_millis(interval_ms)).await?;
        }
        Command::Firmware { wait: false, .. } => print_json(&source.firmware_version().await?)?,
        Command::Capabilities => print_json(&source.capabilities().await?)?,
        Command::Ranges => {
            let ranges = Ranges {
                voltage: source.voltage_ranges().await?.into_iter().map(f64::from).collect(),
                current: source.current_ranges().await?.into_iter().map(f64::from).collect(),
            };
            print_json(&ranges)?;
        }
        Command::Status => print_json(&source.error_conditions().await?)?,
        Command::SetLoadpoint { file } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let loadpoint: Loadpoint = serde_json::from_str(&text)
                .with_context(|| format!("{} is not a valid loadpoint", file.display()))?;
            source.set_loadpoint(loadpoint).await?;
            print_json(&source.current_loadpoint())?;
        }
        Command::Off => source.turn_off().await?,
    }

    Ok(())
}
