//! Interactive calibration of the load cell from a terminal.
//!
//! Tares the empty scale, derives the scale factor from a reference mass and
//! then prints live readings until interrupted. The chip is powered down on
//! every exit path.

use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use massa_loadcell::{open_scale, Backend, Gain, ScaleConfig, WeighingSystem};
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(about = "Tare and calibrate the HX711 load cell")]
struct Args {
    /// Use the simulated HX711 instead of the GPIO chip
    #[arg(long)]
    sim: bool,

    /// GPIO chip holding the HX711 lines
    #[arg(long)]
    chip: Option<String>,

    /// Line offset of DOUT
    #[arg(long)]
    data: Option<u32>,

    /// Line offset of PD_SCK
    #[arg(long)]
    clock: Option<u32>,

    /// Gain of channel A (128 or 64) or channel B (32)
    #[arg(long)]
    gain: Option<u32>,

    /// Reference mass on the scale; prompted for when omitted
    #[arg(short, long)]
    known_mass: Option<f64>,

    /// Conversions per tare and per calibration reading
    #[arg(short, long, default_value_t = 20)]
    samples: usize,

    /// Delay between live readings
    #[arg(long, default_value_t = 200)]
    interval_ms: u64,
}

impl Args {
    fn scale_config(&self) -> Result<ScaleConfig> {
        let mut config = ScaleConfig::from_env().context("invalid scale configuration")?;
        if self.sim {
            config.backend = Backend::Simulated;
        }
        if let Some(chip) = &self.chip {
            config.chip = chip.clone();
        }
        if let Some(data) = self.data {
            config.pins.data = data;
        }
        if let Some(clock) = self.clock {
            config.pins.clock = clock;
        }
        if let Some(gain) = self.gain {
            config.gain = Gain::try_from(gain)?;
        }
        config.acquisition.tare_samples = self.samples;
        config.acquisition.calibration_samples = self.samples;
        config.validate()?;
        Ok(config)
    }
}

fn prompt(message: &str) -> Result<String> {
    print!("{message}");
    io::stdout().flush()?;

    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        bail!("stdin closed");
    }
    Ok(line.trim().to_string())
}

fn parse_mass(input: &str) -> Result<f64> {
    let mass: f64 = input
        .parse()
        .with_context(|| format!("{input:?} is not a number"))?;
    if !mass.is_finite() || mass <= 0.0 {
        bail!("the reference mass must be positive");
    }
    Ok(mass)
}

/// Run a blocking step on a worker so Ctrl+C stays responsive.
async fn blocking<T, F>(step: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(step).await?
}

async fn calibrate(scale: Arc<dyn WeighingSystem>, args: &Args) -> Result<()> {
    let handle = Arc::clone(&scale);
    let raw = blocking(move || Ok(handle.read_raw()?)).await?;
    if !raw.device_available {
        bail!("HX711 not responding, check wiring and line offsets");
    }
    println!("HX711 initialized, raw value: {}", raw.value);

    println!("Taring... Remove any weights from the scale.");
    blocking(|| prompt("Press Enter to continue...")).await?;
    let handle = Arc::clone(&scale);
    let samples = args.samples;
    let zero_offset = blocking(move || Ok(handle.tare(samples)?)).await?;
    println!("Tare done, zero offset {zero_offset:.1}");

    println!("Place a known weight on the scale.");
    let known_mass = match args.known_mass {
        Some(mass) => {
            blocking(|| prompt("Press Enter once it is in place...")).await?;
            mass
        }
        None => {
            let input = blocking(|| prompt("Enter the weight in grams or other unit: ")).await?;
            parse_mass(&input)?
        }
    };

    println!("Calibrating... Please wait...");
    let handle = Arc::clone(&scale);
    let profile = blocking(move || Ok(handle.set_reference_from_known_mass(known_mass)?)).await?;
    println!(
        "Calibration complete. Scale factor set to: {}",
        profile.scale_factor
    );
    println!(
        "Use MASSA_ZERO_OFFSET={} MASSA_SCALE_FACTOR={} to keep it",
        profile.zero_offset, profile.scale_factor
    );

    let handle = Arc::clone(&scale);
    let check = blocking(move || Ok(handle.read_units()?)).await?;
    println!("Now {:.2} should be close to {known_mass}", check.value);

    println!("Reading measurements (press Ctrl+C to exit):");
    let interval = Duration::from_millis(args.interval_ms);
    loop {
        let handle = Arc::clone(&scale);
        let reading = blocking(move || Ok(handle.read_units()?)).await?;
        if reading.device_available {
            print!("\rWeight: {:.2} units   ", reading.value);
        } else {
            print!("\rWeight: -- (load cell unavailable)");
        }
        io::stdout().flush()?;
        tokio::time::sleep(interval).await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "massa_calibrate=info,massa_loadcell=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = args.scale_config()?;

    println!("Initializing HX711...");
    let scale = open_scale(&config);

    let outcome = tokio::select! {
        result = calibrate(Arc::clone(&scale), &args) => result,
        _ = signal::ctrl_c() => {
            println!("\nExiting...");
            Ok(())
        }
    };

    if let Err(err) = scale.shutdown() {
        tracing::warn!(error = %err, "failed to power down the HX711");
    }

    if let Err(err) = outcome {
        eprintln!("Error: {err:#}");
        // a prompt may still be blocked on stdin
        std::process::exit(1);
    }
    std::process::exit(0);
}
