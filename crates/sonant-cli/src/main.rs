//! Sonant command line
//!
//! Usage:
//!   sonant devices                          - List audio hosts and devices
//!   sonant render -o out.wav -n A4 -n E5    - Render tones offline to WAV
//!   sonant play -n C4 -n E4 -n G4           - Play tones on an output device

mod note;
mod render;

use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use sonant_audio::{CpalDevice, CpalDeviceConfig, Direction, list_available_hosts, list_endpoints};
use sonant_core::{EngineConfig, QualityMode, QualityProfile};
use sonant_engine::{Mixer, ToneHandle};

use crate::render::{WavFormat, render_to_wav};

#[derive(Parser)]
#[command(name = "sonant", about = "Sonant period mixer", version)]
struct Cli {
    /// Engine config file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Quality {
    Draft,
    High,
    Final,
}

impl From<Quality> for QualityMode {
    fn from(quality: Quality) -> Self {
        match quality {
            Quality::Draft => QualityMode::Draft,
            Quality::High => QualityMode::HighQuality,
            Quality::Final => QualityMode::FinalMix,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List audio hosts, output devices and capture devices
    Devices,
    /// Render tones offline to a WAV file
    Render {
        /// Output file
        #[arg(short, long)]
        output: PathBuf,
        /// Notes to play together (e.g. A4, C#5)
        #[arg(short = 'n', long = "note", default_value = "A4")]
        notes: Vec<String>,
        /// Length in seconds
        #[arg(short, long, default_value_t = 2.0)]
        seconds: f64,
        #[arg(short, long, value_enum, default_value = "draft")]
        quality: Quality,
        /// Write 32-bit float instead of 16-bit integer samples
        #[arg(long)]
        float: bool,
    },
    /// Play tones on an output device
    Play {
        /// Output device name; host default when omitted
        #[arg(short, long)]
        device: Option<String>,
        /// Capture from this input device; empty selects the host default
        #[arg(short, long)]
        input: Option<String>,
        #[arg(short = 'n', long = "note", default_value = "A4")]
        notes: Vec<String>,
        #[arg(short, long, default_value_t = 2.0)]
        seconds: f64,
        #[arg(short, long, value_enum, default_value = "draft")]
        quality: Quality,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => EngineConfig::default(),
    };

    match cli.command {
        Commands::Devices => list_devices(),
        Commands::Render {
            output,
            notes,
            seconds,
            quality,
            float,
        } => {
            let frequencies = parse_notes(&notes)?;
            let format = if float {
                WavFormat::Float32
            } else {
                WavFormat::Int16
            };
            let profile = QualityProfile::from_mode(quality.into());
            let summary = render_to_wav(config, profile, &frequencies, seconds, &output, format)?;
            println!(
                "Wrote {} frames @ {} Hz to {} (peak {:.3})",
                summary.frames,
                summary.sample_rate,
                output.display(),
                summary.peak
            );
            Ok(())
        }
        Commands::Play {
            device,
            input,
            notes,
            seconds,
            quality,
        } => play(
            config,
            device,
            input,
            &parse_notes(&notes)?,
            seconds,
            quality.into(),
        ),
    }
}

fn parse_notes(notes: &[String]) -> Result<Vec<f64>> {
    notes.iter().map(|n| note::parse_note(n)).collect()
}

fn list_devices() -> Result<()> {
    println!("Hosts: {}", list_available_hosts().join(", "));
    for direction in [Direction::Output, Direction::Input] {
        println!("{} devices:", direction.label());
        for endpoint in list_endpoints(direction)? {
            println!(
                "{} {} ({} ch, rates: {:?})",
                if endpoint.is_default { "*" } else { " " },
                endpoint.name,
                endpoint.channels,
                endpoint.sample_rates
            );
        }
    }
    Ok(())
}

fn play(
    config: EngineConfig,
    device: Option<String>,
    input: Option<String>,
    frequencies: &[f64],
    seconds: f64,
    quality: QualityMode,
) -> Result<()> {
    let device = CpalDevice::open(CpalDeviceConfig {
        output_device: device,
        input_device: input,
        sample_rate: Some(config.base_sample_rate.as_u32()),
        buffer_frames: Some(config.frames_per_period.as_usize() as u32),
        ..Default::default()
    })?;

    let mixer = Mixer::with_device(config, Box::new(device), true)?;
    mixer.change_quality(QualityProfile::from_mode(quality))?;

    let amplitude = 0.8 / frequencies.len().max(1) as f64;
    for &frequency in frequencies {
        if mixer
            .add_play_handle(Box::new(ToneHandle::new(frequency).with_amplitude(amplitude)))
            .is_none()
        {
            log::warn!("Mixer refused tone at {:.1} Hz", frequency);
        }
    }

    mixer.start_processing()?;
    let started = Instant::now();
    while started.elapsed().as_secs_f64() < seconds {
        thread::sleep(Duration::from_millis(250));
        let (left, right) = mixer.take_peaks();
        log::info!(
            "cpu {:5.1}%  peak L {:.3} R {:.3}  overruns {}  input {} frames",
            mixer.cpu_load(),
            left,
            right,
            mixer.overruns(),
            mixer.input_buffer_frames()
        );
    }
    mixer.stop_processing();
    Ok(())
}
