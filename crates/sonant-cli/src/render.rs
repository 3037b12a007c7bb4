//! Offline rendering to WAV

use std::path::Path;

use anyhow::{Context, Result};
use sonant_audio::{DeviceResampler, sample_to_int};
use sonant_core::{EngineConfig, QualityProfile};
use sonant_engine::{Mixer, ToneHandle};

/// Sample format of the written file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WavFormat {
    Int16,
    Float32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderSummary {
    pub frames: usize,
    pub periods: u64,
    pub sample_rate: u32,
    pub peak: f64,
}

/// Render `frequencies` as a chord for `seconds` and write it to `path`
///
/// Periods render at the processing rate and are resampled back to the
/// base rate, the same way a device would play them.
pub fn render_to_wav(
    config: EngineConfig,
    profile: QualityProfile,
    frequencies: &[f64],
    seconds: f64,
    path: &Path,
    format: WavFormat,
) -> Result<RenderSummary> {
    let mixer = Mixer::new(config).context("failed to create mixer")?;
    mixer.set_offline(true);
    mixer.change_quality(profile)?;

    let amplitude = 0.8 / frequencies.len().max(1) as f64;
    for &frequency in frequencies {
        mixer
            .add_play_handle(Box::new(ToneHandle::new(frequency).with_amplitude(amplitude)))
            .context("mixer refused a tone")?;
    }

    let output_rate = mixer.output_sample_rate();
    let channels = mixer.channels();
    let mut resampler = DeviceResampler::new(
        profile.resampler_params(),
        mixer.processing_sample_rate(),
        output_rate,
        mixer.frames_per_period(),
        channels,
    )?;

    let spec = hound::WavSpec {
        channels: channels as u16,
        sample_rate: output_rate,
        bits_per_sample: match format {
            WavFormat::Int16 => 16,
            WavFormat::Float32 => 32,
        },
        sample_format: match format {
            WavFormat::Int16 => hound::SampleFormat::Int,
            WavFormat::Float32 => hound::SampleFormat::Float,
        },
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("failed to create {}", path.display()))?;

    let total_frames = (seconds.max(0.0) * output_rate as f64).round() as usize;
    let mut written = 0;
    let mut periods = 0;
    let mut interleaved = Vec::new();

    while written < total_frames {
        let period = mixer.next_period();
        periods += 1;

        interleaved.clear();
        let frames = resampler.process(&period, &mut interleaved)?;
        let take = frames.min(total_frames - written);
        for &sample in &interleaved[..take * channels] {
            match format {
                WavFormat::Int16 => writer.write_sample(sample_to_int(sample as f64))?,
                WavFormat::Float32 => writer.write_sample(sample)?,
            }
        }
        written += take;
    }
    writer.finalize()?;

    let (peak_left, peak_right) = mixer.take_peaks();
    log::info!(
        "Rendered {} frames ({} periods) to {}",
        written,
        periods,
        path.display()
    );

    Ok(RenderSummary {
        frames: written,
        periods,
        sample_rate: output_rate,
        peak: peak_left.max(peak_right),
    })
}
