//! Output rate reduction from the processing rate to the device rate
//!
//! Period buffers are rendered at `output_rate × oversampling`; the device
//! resampler brings them back down before they reach the hardware. When both
//! rates match the buffers pass through untouched.

use rubato::{
    FastFixedIn, PolynomialDegree, Resampler, SincFixedIn, SincInterpolationParameters,
    SincInterpolationType, WindowFunction,
};
use sonant_core::{ResamplerParams, SincWindow, SurroundBuffer};

use crate::{AudioError, AudioResult};

enum Engine {
    Passthrough,
    Linear(FastFixedIn<f64>),
    Sinc(SincFixedIn<f64>),
}

/// Converts one period buffer at a time into interleaved device samples
pub struct DeviceResampler {
    engine: Engine,
    channels: usize,
    chunk_frames: usize,
    ratio: f64,
    input: Vec<Vec<f64>>,
    output: Vec<Vec<f64>>,
}

impl DeviceResampler {
    pub fn new(
        params: ResamplerParams,
        processing_rate: u32,
        output_rate: u32,
        chunk_frames: usize,
        channels: usize,
    ) -> AudioResult<Self> {
        if processing_rate == 0 || output_rate == 0 {
            return Err(AudioError::UnsupportedSampleRate(processing_rate.min(output_rate)));
        }
        let channels = channels.max(1);
        let ratio = output_rate as f64 / processing_rate as f64;

        let engine = if processing_rate == output_rate {
            Engine::Passthrough
        } else {
            match params {
                ResamplerParams::Linear => Engine::Linear(
                    FastFixedIn::<f64>::new(
                        ratio,
                        1.0,
                        PolynomialDegree::Linear,
                        chunk_frames,
                        channels,
                    )
                    .map_err(|e| AudioError::ResamplerConstruction(e.to_string()))?,
                ),
                ResamplerParams::Sinc {
                    sinc_len,
                    oversampling_factor,
                    f_cutoff,
                    window,
                } => {
                    let params = SincInterpolationParameters {
                        sinc_len,
                        f_cutoff,
                        interpolation: SincInterpolationType::Linear,
                        oversampling_factor,
                        window: match window {
                            SincWindow::Hann => WindowFunction::Hann,
                            SincWindow::BlackmanHarris => WindowFunction::BlackmanHarris,
                            SincWindow::BlackmanHarris2 => WindowFunction::BlackmanHarris2,
                        },
                    };
                    Engine::Sinc(
                        SincFixedIn::<f64>::new(ratio, 1.0, params, chunk_frames, channels)
                            .map_err(|e| AudioError::ResamplerConstruction(e.to_string()))?,
                    )
                }
            }
        };

        let (input, output) = match &engine {
            Engine::Passthrough => (Vec::new(), Vec::new()),
            Engine::Linear(r) => (r.input_buffer_allocate(true), r.output_buffer_allocate(true)),
            Engine::Sinc(r) => (r.input_buffer_allocate(true), r.output_buffer_allocate(true)),
        };

        log::debug!(
            "Device resampler {} Hz -> {} Hz ({} ch, chunk {})",
            processing_rate,
            output_rate,
            channels,
            chunk_frames
        );

        Ok(Self {
            engine,
            channels,
            chunk_frames,
            ratio,
            input,
            output,
        })
    }

    #[inline]
    pub fn is_passthrough(&self) -> bool {
        matches!(self.engine, Engine::Passthrough)
    }

    /// Output frames per input frame
    #[inline]
    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Frames per input chunk
    #[inline]
    pub fn chunk_frames(&self) -> usize {
        self.chunk_frames
    }

    /// Resample one period and append interleaved `f32` samples to `out`
    ///
    /// Returns the number of frames appended.
    pub fn process(&mut self, buffer: &SurroundBuffer, out: &mut Vec<f32>) -> AudioResult<usize> {
        if self.is_passthrough() {
            out.extend(buffer.samples().iter().map(|&s| s as f32));
            return Ok(buffer.frames());
        }

        // Deinterleave into the fixed-size input chunk, zero padding short buffers
        for channel in self.input.iter_mut() {
            channel.fill(0.0);
        }
        let channels = self.channels.min(buffer.channels());
        for (index, frame) in buffer.iter_frames().take(self.chunk_frames).enumerate() {
            for channel in 0..channels {
                self.input[channel][index] = frame[channel];
            }
        }

        let (_, written) = match &mut self.engine {
            Engine::Linear(r) => r.process_into_buffer(&self.input, &mut self.output, None),
            Engine::Sinc(r) => r.process_into_buffer(&self.input, &mut self.output, None),
            Engine::Passthrough => Ok((0, 0)),
        }
        .map_err(|e| AudioError::Resample(e.to_string()))?;

        out.reserve(written * self.channels);
        for index in 0..written {
            for channel in 0..self.channels {
                out.push(self.output[channel][index] as f32);
            }
        }
        Ok(written)
    }

    /// Drop any history so the next period starts clean
    pub fn reset(&mut self) {
        match &mut self.engine {
            Engine::Linear(r) => r.reset(),
            Engine::Sinc(r) => r.reset(),
            Engine::Passthrough => {}
        }
    }
}
