//! cpal output (and optional capture) device
//!
//! Streams live on a dedicated host thread for their whole lifetime; the
//! device object only keeps a stop channel and the join handle. The output
//! callback pulls period buffers from the source, reduces them to the device
//! rate and spreads them over the device's channel layout. Captured input
//! goes through an rtrb ring and is handed to the source from the output
//! callback, so the source only ever sees one input producer.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{BufferSize as CpalBufferSize, Device, SampleFormat, Stream, StreamConfig};
use crossbeam_channel::{Receiver, Sender, bounded};
use parking_lot::Mutex;
use rtrb::{Consumer, Producer, RingBuffer};
use sonant_core::{QualityProfile, ResamplerParams, StereoFrame, SurroundBuffer};

use crate::thread_priority::{ThreadRole, promote_current_thread};
use crate::device::config_ranges;
use crate::{
    AudioDevice, AudioError, AudioResult, BufferSource, DeviceResampler, Direction, find_device,
    remap_channels,
};

/// Which endpoints to open
#[derive(Debug, Clone, Default)]
pub struct CpalDeviceConfig {
    /// Output device name; `None` selects the host default
    pub output_device: Option<String>,
    /// Capture from this input device (`Some("")` selects the host default)
    pub input_device: Option<String>,
    /// Requested rate; `None` uses the device default
    pub sample_rate: Option<u32>,
    /// Requested hardware period in frames
    pub buffer_frames: Option<u32>,
}

struct Endpoint {
    name: String,
    channels: u16,
    sample_rate: u32,
}

struct HostThread {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

pub struct CpalDevice {
    output: Endpoint,
    input: Option<Endpoint>,
    buffer_frames: Option<u32>,
    resampler_params: ResamplerParams,
    processing_rate: u32,
    resampler: Arc<Mutex<Option<DeviceResampler>>>,
    host: Option<HostThread>,
}

impl CpalDevice {
    pub fn open(config: CpalDeviceConfig) -> AudioResult<Self> {
        let device = find_device(Direction::Output, config.output_device.as_deref())?;
        let output = probe_endpoint(&device, config.sample_rate, Direction::Output)?;

        let input = match &config.input_device {
            Some(name) => {
                let device = find_device(Direction::Input, Some(name))?;
                Some(probe_endpoint(&device, Some(output.sample_rate), Direction::Input)?)
            }
            None => None,
        };

        log::info!(
            "Opened output device '{}' ({} ch @ {} Hz){}",
            output.name,
            output.channels,
            output.sample_rate,
            input
                .as_ref()
                .map(|i| format!(", capture from '{}'", i.name))
                .unwrap_or_default()
        );

        Ok(Self {
            processing_rate: output.sample_rate,
            output,
            input,
            buffer_frames: config.buffer_frames,
            resampler_params: ResamplerParams::Linear,
            resampler: Arc::new(Mutex::new(None)),
            host: None,
        })
    }

    /// Open the host default output without capture
    pub fn open_default() -> AudioResult<Self> {
        Self::open(CpalDeviceConfig::default())
    }

    fn build_resampler(&self, chunk_frames: usize, channels: usize) -> AudioResult<DeviceResampler> {
        DeviceResampler::new(
            self.resampler_params,
            self.processing_rate,
            self.output.sample_rate,
            chunk_frames,
            channels,
        )
    }
}

fn probe_endpoint(
    device: &Device,
    rate: Option<u32>,
    direction: Direction,
) -> AudioResult<Endpoint> {
    let name = device
        .name()
        .map_err(|e| AudioError::BackendError(e.to_string()))?;
    let default = match direction {
        Direction::Output => device.default_output_config(),
        Direction::Input => device.default_input_config(),
    }
    .map_err(|e| AudioError::ConfigError(e.to_string()))?;

    let sample_rate = rate.unwrap_or(default.sample_rate().0);
    let ranges = config_ranges(device, direction)?;

    let supported = ranges.iter().find(|c| {
        c.sample_format() == SampleFormat::F32
            && c.min_sample_rate().0 <= sample_rate
            && c.max_sample_rate().0 >= sample_rate
    });

    match supported {
        Some(range) => Ok(Endpoint {
            name,
            channels: range.channels(),
            sample_rate,
        }),
        None => Err(AudioError::UnsupportedSampleRate(sample_rate)),
    }
}

fn stream_config(endpoint: &Endpoint, buffer_frames: Option<u32>) -> StreamConfig {
    StreamConfig {
        channels: endpoint.channels,
        sample_rate: cpal::SampleRate(endpoint.sample_rate),
        buffer_size: match buffer_frames {
            Some(frames) => CpalBufferSize::Fixed(frames),
            None => CpalBufferSize::Default,
        },
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// OUTPUT CALLBACK
// ═══════════════════════════════════════════════════════════════════════════════

struct OutputState {
    source: Arc<dyn BufferSource>,
    resampler: Arc<Mutex<Option<DeviceResampler>>>,
    period: SurroundBuffer,
    pending: Vec<f32>,
    pending_pos: usize,
    device_channels: usize,
    device_rate: u32,
    capture: Option<CaptureDrain>,
    resample_failed: bool,
}

struct CaptureDrain {
    consumer: Consumer<f32>,
    channels: usize,
    scratch: Vec<StereoFrame>,
}

impl CaptureDrain {
    fn drain(&mut self, source: &dyn BufferSource) {
        let available = self.consumer.slots() / self.channels * self.channels;
        if available == 0 {
            return;
        }
        self.scratch.clear();
        if let Ok(chunk) = self.consumer.read_chunk(available) {
            let (first, second) = chunk.as_slices();
            let mut frame = [0.0f32; 2];
            for (index, &sample) in first.iter().chain(second).enumerate() {
                let channel = index % self.channels;
                if channel < 2 {
                    frame[channel] = sample;
                }
                if channel == self.channels - 1 {
                    let right = if self.channels == 1 { frame[0] } else { frame[1] };
                    self.scratch
                        .push(StereoFrame::new(frame[0] as f64, right as f64));
                }
            }
            chunk.commit_all();
        }
        source.push_input_frames(&self.scratch);
    }
}

impl OutputState {
    fn refill(&mut self) {
        self.pending.clear();
        self.pending_pos = 0;
        self.source.next_buffer(&mut self.period);

        let mut resampler = self.resampler.lock();
        let result = match resampler.as_mut() {
            Some(r) => r.process(&self.period, &mut self.pending).map(|_| ()),
            None => {
                self.pending
                    .extend(self.period.samples().iter().map(|&s| s as f32));
                Ok(())
            }
        };
        if let Err(e) = result {
            if !self.resample_failed {
                log::error!("Output resampling failed, emitting silence: {}", e);
                self.resample_failed = true;
            }
            self.pending.clear();
            self.pending
                .resize(self.period.frames() * self.period.channels(), 0.0);
        }
    }

    fn render(&mut self, data: &mut [f32]) {
        promote_current_thread(ThreadRole::Device);
        let started = Instant::now();
        let frames_needed = data.len() / self.device_channels;

        if let Some(capture) = self.capture.as_mut() {
            capture.drain(self.source.as_ref());
        }

        let source_channels = self.period.channels();
        let mut written = 0;
        while written < frames_needed {
            if self.pending_pos >= self.pending.len() {
                self.refill();
                if self.pending.is_empty() {
                    break;
                }
            }
            let out = &mut data[written * self.device_channels..];
            let frames = remap_channels(
                &self.pending[self.pending_pos..],
                source_channels,
                out,
                self.device_channels,
            );
            self.pending_pos += frames * source_channels;
            written += frames;
        }
        data[written * self.device_channels..].fill(0.0);

        let budget = Duration::from_secs_f64(frames_needed as f64 / self.device_rate as f64);
        if started.elapsed() > budget {
            self.source.report_overrun();
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// HOST THREAD
// ═══════════════════════════════════════════════════════════════════════════════

struct StreamSetup {
    output_name: String,
    output_config: StreamConfig,
    input: Option<(String, StreamConfig)>,
    state: OutputState,
    capture_producer: Option<Producer<f32>>,
}

fn open_streams(setup: StreamSetup) -> AudioResult<(Stream, Option<Stream>)> {
    let StreamSetup {
        output_name,
        output_config,
        input,
        mut state,
        capture_producer,
    } = setup;

    let input_stream = match (input, capture_producer) {
        (Some((name, config)), Some(mut producer)) => {
            let device = find_device(Direction::Input, Some(&name))?;
            let stream = device
                .build_input_stream(
                    &config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        let writable = producer.slots().min(data.len());
                        if let Ok(mut chunk) = producer.write_chunk(writable) {
                            let (first, second) = chunk.as_mut_slices();
                            let split = first.len();
                            first.copy_from_slice(&data[..split]);
                            second.copy_from_slice(&data[split..writable]);
                            chunk.commit_all();
                        }
                    },
                    |err| log::error!("Audio input stream error: {}", err),
                    None,
                )
                .map_err(|e| AudioError::StreamBuildError(e.to_string()))?;
            Some(stream)
        }
        _ => None,
    };

    let device = find_device(Direction::Output, Some(&output_name))?;
    let output_stream = device
        .build_output_stream(
            &output_config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| state.render(data),
            |err| log::error!("Audio output stream error: {}", err),
            None,
        )
        .map_err(|e| AudioError::StreamBuildError(e.to_string()))?;

    if let Some(stream) = &input_stream {
        stream
            .play()
            .map_err(|e| AudioError::StreamPlayError(e.to_string()))?;
    }
    output_stream
        .play()
        .map_err(|e| AudioError::StreamPlayError(e.to_string()))?;

    Ok((output_stream, input_stream))
}

fn host_thread(setup: StreamSetup, ready: Sender<AudioResult<()>>, stop: Receiver<()>) {
    let streams = match open_streams(setup) {
        Ok(streams) => {
            let _ = ready.send(Ok(()));
            streams
        }
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    // Blocks until stop_processing or the device is dropped
    let _ = stop.recv();
    drop(streams);
}

impl AudioDevice for CpalDevice {
    fn name(&self) -> &str {
        &self.output.name
    }

    fn sample_rate(&self) -> u32 {
        self.output.sample_rate
    }

    fn input_sample_rate(&self) -> u32 {
        self.input
            .as_ref()
            .map(|i| i.sample_rate)
            .unwrap_or(self.output.sample_rate)
    }

    fn channels(&self) -> usize {
        self.output.channels as usize
    }

    fn supports_capture(&self) -> bool {
        self.input.is_some()
    }

    fn start_processing(&mut self, source: Arc<dyn BufferSource>) -> AudioResult<()> {
        if self.host.is_some() {
            return Ok(());
        }

        let frames = source.frames_per_period();
        let channels = source.channels();
        self.processing_rate = source.processing_sample_rate();
        *self.resampler.lock() = Some(self.build_resampler(frames, channels)?);

        let (capture, capture_producer, input) = match &self.input {
            Some(endpoint) => {
                let ring_len = frames.max(1024) * endpoint.channels as usize * 4;
                let (producer, consumer) = RingBuffer::<f32>::new(ring_len);
                let drain = CaptureDrain {
                    consumer,
                    channels: endpoint.channels.max(1) as usize,
                    scratch: Vec::with_capacity(ring_len),
                };
                (
                    Some(drain),
                    Some(producer),
                    Some((endpoint.name.clone(), stream_config(endpoint, self.buffer_frames))),
                )
            }
            None => (None, None, None),
        };

        let setup = StreamSetup {
            output_name: self.output.name.clone(),
            output_config: stream_config(&self.output, self.buffer_frames),
            input,
            state: OutputState {
                source,
                resampler: Arc::clone(&self.resampler),
                period: SurroundBuffer::new(frames, channels),
                pending: Vec::with_capacity(frames * channels * 2),
                pending_pos: 0,
                device_channels: self.output.channels.max(1) as usize,
                device_rate: self.output.sample_rate,
                capture,
                resample_failed: false,
            },
            capture_producer,
        };

        let (ready_tx, ready_rx) = bounded(1);
        let (stop_tx, stop_rx) = bounded(1);
        let handle = thread::Builder::new()
            .name("sonant-cpal-host".into())
            .spawn(move || host_thread(setup, ready_tx, stop_rx))
            .map_err(|e| AudioError::Thread(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.host = Some(HostThread {
                    stop: stop_tx,
                    handle,
                });
                log::info!("Output stream on '{}' started", self.output.name);
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(AudioError::Thread("stream host thread exited".into()))
            }
        }
    }

    fn stop_processing(&mut self) {
        if let Some(host) = self.host.take() {
            let _ = host.stop.send(());
            let _ = host.handle.join();
            log::info!("Output stream on '{}' stopped", self.output.name);
        }
    }

    fn is_running(&self) -> bool {
        self.host.is_some()
    }

    fn apply_quality(&mut self, profile: &QualityProfile, processing_rate: u32) -> AudioResult<()> {
        self.resampler_params = profile.resampler_params();
        self.processing_rate = processing_rate;

        let mut slot = self.resampler.lock();
        if let Some((frames, channels)) = slot.as_ref().map(|r| (r.chunk_frames(), r.channels())) {
            *slot = Some(self.build_resampler(frames, channels)?);
            log::debug!("Output resampler rebuilt for {} Hz processing", processing_rate);
        }
        Ok(())
    }
}

impl Drop for CpalDevice {
    fn drop(&mut self) {
        self.stop_processing();
    }
}
