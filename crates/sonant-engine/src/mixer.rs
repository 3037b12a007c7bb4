//! Mixer context
//!
//! `Mixer` owns everything one engine instance needs: the play-handle
//! registry, audio ports, the render core with its worker pool, the
//! lookahead buffer pool and the active audio device. It is the
//! [`BufferSource`] the device pulls from.
//!
//! Lock order: control, then global, then render. The render path takes
//! render before global and never touches control.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Instant;

use crossbeam_channel::Receiver;
use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};
use sonant_audio::{AudioDevice, BufferSource, NullDevice};
use sonant_core::{AtomicF64, EngineConfig, QualityProfile, StereoFrame, SurroundBuffer};

use crate::buffer_pool::{BufferPool, Delivery, PoolIndices};
use crate::events::{EventBus, MixerEvent};
use crate::input::InputRing;
use crate::lookahead::LookaheadWriter;
use crate::meter::MixerMeters;
use crate::registry::Registry;
use crate::render::RenderCore;
use crate::worker_pool::WorkerPool;
use crate::{
    AudioPort, AudioPortId, MixerError, MixerResult, PeriodContext, PlayHandle, PlayHandleId,
    TrackId,
};

/// Periods of captured input the input ring can hold
const INPUT_BUFFER_PERIODS: usize = 100;

// ═══════════════════════════════════════════════════════════════════════════════
// SHARED CORE
// ═══════════════════════════════════════════════════════════════════════════════

/// State changed from the control thread, read at period boundaries
struct GlobalState {
    registry: Registry,
    ports: Vec<Arc<AudioPort>>,
    quality: QualityProfile,
    next_port_id: u64,
}

pub(crate) struct MixerCore {
    config: EngineConfig,
    frames: usize,
    channels: usize,
    global: Mutex<GlobalState>,
    render: Mutex<RenderCore>,
    pool: BufferPool,
    input: Mutex<InputRing>,
    meters: MixerMeters,
    events: EventBus,
    master_gain: AtomicF64,
    output_rate: AtomicU32,
    input_rate: AtomicU32,
    processing_rate: AtomicU32,
    lookahead_active: AtomicBool,
    offline: AtomicBool,
    tearing_down: AtomicBool,
    critical: AtomicBool,
}

impl MixerCore {
    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    /// Render one period into `out`
    pub fn render_into(&self, out: &mut SurroundBuffer) {
        let mut render = self.render.lock();
        let started = Instant::now();

        let ctx = {
            let mut guard = self.global.lock();
            let global = &mut *guard;
            render.begin_period(&mut global.registry, &global.ports);
            PeriodContext {
                frames: self.frames,
                sample_rate: self.processing_rate.load(Ordering::Acquire),
                quality: global.quality,
                period: render.period(),
            }
        };

        self.input.lock().swap();

        let peaks = render.mix(&ctx, self.master_gain.get(), out);
        if !render.finished().is_empty() {
            self.global.lock().registry.schedule_finished(render.finished());
        }
        render.end_period();
        drop(render);

        let budget = self.frames as f64 / ctx.sample_rate.max(1) as f64;
        let raw_load = started.elapsed().as_secs_f64() / budget * 100.0;
        self.meters.record_period(peaks.left, peaks.right, raw_load);
        if raw_load > 100.0 && !self.offline.load(Ordering::Relaxed) {
            self.meters.record_overrun();
        }
        self.update_critical();

        self.events.emit(MixerEvent::NextAudioBuffer {
            period: ctx.period,
            peak_left: peaks.left,
            peak_right: peaks.right,
        });
    }

    fn is_critical(&self) -> bool {
        if self.offline.load(Ordering::Relaxed) {
            return false;
        }
        self.meters.consecutive_overruns() >= self.config.critical_overrun_count
            || self.meters.cpu_load() >= self.config.critical_cpu_load
    }

    fn update_critical(&self) {
        let critical = self.is_critical();
        if self.critical.swap(critical, Ordering::Relaxed) != critical {
            if critical {
                log::warn!(
                    "Mixer entered critical state ({} consecutive overruns, {:.1}% load); new play handles are refused",
                    self.meters.consecutive_overruns(),
                    self.meters.cpu_load()
                );
            } else {
                log::info!("Mixer left critical state");
            }
        }
    }
}

impl BufferSource for MixerCore {
    fn next_buffer(&self, out: &mut SurroundBuffer) {
        self.meters.record_pull();
        if !self.lookahead_active.load(Ordering::Acquire) {
            self.render_into(out);
            return;
        }
        match self.pool.next_delivery() {
            Delivery::Ready(index) => {
                out.copy_from(&self.pool.slot(index));
                self.update_critical();
            }
            Delivery::Direct => {
                self.render_into(out);
                self.pool.end_direct();
            }
        }
    }

    fn push_input_frames(&self, frames: &[StereoFrame]) {
        self.input.lock().push(frames);
    }

    fn report_overrun(&self) {
        self.meters.record_overrun();
        self.update_critical();
    }

    fn frames_per_period(&self) -> usize {
        self.frames
    }

    fn channels(&self) -> usize {
        self.channels
    }

    fn processing_sample_rate(&self) -> u32 {
        self.processing_rate.load(Ordering::Acquire)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// MIXER
// ═══════════════════════════════════════════════════════════════════════════════

struct Control {
    device: Box<dyn AudioDevice>,
    needs_lookahead: bool,
    previous: Option<(Box<dyn AudioDevice>, bool)>,
    writer: Option<LookaheadWriter>,
    running: bool,
}

/// One engine instance
pub struct Mixer {
    core: Arc<MixerCore>,
    control: Mutex<Control>,
}

impl Mixer {
    /// Mixer on a manual null device; the caller pulls periods itself
    pub fn new(config: EngineConfig) -> MixerResult<Self> {
        let device = NullDevice::manual(config.base_sample_rate.as_u32(), config.channels);
        Self::with_device(config, Box::new(device), true)
    }

    /// Mixer on `device`; `needs_lookahead` enables the lookahead writer for it
    pub fn with_device(
        config: EngineConfig,
        device: Box<dyn AudioDevice>,
        needs_lookahead: bool,
    ) -> MixerResult<Self> {
        config.validate()?;

        let frames = config.frames_per_period.as_usize();
        let channels = config.channels;
        let workers = if config.multithreaded {
            WorkerPool::new(config.num_workers.unwrap_or_else(num_cpus::get).max(1))
        } else {
            WorkerPool::inline()
        };
        let quality = QualityProfile::from_mode(config.quality);
        let output_rate = device.sample_rate();
        let processing_rate = quality.processing_sample_rate(output_rate);

        let core = Arc::new(MixerCore {
            frames,
            channels,
            global: Mutex::new(GlobalState {
                registry: Registry::default(),
                ports: Vec::new(),
                quality,
                next_port_id: 1,
            }),
            render: Mutex::new(RenderCore::new(frames, workers)),
            pool: BufferPool::new(config.pool_depth, frames, channels),
            input: Mutex::new(InputRing::new(frames * INPUT_BUFFER_PERIODS)),
            meters: MixerMeters::new(),
            events: EventBus::new(config.event_capacity),
            master_gain: AtomicF64::new(config.master_gain),
            output_rate: AtomicU32::new(output_rate),
            input_rate: AtomicU32::new(device.input_sample_rate()),
            processing_rate: AtomicU32::new(processing_rate),
            lookahead_active: AtomicBool::new(false),
            offline: AtomicBool::new(false),
            tearing_down: AtomicBool::new(false),
            critical: AtomicBool::new(false),
            config,
        });

        let mut device = device;
        device.apply_quality(&quality, processing_rate)?;

        log::info!(
            "Mixer ready: {} frames/period, {} channels, {} Hz processing, {} workers, device '{}'",
            frames,
            channels,
            processing_rate,
            core.render.lock().worker_count(),
            device.name()
        );

        Ok(Self {
            core,
            control: Mutex::new(Control {
                device,
                needs_lookahead,
                previous: None,
                writer: None,
                running: false,
            }),
        })
    }

    // ─── Play handles ────────────────────────────────────────────────────────

    /// Register a handle; it renders from the next period boundary on
    ///
    /// Returns `None` while the engine is in critical state or shutting down.
    pub fn add_play_handle(&self, handle: Box<dyn PlayHandle>) -> Option<PlayHandleId> {
        if self.is_shut_down() {
            log::debug!("Refusing play handle '{}' after shutdown", handle.name());
            return None;
        }
        if self.core.is_critical() {
            log::debug!("Refusing play handle '{}' in critical state", handle.name());
            return None;
        }
        Some(self.core.global.lock().registry.add(handle))
    }

    /// Schedule removal at the next period boundary
    ///
    /// The handle is kept for [`take_removed_play_handles`](Self::take_removed_play_handles);
    /// only the most recent 256 untaken removals are kept, older ones are dropped.
    pub fn remove_play_handle(&self, id: PlayHandleId) -> bool {
        self.core.global.lock().registry.remove(id)
    }

    /// Schedule removal of every handle on `track`
    pub fn remove_play_handles(&self, track: TrackId) -> usize {
        self.core.global.lock().registry.remove_for_track(track)
    }

    /// Schedule removal of every handle
    pub fn clear(&self) -> usize {
        self.core.global.lock().registry.clear()
    }

    pub fn has_play_handles(&self) -> bool {
        !self.core.global.lock().registry.is_empty()
    }

    pub fn play_handle_count(&self) -> usize {
        self.core.global.lock().registry.len()
    }

    pub fn contains_play_handle(&self, id: PlayHandleId) -> bool {
        self.core.global.lock().registry.contains(id)
    }

    /// Handles removed explicitly, once no period references them anymore
    pub fn take_removed_play_handles(&self) -> Vec<(PlayHandleId, Box<dyn PlayHandle>)> {
        self.core.global.lock().registry.take_removed()
    }

    // ─── Audio ports ─────────────────────────────────────────────────────────

    pub fn add_audio_port(&self, name: impl Into<String>) -> Arc<AudioPort> {
        let mut global = self.core.global.lock();
        let id = AudioPortId(global.next_port_id);
        global.next_port_id += 1;
        let port = Arc::new(AudioPort::new(id, name.into()));
        global.ports.push(Arc::clone(&port));
        log::debug!("Added audio port {} '{}'", id, port.name());
        port
    }

    /// Handles routed to a removed port render silence
    pub fn remove_audio_port(&self, id: AudioPortId) -> bool {
        let mut global = self.core.global.lock();
        let before = global.ports.len();
        global.ports.retain(|p| p.id() != id);
        before != global.ports.len()
    }

    pub fn audio_ports(&self) -> Vec<Arc<AudioPort>> {
        self.core.global.lock().ports.clone()
    }

    // ─── Buffers ─────────────────────────────────────────────────────────────

    /// Fill `out` with the next period, exactly as a device would get it
    ///
    /// Only one consumer may pull at a time; with a running device that
    /// consumer is the device.
    pub fn next_buffer(&self, out: &mut SurroundBuffer) {
        self.core.next_buffer(out);
    }

    /// Next period in a fresh buffer
    pub fn next_period(&self) -> SurroundBuffer {
        let mut out = SurroundBuffer::new(self.core.frames, self.core.channels);
        self.core.next_buffer(&mut out);
        out
    }

    pub fn push_input_frames(&self, frames: &[StereoFrame]) {
        self.core.push_input_frames(frames);
    }

    /// Input captured during the previous period
    pub fn input_buffer(&self) -> MappedMutexGuard<'_, [StereoFrame]> {
        MutexGuard::map(self.core.input.lock(), |ring| ring.read_frames())
    }

    pub fn input_buffer_frames(&self) -> usize {
        self.core.input.lock().read_count()
    }

    /// Copy of the most recently pre-rendered period
    pub fn analysis_buffer(&self) -> Option<SurroundBuffer> {
        self.core.pool.analysis_buffer()
    }

    pub fn pool_indices(&self) -> PoolIndices {
        self.core.pool.indices()
    }

    pub fn pool_depth(&self) -> usize {
        self.core.pool.depth()
    }

    // ─── Device ──────────────────────────────────────────────────────────────

    /// Switch to `device`, keeping the current one for [`restore_audio_device`](Self::restore_audio_device)
    ///
    /// If the new device fails to configure or start, a paced null device
    /// takes its place so processing continues, and the error is returned.
    pub fn set_audio_device(
        &self,
        device: Box<dyn AudioDevice>,
        profile: QualityProfile,
        needs_lookahead: bool,
    ) -> MixerResult<()> {
        let mut control = self.control.lock();
        let was_running = control.running;
        self.stop_locked(&mut control);

        let old_device = std::mem::replace(&mut control.device, device);
        let old_lookahead = std::mem::replace(&mut control.needs_lookahead, needs_lookahead);
        control.previous = Some((old_device, old_lookahead));
        log::info!("Audio device changed to '{}'", control.device.name());

        let result = self.apply_quality_locked(&mut control, profile).and_then(|()| {
            if was_running {
                self.start_locked(&mut control)
            } else {
                Ok(())
            }
        });

        if let Err(e) = result {
            log::error!(
                "Audio device '{}' failed: {}; falling back to null device",
                control.device.name(),
                e
            );
            self.stop_locked(&mut control);
            let rate = control.device.sample_rate();
            control.device = Box::new(NullDevice::paced(rate, self.core.channels));
            control.needs_lookahead = true;
            if let Err(fallback) = self.apply_quality_locked(&mut control, profile) {
                log::error!("Null device rejected quality settings: {}", fallback);
            }
            if was_running {
                if let Err(fallback) = self.start_locked(&mut control) {
                    log::error!("Null device failed to start: {}", fallback);
                }
            }
            return Err(e);
        }
        Ok(())
    }

    /// Go back to the device active before the last [`set_audio_device`](Self::set_audio_device)
    pub fn restore_audio_device(&self) -> MixerResult<()> {
        let mut control = self.control.lock();
        let Some((device, needs_lookahead)) = control.previous.take() else {
            return Err(MixerError::NoPreviousDevice);
        };

        let was_running = control.running;
        self.stop_locked(&mut control);
        control.device = device;
        control.needs_lookahead = needs_lookahead;
        log::info!("Audio device restored to '{}'", control.device.name());

        let profile = self.core.global.lock().quality;
        self.apply_quality_locked(&mut control, profile)?;
        if was_running {
            self.start_locked(&mut control)?;
        }
        Ok(())
    }

    pub fn device_name(&self) -> String {
        self.control.lock().device.name().to_string()
    }

    // ─── Quality ─────────────────────────────────────────────────────────────

    /// Switch quality; processing restarts if it was running
    pub fn change_quality(&self, profile: QualityProfile) -> MixerResult<()> {
        let mut control = self.control.lock();
        let was_running = control.running;
        self.stop_locked(&mut control);
        let result = self.apply_quality_locked(&mut control, profile);
        if was_running {
            self.start_locked(&mut control)?;
        }
        result
    }

    pub fn current_quality(&self) -> QualityProfile {
        self.core.global.lock().quality
    }

    fn apply_quality_locked(&self, control: &mut Control, profile: QualityProfile) -> MixerResult<()> {
        let output = control.device.sample_rate();
        let processing = profile.processing_sample_rate(output);
        let old_output = self.core.output_rate.swap(output, Ordering::AcqRel);
        let old_processing = self.core.processing_rate.swap(processing, Ordering::AcqRel);
        self.core
            .input_rate
            .store(control.device.input_sample_rate(), Ordering::Release);
        self.core.global.lock().quality = profile;

        let result = control.device.apply_quality(&profile, processing);

        self.core.events.emit(MixerEvent::QualitySettingsChanged(profile));
        if old_output != output || old_processing != processing {
            log::info!("Sample rate changed: {} Hz output, {} Hz processing", output, processing);
            self.core.events.emit(MixerEvent::SampleRateChanged { output, processing });
        }
        result.map_err(Into::into)
    }

    // ─── Processing ──────────────────────────────────────────────────────────

    pub fn start_processing(&self) -> MixerResult<()> {
        let mut control = self.control.lock();
        self.start_locked(&mut control)
    }

    pub fn stop_processing(&self) {
        let mut control = self.control.lock();
        self.stop_locked(&mut control);
    }

    pub fn is_running(&self) -> bool {
        self.control.lock().running
    }

    /// Stop processing and drop every play handle
    ///
    /// From here on `add_play_handle` refuses (and drops) new handles. The
    /// mixer still answers queries and can be pulled manually.
    pub fn shut_down(&self) {
        self.core.tearing_down.store(true, Ordering::Release);
        self.stop_processing();
        let slots = self.core.global.lock().registry.drain();
        log::info!("Mixer shut down; dropping {} play handles", slots.len());
        drop(slots);
    }

    pub fn is_shut_down(&self) -> bool {
        self.core.tearing_down.load(Ordering::Acquire)
    }

    fn start_locked(&self, control: &mut Control) -> MixerResult<()> {
        if control.running {
            return Err(MixerError::AlreadyRunning);
        }

        if self.core.config.lookahead && control.needs_lookahead {
            match LookaheadWriter::spawn(Arc::clone(&self.core)) {
                Ok(writer) => {
                    control.writer = Some(writer);
                    self.core.lookahead_active.store(true, Ordering::Release);
                }
                Err(e) => log::error!("{}; rendering synchronously", e),
            }
        }

        let source: Arc<dyn BufferSource> = Arc::clone(&self.core) as Arc<dyn BufferSource>;
        if let Err(e) = control.device.start_processing(source) {
            self.stop_writer(control);
            return Err(e.into());
        }

        control.running = true;
        log::info!(
            "Processing started on '{}' (lookahead {})",
            control.device.name(),
            if control.writer.is_some() { "on" } else { "off" }
        );
        Ok(())
    }

    fn stop_locked(&self, control: &mut Control) {
        if !control.running {
            return;
        }
        control.device.stop_processing();
        self.stop_writer(control);
        control.running = false;
        log::info!("Processing stopped on '{}'", control.device.name());
    }

    fn stop_writer(&self, control: &mut Control) {
        if let Some(mut writer) = control.writer.take() {
            writer.stop();
        }
        self.core.lookahead_active.store(false, Ordering::Release);
    }

    /// Renders are measured against wall-clock time only when not offline
    pub fn set_offline(&self, offline: bool) {
        self.core.offline.store(offline, Ordering::Relaxed);
        self.core.update_critical();
    }

    pub fn is_offline(&self) -> bool {
        self.core.offline.load(Ordering::Relaxed)
    }

    pub fn is_lookahead_active(&self) -> bool {
        self.core.lookahead_active.load(Ordering::Acquire)
    }

    // ─── Rates and geometry ──────────────────────────────────────────────────

    pub fn frames_per_period(&self) -> usize {
        self.core.frames
    }

    pub fn channels(&self) -> usize {
        self.core.channels
    }

    pub fn worker_count(&self) -> usize {
        self.core.render.lock().worker_count()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.core.config
    }

    pub fn base_sample_rate(&self) -> u32 {
        self.core.config.base_sample_rate.as_u32()
    }

    pub fn output_sample_rate(&self) -> u32 {
        self.core.output_rate.load(Ordering::Acquire)
    }

    pub fn input_sample_rate(&self) -> u32 {
        self.core.input_rate.load(Ordering::Acquire)
    }

    pub fn processing_sample_rate(&self) -> u32 {
        self.core.processing_rate.load(Ordering::Acquire)
    }

    // ─── Telemetry ───────────────────────────────────────────────────────────

    pub fn master_gain(&self) -> f64 {
        self.core.master_gain.get()
    }

    pub fn set_master_gain(&self, gain: f64) {
        self.core.master_gain.set(gain.max(0.0));
    }

    pub fn meters(&self) -> &MixerMeters {
        &self.core.meters
    }

    pub fn cpu_load(&self) -> f64 {
        self.core.meters.cpu_load()
    }

    pub fn peak_left(&self) -> f64 {
        self.core.meters.peak_left()
    }

    pub fn peak_right(&self) -> f64 {
        self.core.meters.peak_right()
    }

    pub fn take_peaks(&self) -> (f64, f64) {
        self.core.meters.take_peaks()
    }

    pub fn overruns(&self) -> u64 {
        self.core.meters.overruns()
    }

    /// The device can no longer keep up
    pub fn critical_xruns(&self) -> bool {
        self.core.is_critical()
    }

    /// Count a missed device deadline
    pub fn report_overrun(&self) {
        self.core.report_overrun();
    }

    pub fn events(&self) -> Receiver<MixerEvent> {
        self.core.events.receiver()
    }
}

impl Drop for Mixer {
    fn drop(&mut self) {
        self.core.tearing_down.store(true, Ordering::Release);
        let control = self.control.get_mut();
        if control.running {
            control.device.stop_processing();
            if let Some(mut writer) = control.writer.take() {
                writer.stop();
            }
            control.running = false;
        }
        log::debug!("Mixer dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ToneHandle;
    use sonant_core::QualityMode;

    fn config() -> EngineConfig {
        EngineConfig {
            multithreaded: false,
            lookahead: false,
            ..Default::default()
        }
    }

    #[test]
    fn test_new_mixer_is_idle() {
        let mixer = Mixer::new(config()).unwrap();
        assert!(!mixer.is_running());
        assert!(!mixer.has_play_handles());
        assert_eq!(mixer.frames_per_period(), 256);
        assert_eq!(mixer.processing_sample_rate(), 44100);
        assert_eq!(mixer.worker_count(), 0);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let bad = EngineConfig {
            channels: 0,
            ..config()
        };
        assert!(matches!(Mixer::new(bad), Err(MixerError::Core(_))));
    }

    #[test]
    fn test_start_twice_fails() {
        let mixer = Mixer::new(config()).unwrap();
        mixer.start_processing().unwrap();
        assert!(matches!(mixer.start_processing(), Err(MixerError::AlreadyRunning)));
        mixer.stop_processing();
        assert!(!mixer.is_running());
    }

    #[test]
    fn test_change_quality_emits_events() {
        let mixer = Mixer::new(config()).unwrap();
        let events = mixer.events();
        mixer
            .change_quality(QualityProfile::from_mode(QualityMode::HighQuality))
            .unwrap();

        assert_eq!(mixer.processing_sample_rate(), 88200);
        let received: Vec<_> = events.try_iter().collect();
        assert!(matches!(received[0], MixerEvent::QualitySettingsChanged(_)));
        assert_eq!(
            received[1],
            MixerEvent::SampleRateChanged {
                output: 44100,
                processing: 88200
            }
        );
    }

    #[test]
    fn test_restore_without_previous_device() {
        let mixer = Mixer::new(config()).unwrap();
        assert!(matches!(
            mixer.restore_audio_device(),
            Err(MixerError::NoPreviousDevice)
        ));
    }

    #[test]
    fn test_set_and_restore_device() {
        let mixer = Mixer::new(config()).unwrap();
        mixer
            .set_audio_device(
                Box::new(NullDevice::manual(48000, 2)),
                QualityProfile::draft(),
                false,
            )
            .unwrap();
        assert_eq!(mixer.output_sample_rate(), 48000);
        assert_eq!(mixer.device_name(), "Null (manual)");

        mixer.restore_audio_device().unwrap();
        assert_eq!(mixer.output_sample_rate(), 44100);
    }

    #[test]
    fn test_removed_port_mutes_its_handles() {
        let mixer = Mixer::new(config()).unwrap();
        let port = mixer.add_audio_port("Lead");
        mixer
            .add_play_handle(Box::new(ToneHandle::new(440.0).on_port(port.id())))
            .unwrap();
        assert!(mixer.next_period().samples().iter().any(|&s| s != 0.0));

        assert!(mixer.remove_audio_port(port.id()));
        assert!(!mixer.remove_audio_port(port.id()));
        assert!(mixer.next_period().samples().iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_input_buffer_shows_previous_period() {
        let mixer = Mixer::new(config()).unwrap();
        mixer.push_input_frames(&[StereoFrame::mono(0.25); 10]);
        assert_eq!(mixer.input_buffer_frames(), 0);

        mixer.next_period();
        assert_eq!(mixer.input_buffer_frames(), 10);
        assert_eq!(mixer.input_buffer()[9], StereoFrame::mono(0.25));

        mixer.next_period();
        assert_eq!(mixer.input_buffer_frames(), 0);
    }
}
