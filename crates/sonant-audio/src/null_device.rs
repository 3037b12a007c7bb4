//! Mute device
//!
//! `paced` consumes buffers in real time on its own thread and throws them
//! away, keeping the engine running without hardware. `manual` never pulls;
//! the owner drives the engine directly (offline rendering, tests).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use sonant_core::{QualityProfile, SurroundBuffer};

use crate::thread_priority::{ThreadRole, promote_current_thread};
use crate::{AudioDevice, AudioError, AudioResult, BufferSource};

pub struct NullDevice {
    name: String,
    sample_rate: u32,
    channels: usize,
    paced: bool,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl NullDevice {
    /// Pulls one period per period duration
    pub fn paced(sample_rate: u32, channels: usize) -> Self {
        Self::with_mode(sample_rate, channels, true)
    }

    /// Never pulls on its own
    pub fn manual(sample_rate: u32, channels: usize) -> Self {
        Self::with_mode(sample_rate, channels, false)
    }

    fn with_mode(sample_rate: u32, channels: usize, paced: bool) -> Self {
        Self {
            name: if paced { "Null (paced)" } else { "Null (manual)" }.to_string(),
            sample_rate,
            channels: channels.max(1),
            paced,
            running: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }

    pub fn is_paced(&self) -> bool {
        self.paced
    }
}

fn pacing_loop(source: Arc<dyn BufferSource>, running: Arc<AtomicBool>) {
    promote_current_thread(ThreadRole::Device);
    let mut buffer = SurroundBuffer::new(source.frames_per_period(), source.channels());
    let mut deadline = Instant::now();

    while running.load(Ordering::Acquire) {
        let rate = source.processing_sample_rate().max(1);
        let period = Duration::from_secs_f64(source.frames_per_period() as f64 / rate as f64);

        source.next_buffer(&mut buffer);

        deadline += period;
        let now = Instant::now();
        if let Some(wait) = deadline.checked_duration_since(now) {
            thread::sleep(wait);
        } else {
            source.report_overrun();
            deadline = now;
        }
    }
}

impl AudioDevice for NullDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> usize {
        self.channels
    }

    fn start_processing(&mut self, source: Arc<dyn BufferSource>) -> AudioResult<()> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        if !self.paced {
            return Ok(());
        }

        let running = Arc::clone(&self.running);
        let handle = thread::Builder::new()
            .name("sonant-null-device".into())
            .spawn(move || pacing_loop(source, running))
            .map_err(|e| {
                self.running.store(false, Ordering::Release);
                AudioError::Thread(e.to_string())
            })?;
        self.thread = Some(handle);
        log::debug!("Null device pacing thread started");
        Ok(())
    }

    fn stop_processing(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
            log::debug!("Null device pacing thread stopped");
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn apply_quality(&mut self, _profile: &QualityProfile, _processing_rate: u32) -> AudioResult<()> {
        Ok(())
    }
}

impl Drop for NullDevice {
    fn drop(&mut self) {
        self.stop_processing();
    }
}
