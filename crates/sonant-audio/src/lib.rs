//! sonant-audio: Device boundary for the Sonant mixer
//!
//! A device pulls finished period buffers from a [`BufferSource`] (the mixer)
//! at its own pace and pushes captured input back into it.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐ next_buffer  ┌──────────────┐ resample  ┌─────────────┐
//! │ BufferSource │◀─────────────│ AudioDevice  │──────────▶│ cpal Stream │
//! │   (mixer)    │──────────────▶│              │           │  / nothing  │
//! └──────────────┘ push_input   └──────────────┘           └─────────────┘
//! ```

mod convert;
mod cpal_device;
mod device;
mod error;
mod null_device;
mod resampler;
pub mod thread_priority;

pub use convert::*;
pub use cpal_device::*;
pub use device::*;
pub use error::*;
pub use null_device::*;
pub use resampler::*;

use std::sync::Arc;

use sonant_core::{QualityProfile, StereoFrame, SurroundBuffer};

/// The side of the engine a device talks to
///
/// Called from device threads; implementations must not block for longer
/// than it takes to render one period.
pub trait BufferSource: Send + Sync {
    /// Fill `out` with the next period, in delivery order
    fn next_buffer(&self, out: &mut SurroundBuffer);

    /// Hand captured input frames to the engine
    fn push_input_frames(&self, frames: &[StereoFrame]);

    /// The device missed a deadline
    fn report_overrun(&self);

    fn frames_per_period(&self) -> usize;

    fn channels(&self) -> usize;

    /// Rate the period buffers are rendered at
    fn processing_sample_rate(&self) -> u32;
}

/// An output (and optionally input) endpoint driven by a [`BufferSource`]
pub trait AudioDevice: Send {
    fn name(&self) -> &str;

    /// Rate the device plays at
    fn sample_rate(&self) -> u32;

    /// Rate captured input arrives at
    fn input_sample_rate(&self) -> u32 {
        self.sample_rate()
    }

    fn channels(&self) -> usize;

    fn supports_capture(&self) -> bool {
        false
    }

    /// Begin pulling buffers from `source`
    fn start_processing(&mut self, source: Arc<dyn BufferSource>) -> AudioResult<()>;

    /// Stop pulling; returns once no device thread touches the source anymore
    fn stop_processing(&mut self);

    fn is_running(&self) -> bool;

    /// Rebuild the output resampler for a new profile and processing rate
    fn apply_quality(&mut self, profile: &QualityProfile, processing_rate: u32) -> AudioResult<()>;
}
