//! sonant-engine: Period mixer
//!
//! Renders audio one period at a time:
//! - Play-handle registry with removals deferred to period boundaries
//! - Worker pool spreading handles over threads, one barrier per period
//! - Audio ports with stereo volume, summed into a clipped master
//! - Lookahead writer pre-rendering into a fixed buffer pool
//! - CPU load, peak and overrun telemetry with a critical state
//!
//! # Architecture
//!
//! ```text
//!  control thread           lookahead writer          device thread
//! ┌──────────────┐   ┌──────────────────────────┐   ┌──────────────┐
//! │ add / remove │──▶│ registry ─▶ workers ─▶ mix│──▶│ next_buffer  │
//! │ ports, gain  │   │        └─▶ buffer pool ───┼──▶│  (FIFO)      │
//! └──────────────┘   └──────────────────────────┘   └──────────────┘
//! ```

// Audio code uses explicit indexing
#![allow(clippy::needless_range_loop)]

mod audio_port;
mod buffer_pool;
mod error;
mod events;
mod handles;
mod input;
mod lookahead;
mod meter;
mod mixer;
mod play_handle;
mod registry;
mod render;
mod semaphore;
mod worker_pool;

pub use audio_port::{AudioPort, AudioPortId};
pub use buffer_pool::{BufferPool, Delivery, PoolIndices};
pub use error::{MixerError, MixerResult};
pub use events::MixerEvent;
pub use handles::{SampleClipHandle, ToneHandle};
pub use meter::MixerMeters;
pub use mixer::Mixer;
pub use play_handle::{PeriodContext, PlayHandle, PlayHandleId, RenderOutcome, TrackId};
pub use render::buffer_to_port;
pub use semaphore::Semaphore;

pub use sonant_audio::{AudioDevice, BufferSource};
pub use sonant_core::{
    EngineConfig, QualityMode, QualityProfile, StereoFrame, StereoVolumeVector, SurroundBuffer,
};
