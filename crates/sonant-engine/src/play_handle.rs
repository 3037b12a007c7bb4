//! Play handles: anything that renders audio into a period

use std::fmt;

use parking_lot::Mutex;
use sonant_core::{QualityProfile, StereoFrame};

use crate::AudioPortId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlayHandleId(pub u64);

impl fmt::Display for PlayHandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handle#{}", self.0)
    }
}

/// Owner of a group of play handles, used for bulk removal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackId(pub u64);

/// Everything a handle may read while rendering one period
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeriodContext {
    /// Frames in this period
    pub frames: usize,
    /// Processing rate (output rate × oversampling)
    pub sample_rate: u32,
    pub quality: QualityProfile,
    /// Monotonic period counter, starting at 0
    pub period: u64,
}

impl Default for PeriodContext {
    fn default() -> Self {
        Self {
            frames: sonant_core::DEFAULT_BUFFER_SIZE,
            sample_rate: sonant_core::SampleRate::default().as_u32(),
            quality: QualityProfile::default(),
            period: 0,
        }
    }
}

/// What a handle produced in one period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenderOutcome {
    /// Frames written to the start of the render buffer
    pub frames: usize,
    /// Where in the period those frames belong
    pub offset: usize,
    /// The handle is done; it is removed before the next period
    pub finished: bool,
}

impl RenderOutcome {
    pub fn playing(frames: usize) -> Self {
        Self {
            frames,
            offset: 0,
            finished: false,
        }
    }

    pub fn finished(frames: usize) -> Self {
        Self {
            frames,
            offset: 0,
            finished: true,
        }
    }

    pub fn at_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }
}

/// A render source managed by the mixer
///
/// `render` receives a zeroed buffer of `ctx.frames` frames. It writes its
/// output to the start of the buffer and reports how many frames it wrote;
/// the mixer places them at `offset` within the period.
pub trait PlayHandle: Send {
    fn render(&mut self, buffer: &mut [StereoFrame], ctx: &PeriodContext) -> RenderOutcome;

    /// Read once when the handle is added
    fn track(&self) -> Option<TrackId> {
        None
    }

    /// Destination port, read once when the handle is added; `None` mixes
    /// straight into master
    fn audio_port(&self) -> Option<AudioPortId> {
        None
    }

    fn name(&self) -> &str {
        "play handle"
    }
}

/// Registry entry: the handle plus the attributes captured at registration
pub(crate) struct PlayHandleSlot {
    pub id: PlayHandleId,
    pub track: Option<TrackId>,
    pub port: Option<AudioPortId>,
    pub handle: Mutex<Box<dyn PlayHandle>>,
}

impl PlayHandleSlot {
    pub fn new(id: PlayHandleId, handle: Box<dyn PlayHandle>) -> Self {
        Self {
            id,
            track: handle.track(),
            port: handle.audio_port(),
            handle: Mutex::new(handle),
        }
    }
}

impl fmt::Debug for PlayHandleSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlayHandleSlot")
            .field("id", &self.id)
            .field("track", &self.track)
            .field("port", &self.port)
            .finish_non_exhaustive()
    }
}
