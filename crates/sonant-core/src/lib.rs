//! sonant-core: Shared types for the Sonant period mixer
//!
//! This crate provides the foundational types used across all Sonant crates:
//! sample and frame types, surround buffers, quality profiles, the engine
//! configuration and the pitch reference constants play handles rely on.

mod config;
mod error;
mod params;
mod pitch;
mod quality;
mod sample;

pub use config::*;
pub use error::*;
pub use params::*;
pub use pitch::*;
pub use quality::*;
pub use sample::*;

/// Frames per period used when nothing else is configured
pub const DEFAULT_BUFFER_SIZE: usize = 256;

/// Standard sample rate options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "u32", into = "u32")]
#[repr(u32)]
pub enum SampleRate {
    Hz22050 = 22050,
    Hz44100 = 44100,
    Hz48000 = 48000,
    Hz88200 = 88200,
    Hz96000 = 96000,
    Hz176400 = 176400,
    Hz192000 = 192000,
}

impl SampleRate {
    pub const ALL: [SampleRate; 7] = [
        SampleRate::Hz22050,
        SampleRate::Hz44100,
        SampleRate::Hz48000,
        SampleRate::Hz88200,
        SampleRate::Hz96000,
        SampleRate::Hz176400,
        SampleRate::Hz192000,
    ];

    #[inline]
    pub fn as_f64(self) -> f64 {
        self as u32 as f64
    }

    #[inline]
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// Look up a supported rate by its value in Hz
    pub fn from_hz(hz: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|rate| rate.as_u32() == hz)
    }
}

impl Default for SampleRate {
    fn default() -> Self {
        Self::Hz44100
    }
}

impl TryFrom<u32> for SampleRate {
    type Error = CoreError;

    fn try_from(hz: u32) -> Result<Self, Self::Error> {
        Self::from_hz(hz).ok_or(CoreError::InvalidSampleRate(hz))
    }
}

impl From<SampleRate> for u32 {
    fn from(rate: SampleRate) -> Self {
        rate.as_u32()
    }
}

/// Buffer size options (frames per period)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "u32", into = "u32")]
#[repr(u32)]
pub enum BufferSize {
    Samples32 = 32,
    Samples64 = 64,
    Samples128 = 128,
    Samples256 = 256,
    Samples512 = 512,
    Samples1024 = 1024,
    Samples2048 = 2048,
    Samples4096 = 4096,
}

impl BufferSize {
    pub const ALL: [BufferSize; 8] = [
        BufferSize::Samples32,
        BufferSize::Samples64,
        BufferSize::Samples128,
        BufferSize::Samples256,
        BufferSize::Samples512,
        BufferSize::Samples1024,
        BufferSize::Samples2048,
        BufferSize::Samples4096,
    ];

    #[inline]
    pub fn as_usize(self) -> usize {
        self as u32 as usize
    }

    pub fn from_frames(frames: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|size| *size as u32 == frames)
    }

    /// Calculate latency in milliseconds
    #[inline]
    pub fn latency_ms(self, sample_rate: u32) -> f64 {
        (self.as_usize() as f64 / sample_rate as f64) * 1000.0
    }
}

impl Default for BufferSize {
    fn default() -> Self {
        Self::Samples256
    }
}

impl TryFrom<u32> for BufferSize {
    type Error = CoreError;

    fn try_from(frames: u32) -> Result<Self, Self::Error> {
        Self::from_frames(frames).ok_or(CoreError::InvalidBufferSize(frames))
    }
}

impl From<BufferSize> for u32 {
    fn from(size: BufferSize) -> Self {
        size as u32
    }
}

/// Decibel value wrapper
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Decibels(pub f64);

impl Decibels {
    pub const ZERO: Self = Self(0.0);
    pub const NEG_INF: Self = Self(f64::NEG_INFINITY);

    #[inline]
    pub fn from_gain(gain: f64) -> Self {
        if gain <= 0.0 {
            Self::NEG_INF
        } else {
            Self(20.0 * gain.log10())
        }
    }

    #[inline]
    pub fn to_gain(self) -> f64 {
        if self.0 <= -144.0 {
            0.0
        } else {
            10.0_f64.powf(self.0 / 20.0)
        }
    }
}

impl Default for Decibels {
    fn default() -> Self {
        Self::ZERO
    }
}
