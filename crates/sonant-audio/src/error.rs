//! Audio error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AudioError {
    #[error("No audio device found")]
    NoDevice,

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to get device config: {0}")]
    ConfigError(String),

    #[error("Failed to build stream: {0}")]
    StreamBuildError(String),

    #[error("Failed to start stream: {0}")]
    StreamPlayError(String),

    #[error("Unsupported sample rate: {0}")]
    UnsupportedSampleRate(u32),

    #[error("Backend error: {0}")]
    BackendError(String),

    #[error("Failed to create resampler: {0}")]
    ResamplerConstruction(String),

    #[error("Resampling failed: {0}")]
    Resample(String),

    #[error("Device thread error: {0}")]
    Thread(String),
}

pub type AudioResult<T> = Result<T, AudioError>;
