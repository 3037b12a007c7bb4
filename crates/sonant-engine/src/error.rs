//! Mixer error types

use sonant_audio::AudioError;
use sonant_core::CoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MixerError {
    #[error("Audio device error: {0}")]
    Audio(#[from] AudioError),

    #[error("Configuration error: {0}")]
    Core(#[from] CoreError),

    #[error("Failed to spawn {0} thread: {1}")]
    WorkerSpawn(&'static str, String),

    #[error("Processing already running")]
    AlreadyRunning,

    #[error("No previous audio device to restore")]
    NoPreviousDevice,
}

pub type MixerResult<T> = Result<T, MixerError>;
