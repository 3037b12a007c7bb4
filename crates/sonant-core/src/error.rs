//! Error types for Sonant core

use thiserror::Error;

/// Core error type
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Invalid sample rate: {0}")]
    InvalidSampleRate(u32),

    #[error("Invalid buffer size: {0}")]
    InvalidBufferSize(u32),

    #[error("Invalid oversampling factor: {0} (expected 1, 2, 4 or 8)")]
    InvalidOversampling(u32),
}

/// Result type alias
pub type CoreResult<T> = Result<T, CoreError>;
