//! Engine configuration
//!
//! Every field has a default, so a partial JSON document is a valid config.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{BufferSize, CoreError, CoreResult, QualityMode, SampleRate};

/// Runtime settings for a mixer instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Frames rendered per period
    pub frames_per_period: BufferSize,
    /// Rate the project is authored at
    pub base_sample_rate: SampleRate,
    /// Surround channel count of every period buffer
    pub channels: usize,
    /// Number of lookahead buffers (at least 2)
    pub pool_depth: usize,
    /// Pre-render periods on a dedicated writer thread
    pub lookahead: bool,
    /// Spread play handles over a worker pool
    pub multithreaded: bool,
    /// Worker count; `None` means one per logical CPU
    pub num_workers: Option<usize>,
    pub quality: QualityMode,
    pub master_gain: f64,
    /// Consecutive overruns that put the engine in critical state
    pub critical_overrun_count: u32,
    /// Smoothed CPU load (percent) that puts the engine in critical state
    pub critical_cpu_load: f64,
    /// Capacity of the UI notification channel
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            frames_per_period: BufferSize::default(),
            base_sample_rate: SampleRate::default(),
            channels: crate::DEFAULT_SURROUND_CHANNELS,
            pool_depth: 4,
            lookahead: true,
            multithreaded: true,
            num_workers: None,
            quality: QualityMode::Draft,
            master_gain: 1.0,
            critical_overrun_count: 8,
            critical_cpu_load: 99.0,
            event_capacity: 256,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> CoreResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> CoreResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&text)?;
        log::info!("Loaded engine config from {}", path.display());
        Ok(config)
    }

    pub fn to_json_string(&self) -> CoreResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.channels == 0 {
            return Err(CoreError::InvalidConfig("channels must be at least 1".into()));
        }
        if self.pool_depth < 2 {
            return Err(CoreError::InvalidConfig(format!(
                "pool_depth must be at least 2, got {}",
                self.pool_depth
            )));
        }
        if self.num_workers == Some(0) {
            return Err(CoreError::InvalidConfig("num_workers must be at least 1".into()));
        }
        if !self.master_gain.is_finite() || self.master_gain < 0.0 {
            return Err(CoreError::InvalidConfig(format!(
                "master_gain must be a finite non-negative gain, got {}",
                self.master_gain
            )));
        }
        if self.critical_overrun_count == 0 {
            return Err(CoreError::InvalidConfig(
                "critical_overrun_count must be at least 1".into(),
            ));
        }
        if !(0.0..=100.0).contains(&self.critical_cpu_load) {
            return Err(CoreError::InvalidConfig(format!(
                "critical_cpu_load must be within 0..=100, got {}",
                self.critical_cpu_load
            )));
        }
        if self.event_capacity == 0 {
            return Err(CoreError::InvalidConfig("event_capacity must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.frames_per_period.as_usize(), crate::DEFAULT_BUFFER_SIZE);
        assert_eq!(config.base_sample_rate, SampleRate::Hz44100);
        assert_eq!(config.pool_depth, 4);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config =
            EngineConfig::from_json_str(r#"{ "frames_per_period": 128, "lookahead": false }"#)
                .unwrap();
        assert_eq!(config.frames_per_period, BufferSize::Samples128);
        assert!(!config.lookahead);
        assert_eq!(config.channels, 2);
    }

    #[test]
    fn test_rejects_shallow_pool() {
        let err = EngineConfig::from_json_str(r#"{ "pool_depth": 1 }"#).unwrap_err();
        assert!(matches!(err, CoreError::InvalidConfig(_)));
    }

    #[test]
    fn test_rejects_unknown_buffer_size() {
        assert!(EngineConfig::from_json_str(r#"{ "frames_per_period": 100 }"#).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "base_sample_rate": 48000, "quality": "FinalMix" }}"#).unwrap();
        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.base_sample_rate, SampleRate::Hz48000);
        assert_eq!(config.quality, QualityMode::FinalMix);
    }

    #[test]
    fn test_json_round_trip() {
        let config = EngineConfig {
            num_workers: Some(3),
            ..Default::default()
        };
        let json = config.to_json_string().unwrap();
        assert_eq!(EngineConfig::from_json_str(&json).unwrap(), config);
    }
}
