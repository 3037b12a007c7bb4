//! Render quality profiles
//!
//! A profile bundles the interpolation used when reducing the processing
//! rate to the device rate, the internal oversampling factor and two flags
//! play handles may consult while rendering.

use serde::{Deserialize, Serialize};

use crate::{CoreError, CoreResult};

// ═══════════════════════════════════════════════════════════════════════════════
// COMPONENTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Interpolation used by the output resampler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Interpolation {
    #[default]
    Linear,
    SincFastest,
    SincMedium,
    SincBest,
}

/// Internal oversampling factor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum Oversampling {
    #[default]
    X1,
    X2,
    X4,
    X8,
}

impl Oversampling {
    #[inline]
    pub fn factor(self) -> u32 {
        match self {
            Oversampling::X1 => 1,
            Oversampling::X2 => 2,
            Oversampling::X4 => 4,
            Oversampling::X8 => 8,
        }
    }

    pub fn from_factor(factor: u32) -> CoreResult<Self> {
        match factor {
            1 => Ok(Oversampling::X1),
            2 => Ok(Oversampling::X2),
            4 => Ok(Oversampling::X4),
            8 => Ok(Oversampling::X8),
            other => Err(CoreError::InvalidOversampling(other)),
        }
    }
}

impl TryFrom<u32> for Oversampling {
    type Error = CoreError;

    fn try_from(factor: u32) -> Result<Self, Self::Error> {
        Self::from_factor(factor)
    }
}

impl From<Oversampling> for u32 {
    fn from(oversampling: Oversampling) -> Self {
        oversampling.factor()
    }
}

/// Named presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum QualityMode {
    #[default]
    Draft,
    HighQuality,
    FinalMix,
}

// ═══════════════════════════════════════════════════════════════════════════════
// PROFILE
// ═══════════════════════════════════════════════════════════════════════════════

/// Complete quality setting; any combination of fields is valid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QualityProfile {
    pub interpolation: Interpolation,
    pub oversampling: Oversampling,
    pub sample_exact_controllers: bool,
    pub alias_free_oscillators: bool,
}

impl QualityProfile {
    pub const fn draft() -> Self {
        Self {
            interpolation: Interpolation::Linear,
            oversampling: Oversampling::X1,
            sample_exact_controllers: false,
            alias_free_oscillators: false,
        }
    }

    pub const fn high_quality() -> Self {
        Self {
            interpolation: Interpolation::SincFastest,
            oversampling: Oversampling::X2,
            sample_exact_controllers: true,
            alias_free_oscillators: false,
        }
    }

    pub const fn final_mix() -> Self {
        Self {
            interpolation: Interpolation::SincBest,
            oversampling: Oversampling::X8,
            sample_exact_controllers: true,
            alias_free_oscillators: true,
        }
    }

    pub const fn from_mode(mode: QualityMode) -> Self {
        match mode {
            QualityMode::Draft => Self::draft(),
            QualityMode::HighQuality => Self::high_quality(),
            QualityMode::FinalMix => Self::final_mix(),
        }
    }

    /// Rate at which play handles render for a device running at `output_rate`
    #[inline]
    pub fn processing_sample_rate(&self, output_rate: u32) -> u32 {
        output_rate * self.oversampling.factor()
    }

    /// Concrete resampler settings for this profile's interpolation
    pub fn resampler_params(&self) -> ResamplerParams {
        match self.interpolation {
            Interpolation::Linear => ResamplerParams::Linear,
            Interpolation::SincFastest => ResamplerParams::Sinc {
                sinc_len: 64,
                oversampling_factor: 64,
                f_cutoff: 0.91,
                window: SincWindow::Hann,
            },
            Interpolation::SincMedium => ResamplerParams::Sinc {
                sinc_len: 128,
                oversampling_factor: 128,
                f_cutoff: 0.93,
                window: SincWindow::BlackmanHarris,
            },
            Interpolation::SincBest => ResamplerParams::Sinc {
                sinc_len: 256,
                oversampling_factor: 256,
                f_cutoff: 0.95,
                window: SincWindow::BlackmanHarris2,
            },
        }
    }
}

impl Default for QualityProfile {
    fn default() -> Self {
        Self::draft()
    }
}

impl From<QualityMode> for QualityProfile {
    fn from(mode: QualityMode) -> Self {
        Self::from_mode(mode)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RESAMPLER PARAMETERS
// ═══════════════════════════════════════════════════════════════════════════════

/// Window applied to the sinc kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SincWindow {
    Hann,
    BlackmanHarris,
    BlackmanHarris2,
}

/// Resampler settings independent of any resampling library
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResamplerParams {
    /// Polynomial (linear) interpolation
    Linear,
    /// Windowed sinc with a precomputed, oversampled kernel table
    Sinc {
        sinc_len: usize,
        oversampling_factor: usize,
        f_cutoff: f32,
        window: SincWindow,
    },
}
