//! Lock-free parameter cells shared between control and audio threads

use std::sync::atomic::{AtomicU64, Ordering};

use crate::StereoVolumeVector;

/// `f64` stored as bits in an `AtomicU64`
///
/// Relaxed ordering throughout: values are independent telemetry or gain
/// parameters and never used to publish other memory.
#[derive(Debug)]
pub struct AtomicF64 {
    bits: AtomicU64,
}

impl AtomicF64 {
    pub fn new(value: f64) -> Self {
        Self {
            bits: AtomicU64::new(value.to_bits()),
        }
    }

    #[inline]
    pub fn get(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn set(&self, value: f64) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }

    /// Exponential smoothing towards `target`: `current + (target - current) * smoothing`
    #[inline]
    pub fn smooth_set(&self, target: f64, smoothing: f64) -> f64 {
        let current = self.get();
        let new_value = current + (target - current) * smoothing;
        self.set(new_value);
        new_value
    }
}

impl Default for AtomicF64 {
    fn default() -> Self {
        Self::new(0.0)
    }
}

/// Independent left/right gain pair that can be changed while rendering
#[derive(Debug, Default)]
pub struct AtomicStereoVolume {
    left: AtomicF64,
    right: AtomicF64,
}

impl AtomicStereoVolume {
    pub fn new(volume: StereoVolumeVector) -> Self {
        Self {
            left: AtomicF64::new(volume.left),
            right: AtomicF64::new(volume.right),
        }
    }

    #[inline]
    pub fn get(&self) -> StereoVolumeVector {
        StereoVolumeVector {
            left: self.left.get(),
            right: self.right.get(),
        }
    }

    #[inline]
    pub fn set(&self, volume: StereoVolumeVector) {
        self.left.set(volume.left);
        self.right.set(volume.right);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_atomic_f64() {
        let value = AtomicF64::new(0.25);
        assert_eq!(value.get(), 0.25);
        value.set(-1.5);
        assert_eq!(value.get(), -1.5);
    }

    #[test]
    fn test_smooth_set_moves_towards_target() {
        let value = AtomicF64::new(0.0);
        let next = value.smooth_set(100.0, 0.1);
        assert_relative_eq!(next, 10.0, epsilon = 1e-12);
        let next = value.smooth_set(100.0, 0.1);
        assert_relative_eq!(next, 19.0, epsilon = 1e-12);
    }

    #[test]
    fn test_stereo_volume() {
        let volume = AtomicStereoVolume::new(StereoVolumeVector::new(0.5, 0.75));
        assert_eq!(volume.get(), StereoVolumeVector::new(0.5, 0.75));
        volume.set(StereoVolumeVector::UNITY);
        assert_eq!(volume.get(), StereoVolumeVector::UNITY);
    }
}
