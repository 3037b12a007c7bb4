//! Named mix destinations for play handles

use std::fmt;

use sonant_core::{AtomicStereoVolume, StereoVolumeVector};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AudioPortId(pub u64);

impl fmt::Display for AudioPortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "port#{}", self.0)
    }
}

/// A port sums every handle routed to it, scaled by its stereo volume
///
/// Shared as `Arc<AudioPort>`; the volume may be changed from any thread
/// and is picked up by the next period.
#[derive(Debug)]
pub struct AudioPort {
    id: AudioPortId,
    name: String,
    volume: AtomicStereoVolume,
}

impl AudioPort {
    pub(crate) fn new(id: AudioPortId, name: String) -> Self {
        Self {
            id,
            name,
            volume: AtomicStereoVolume::new(StereoVolumeVector::UNITY),
        }
    }

    pub fn id(&self) -> AudioPortId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn volume(&self) -> StereoVolumeVector {
        self.volume.get()
    }

    pub fn set_volume(&self, volume: StereoVolumeVector) {
        self.volume.set(volume);
    }
}
