//! Double-buffered capture input
//!
//! The device appends into the write slot; at every period boundary the
//! slots swap, so readers see one stable period's worth of input.

use sonant_core::StereoFrame;

#[derive(Debug)]
pub(crate) struct InputRing {
    slots: [Vec<StereoFrame>; 2],
    counts: [usize; 2],
    read: usize,
    overflowed: bool,
}

impl InputRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: [
                vec![StereoFrame::SILENCE; capacity],
                vec![StereoFrame::SILENCE; capacity],
            ],
            counts: [0, 0],
            read: 0,
            overflowed: false,
        }
    }

    fn write_slot(&self) -> usize {
        self.read ^ 1
    }

    /// Append captured frames; frames beyond capacity are dropped
    pub fn push(&mut self, frames: &[StereoFrame]) -> usize {
        let slot = self.write_slot();
        let start = self.counts[slot];
        let space = self.slots[slot].len() - start;
        let accepted = frames.len().min(space);
        self.slots[slot][start..start + accepted].copy_from_slice(&frames[..accepted]);
        self.counts[slot] += accepted;

        if accepted < frames.len() && !self.overflowed {
            log::warn!("Input buffer full, dropping {} frames", frames.len() - accepted);
            self.overflowed = true;
        }
        accepted
    }

    /// Publish what was captured since the last swap
    pub fn swap(&mut self) {
        self.read = self.write_slot();
        let slot = self.write_slot();
        self.counts[slot] = 0;
        self.overflowed = false;
    }

    pub fn read_frames(&mut self) -> &mut [StereoFrame] {
        let count = self.counts[self.read];
        &mut self.slots[self.read][..count]
    }

    pub fn read_count(&self) -> usize {
        self.counts[self.read]
    }

    #[cfg(test)]
    pub fn capacity(&self) -> usize {
        self.slots[0].len()
    }
}
