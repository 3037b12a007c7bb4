//! Play-handle registry
//!
//! Mutations arrive from the control thread at any time but only take
//! effect at a period boundary: additions join the next snapshot, removals
//! (explicit or finish-triggered) are drained when the next period begins.

use std::sync::Arc;

use crate::play_handle::PlayHandleSlot;
use crate::{PlayHandle, PlayHandleId, TrackId};

/// Explicitly removed handles kept for `take_removed`; the oldest are
/// dropped beyond this
pub(crate) const RETIRED_LIMIT: usize = 256;

#[derive(Debug, Default)]
pub(crate) struct Registry {
    active: Vec<Arc<PlayHandleSlot>>,
    /// Explicitly removed; handed back through `take_removed`
    pending_removal: Vec<PlayHandleId>,
    /// Reported finished (or failed); destroyed at the boundary
    pending_finish: Vec<PlayHandleId>,
    retired: Vec<Arc<PlayHandleSlot>>,
    next_id: u64,
}

impl Registry {
    pub fn add(&mut self, handle: Box<dyn PlayHandle>) -> PlayHandleId {
        self.next_id += 1;
        let id = PlayHandleId(self.next_id);
        self.active.push(Arc::new(PlayHandleSlot::new(id, handle)));
        id
    }

    fn is_scheduled(&self, id: PlayHandleId) -> bool {
        self.pending_removal.contains(&id) || self.pending_finish.contains(&id)
    }

    /// Schedule removal at the next boundary; `false` for unknown ids
    pub fn remove(&mut self, id: PlayHandleId) -> bool {
        if !self.active.iter().any(|slot| slot.id == id) {
            return false;
        }
        if !self.pending_removal.contains(&id) {
            self.pending_removal.push(id);
        }
        true
    }

    /// Schedule removal of every handle owned by `track`
    pub fn remove_for_track(&mut self, track: TrackId) -> usize {
        let ids: Vec<PlayHandleId> = self
            .active
            .iter()
            .filter(|slot| slot.track == Some(track) && !self.pending_removal.contains(&slot.id))
            .map(|slot| slot.id)
            .collect();
        self.pending_removal.extend_from_slice(&ids);
        ids.len()
    }

    /// Schedule removal of everything
    pub fn clear(&mut self) -> usize {
        let ids: Vec<PlayHandleId> = self
            .active
            .iter()
            .map(|slot| slot.id)
            .filter(|id| !self.pending_removal.contains(id))
            .collect();
        self.pending_removal.extend_from_slice(&ids);
        ids.len()
    }

    pub fn schedule_finished(&mut self, ids: &[PlayHandleId]) {
        for &id in ids {
            if !self.pending_finish.contains(&id) {
                self.pending_finish.push(id);
            }
        }
    }

    /// Drain scheduled removals and publish the snapshot for the new period
    pub fn begin_period(&mut self, snapshot: &mut Vec<Arc<PlayHandleSlot>>) {
        if !self.pending_removal.is_empty() || !self.pending_finish.is_empty() {
            let mut index = 0;
            while index < self.active.len() {
                let id = self.active[index].id;
                if self.pending_removal.contains(&id) {
                    // Explicit removal wins over finishing: the caller asked for it back
                    let slot = self.active.remove(index);
                    self.retired.push(slot);
                } else if self.pending_finish.contains(&id) {
                    self.active.remove(index);
                } else {
                    index += 1;
                }
            }
            self.pending_removal.clear();
            self.pending_finish.clear();

            if self.retired.len() > RETIRED_LIMIT {
                let excess = self.retired.len() - RETIRED_LIMIT;
                log::warn!(
                    "{} removed play handles were never taken back; dropping the oldest {}",
                    self.retired.len(),
                    excess
                );
                self.retired.drain(..excess);
            }
        }

        snapshot.clear();
        snapshot.extend(self.active.iter().cloned());
    }

    /// Explicitly removed handles that are no longer referenced by a period
    pub fn take_removed(&mut self) -> Vec<(PlayHandleId, Box<dyn PlayHandle>)> {
        let mut taken = Vec::new();
        let mut still_shared = Vec::new();
        for slot in self.retired.drain(..) {
            match Arc::try_unwrap(slot) {
                Ok(slot) => taken.push((slot.id, slot.handle.into_inner())),
                Err(slot) => still_shared.push(slot),
            }
        }
        self.retired = still_shared;
        taken
    }

    /// Empty the registry, returning every slot it held
    pub fn drain(&mut self) -> Vec<Arc<PlayHandleSlot>> {
        self.pending_removal.clear();
        self.pending_finish.clear();
        let mut slots = std::mem::take(&mut self.active);
        slots.append(&mut self.retired);
        slots
    }

    /// Handles that will take part in the next period
    pub fn len(&self) -> usize {
        self.active
            .iter()
            .filter(|slot| !self.is_scheduled(slot.id))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: PlayHandleId) -> bool {
        self.active.iter().any(|slot| slot.id == id) && !self.is_scheduled(id)
    }
}
