//! Notifications for the UI thread

use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use sonant_core::QualityProfile;

#[derive(Debug, Clone, PartialEq)]
pub enum MixerEvent {
    QualitySettingsChanged(QualityProfile),
    SampleRateChanged { output: u32, processing: u32 },
    /// A period finished rendering
    NextAudioBuffer {
        period: u64,
        peak_left: f64,
        peak_right: f64,
    },
}

/// Bounded event channel; senders never block
pub(crate) struct EventBus {
    tx: Sender<MixerEvent>,
    rx: Receiver<MixerEvent>,
    saturated: AtomicBool,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity.max(1));
        Self {
            tx,
            rx,
            saturated: AtomicBool::new(false),
        }
    }

    pub fn emit(&self, event: MixerEvent) {
        match self.tx.try_send(event) {
            Ok(()) => self.saturated.store(false, Ordering::Relaxed),
            Err(TrySendError::Full(event)) => {
                if !self.saturated.swap(true, Ordering::Relaxed) {
                    log::warn!("Mixer event queue full, dropping {:?} and later events", event);
                }
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    pub fn receiver(&self) -> Receiver<MixerEvent> {
        self.rx.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_queue_drops_instead_of_blocking() {
        let bus = EventBus::new(2);
        for period in 0..5 {
            bus.emit(MixerEvent::NextAudioBuffer {
                period,
                peak_left: 0.0,
                peak_right: 0.0,
            });
        }
        let events: Vec<_> = bus.receiver().try_iter().collect();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], MixerEvent::NextAudioBuffer { period: 0, .. }));
    }
}
