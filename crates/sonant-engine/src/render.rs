//! Period render core
//!
//! One call renders one period: every handle in the snapshot renders into
//! private scratch on the worker pool, the results are deposited into their
//! ports at their frame offsets, ports are summed into master, master gain
//! is applied and the result is hard-clipped into the period buffer.

use std::sync::Arc;

use sonant_core::{
    StereoFrame, StereoVolumeVector, SurroundBuffer, clear_audio_buffer, clip, peak_value_left,
    peak_value_right,
};

use crate::play_handle::PlayHandleSlot;
use crate::registry::Registry;
use crate::worker_pool::{UnitStatus, WorkerPool};
use crate::{AudioPort, PeriodContext, PlayHandleId};

/// Add `source` into `port_buffer` starting at frame `offset`, scaled by `volume`
///
/// Frames that would land past the end of the port buffer are dropped.
pub fn buffer_to_port(
    source: &[StereoFrame],
    offset: usize,
    volume: StereoVolumeVector,
    port_buffer: &mut [StereoFrame],
) {
    for (dst, src) in port_buffer.iter_mut().skip(offset).zip(source) {
        *dst += src.scaled(volume);
    }
}

/// Peaks of one rendered period
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub(crate) struct PeriodPeaks {
    pub left: f64,
    pub right: f64,
}

pub(crate) struct RenderCore {
    frames: usize,
    snapshot: Vec<Arc<PlayHandleSlot>>,
    ports: Vec<Arc<AudioPort>>,
    port_mix: Vec<Vec<StereoFrame>>,
    master: Vec<StereoFrame>,
    finished: Vec<PlayHandleId>,
    workers: WorkerPool,
    period: u64,
}

impl RenderCore {
    pub fn new(frames: usize, workers: WorkerPool) -> Self {
        Self {
            frames,
            snapshot: Vec::new(),
            ports: Vec::new(),
            port_mix: Vec::new(),
            master: vec![StereoFrame::SILENCE; frames],
            finished: Vec::new(),
            workers,
            period: 0,
        }
    }

    /// Number of the period about to be rendered
    pub fn period(&self) -> u64 {
        self.period
    }

    pub fn worker_count(&self) -> usize {
        self.workers.worker_count()
    }

    /// Take the period snapshot; called with the global lock held
    pub fn begin_period(&mut self, registry: &mut Registry, ports: &[Arc<AudioPort>]) {
        registry.begin_period(&mut self.snapshot);
        self.ports.clear();
        self.ports.extend(ports.iter().cloned());
        let frames = self.frames;
        if self.port_mix.len() < self.ports.len() {
            self.port_mix
                .resize_with(self.ports.len(), || vec![StereoFrame::SILENCE; frames]);
        }
    }

    /// Render the snapshot into `out`; returns the peaks of the clipped mix
    pub fn mix(&mut self, ctx: &PeriodContext, master_gain: f64, out: &mut SurroundBuffer) -> PeriodPeaks {
        let frames = self.frames;
        clear_audio_buffer(&mut self.master, frames, 0);
        for mix in &mut self.port_mix[..self.ports.len()] {
            clear_audio_buffer(mix, frames, 0);
        }
        self.finished.clear();

        self.workers.run(&mut self.snapshot, ctx);

        let ports = &self.ports;
        let port_mix = &mut self.port_mix;
        let master = &mut self.master;
        let finished = &mut self.finished;
        self.workers.for_each_result(|result| {
            if result.status != UnitStatus::Playing {
                finished.push(result.id);
            }
            if result.frames == 0 {
                return;
            }
            match result.port {
                None => buffer_to_port(result.output(), result.offset, StereoVolumeVector::UNITY, master),
                Some(port_id) => {
                    // Handles routed to a port that is gone stay silent
                    if let Some(index) = ports.iter().position(|p| p.id() == port_id) {
                        let volume = ports[index].volume();
                        buffer_to_port(result.output(), result.offset, volume, &mut port_mix[index]);
                    }
                }
            }
        });

        for mix in &self.port_mix[..self.ports.len()] {
            for (dst, src) in self.master.iter_mut().zip(mix) {
                *dst += *src;
            }
        }

        for frame in &mut self.master {
            frame.left = clip(frame.left * master_gain);
            frame.right = clip(frame.right * master_gain);
        }

        if out.frames() != frames {
            *out = SurroundBuffer::new(frames, out.channels());
        }
        out.fill_from_stereo(&self.master);

        PeriodPeaks {
            left: peak_value_left(&self.master),
            right: peak_value_right(&self.master),
        }
    }

    /// Handles that finished or failed in the period just mixed
    pub fn finished(&self) -> &[PlayHandleId] {
        &self.finished
    }

    /// Release the snapshot so removed handles can be handed back
    pub fn end_period(&mut self) {
        self.snapshot.clear();
        self.ports.clear();
        self.period += 1;
    }

    /// Master mix of the last period
    pub fn master(&self) -> &[StereoFrame] {
        &self.master
    }
}
