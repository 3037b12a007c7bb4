//! Worker pool for rendering play handles in parallel
//!
//! Each period the snapshot is cut into contiguous chunks, one per worker at
//! most. Workers wait on `work_ready`, claim the next chunk, render it into
//! that chunk's scratch and post `work_done`. The render thread waits for one
//! `work_done` per chunk before it reads any scratch, so accumulation never
//! sees a half-written result.
//!
//! With no threads the pool renders everything inline on the caller.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};

use parking_lot::{Mutex, RwLock};
use sonant_audio::thread_priority::{ThreadRole, promote_current_thread};
use sonant_core::StereoFrame;

use crate::play_handle::PlayHandleSlot;
use crate::semaphore::Semaphore;
use crate::{AudioPortId, PeriodContext, PlayHandleId};

/// How a handle's render ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnitStatus {
    Playing,
    Finished,
    /// Panicked; contributes silence and is removed
    Failed,
}

/// One handle's output for the current period
#[derive(Debug)]
pub(crate) struct UnitResult {
    pub id: PlayHandleId,
    pub port: Option<AudioPortId>,
    pub buffer: Vec<StereoFrame>,
    pub frames: usize,
    pub offset: usize,
    pub status: UnitStatus,
}

impl UnitResult {
    fn empty() -> Self {
        Self {
            id: PlayHandleId(0),
            port: None,
            buffer: Vec::new(),
            frames: 0,
            offset: 0,
            status: UnitStatus::Playing,
        }
    }

    #[inline]
    pub fn output(&self) -> &[StereoFrame] {
        &self.buffer[..self.frames]
    }
}

/// Per-chunk render results; buffers are reused across periods
#[derive(Debug, Default)]
pub(crate) struct ChunkScratch {
    results: Vec<UnitResult>,
    len: usize,
    /// Period the results belong to
    #[cfg_attr(not(test), allow(dead_code))]
    period: u64,
}

impl ChunkScratch {
    pub fn results(&self) -> &[UnitResult] {
        &self.results[..self.len]
    }

    #[cfg(test)]
    pub fn period(&self) -> u64 {
        self.period
    }
}

struct Job {
    units: Vec<Arc<PlayHandleSlot>>,
    ctx: PeriodContext,
}

struct PoolShared {
    work_ready: Semaphore,
    work_done: Semaphore,
    job: RwLock<Job>,
    next_chunk: AtomicUsize,
    chunks: AtomicUsize,
    scratch: Box<[Mutex<ChunkScratch>]>,
    shutdown: AtomicBool,
}

pub(crate) struct WorkerPool {
    shared: Arc<PoolShared>,
    threads: Vec<JoinHandle<()>>,
    /// Chunks rendered in the last period
    active_chunks: usize,
}

/// Half-open range of chunk `chunk` when `len` units are split into `chunks`
#[inline]
pub(crate) fn block_range(len: usize, chunks: usize, chunk: usize) -> (usize, usize) {
    (chunk * len / chunks, (chunk + 1) * len / chunks)
}

fn render_unit(slot: &PlayHandleSlot, ctx: &PeriodContext, result: &mut UnitResult) {
    result.id = slot.id;
    result.port = slot.port;
    result.buffer.clear();
    result.buffer.resize(ctx.frames, StereoFrame::SILENCE);

    let outcome = catch_unwind(AssertUnwindSafe(|| {
        let mut handle = slot.handle.lock();
        handle.render(&mut result.buffer, ctx)
    }));

    match outcome {
        Ok(outcome) => {
            result.frames = outcome.frames.min(ctx.frames);
            result.offset = outcome.offset;
            result.status = if outcome.finished {
                UnitStatus::Finished
            } else {
                UnitStatus::Playing
            };
        }
        Err(_) => {
            log::warn!("{} panicked while rendering period {}; removing it", slot.id, ctx.period);
            result.buffer.fill(StereoFrame::SILENCE);
            result.frames = 0;
            result.offset = 0;
            result.status = UnitStatus::Failed;
        }
    }
}

fn render_chunk(units: &[Arc<PlayHandleSlot>], ctx: &PeriodContext, scratch: &mut ChunkScratch) {
    scratch.len = 0;
    scratch.period = ctx.period;
    for slot in units {
        if scratch.results.len() == scratch.len {
            scratch.results.push(UnitResult::empty());
        }
        render_unit(slot, ctx, &mut scratch.results[scratch.len]);
        scratch.len += 1;
    }
}

fn worker_loop(shared: Arc<PoolShared>, index: usize) {
    promote_current_thread(ThreadRole::Worker);
    log::debug!("Worker {} started", index);

    loop {
        shared.work_ready.acquire();
        if shared.shutdown.load(Ordering::Acquire) {
            break;
        }

        let chunks = shared.chunks.load(Ordering::Acquire);
        let chunk = shared.next_chunk.fetch_add(1, Ordering::AcqRel);
        if chunk < chunks {
            let job = shared.job.read();
            let (start, end) = block_range(job.units.len(), chunks, chunk);
            let mut scratch = shared.scratch[chunk].lock();
            render_chunk(&job.units[start..end], &job.ctx, &mut scratch);
        }

        shared.work_done.release(1);
    }

    log::debug!("Worker {} exiting", index);
}

impl WorkerPool {
    /// Spawn `workers` threads; zero gives an inline pool
    ///
    /// Threads that fail to spawn are logged and skipped, so the pool may
    /// end up smaller (or inline) rather than failing.
    pub fn new(workers: usize) -> Self {
        let scratch: Vec<Mutex<ChunkScratch>> =
            (0..workers.max(1)).map(|_| Mutex::new(ChunkScratch::default())).collect();
        let shared = Arc::new(PoolShared {
            work_ready: Semaphore::new(0),
            work_done: Semaphore::new(0),
            job: RwLock::new(Job {
                units: Vec::new(),
                ctx: PeriodContext::default(),
            }),
            next_chunk: AtomicUsize::new(0),
            chunks: AtomicUsize::new(0),
            scratch: scratch.into_boxed_slice(),
            shutdown: AtomicBool::new(false),
        });

        let mut threads = Vec::with_capacity(workers);
        for index in 0..workers {
            let worker_shared = Arc::clone(&shared);
            match thread::Builder::new()
                .name(format!("sonant-worker-{}", index))
                .spawn(move || worker_loop(worker_shared, index))
            {
                Ok(handle) => threads.push(handle),
                Err(e) => {
                    log::error!("Failed to spawn worker {}: {}", index, e);
                    break;
                }
            }
        }

        if workers > 0 {
            log::info!("Worker pool running with {} threads", threads.len());
        }

        Self {
            shared,
            threads,
            active_chunks: 0,
        }
    }

    /// Single-threaded pool
    pub fn inline() -> Self {
        Self::new(0)
    }

    pub fn worker_count(&self) -> usize {
        self.threads.len()
    }

    #[cfg(test)]
    pub fn is_threaded(&self) -> bool {
        !self.threads.is_empty()
    }

    /// Render every unit for one period and wait until all are done
    ///
    /// `units` is lent to the workers for the duration of the call and
    /// handed back unchanged.
    pub fn run(&mut self, units: &mut Vec<Arc<PlayHandleSlot>>, ctx: &PeriodContext) {
        if units.is_empty() {
            self.active_chunks = 0;
            return;
        }

        if self.threads.is_empty() {
            let mut scratch = self.shared.scratch[0].lock();
            render_chunk(units, ctx, &mut scratch);
            self.active_chunks = 1;
            return;
        }

        let chunks = self.threads.len().min(units.len());
        {
            let mut job = self.shared.job.write();
            std::mem::swap(&mut job.units, units);
            job.ctx = *ctx;
        }
        self.shared.next_chunk.store(0, Ordering::Release);
        self.shared.chunks.store(chunks, Ordering::Release);

        self.shared.work_ready.release(chunks);
        for _ in 0..chunks {
            self.shared.work_done.acquire();
        }

        std::mem::swap(&mut self.shared.job.write().units, units);
        self.active_chunks = chunks;
    }

    /// Visit the results of the last `run`, in snapshot order
    pub fn for_each_result(&self, mut f: impl FnMut(&UnitResult)) {
        for scratch in &self.shared.scratch[..self.active_chunks] {
            let scratch = scratch.lock();
            for result in scratch.results() {
                f(result);
            }
        }
    }

    /// Period stamps of the chunks used by the last `run`
    #[cfg(test)]
    pub fn chunk_periods(&self) -> Vec<u64> {
        self.shared.scratch[..self.active_chunks]
            .iter()
            .map(|scratch| scratch.lock().period())
            .collect()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.work_ready.release(self.threads.len());
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
    }
}
