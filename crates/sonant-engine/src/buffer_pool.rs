//! Lookahead buffer pool
//!
//! A fixed ring of period buffers shared by one writer (the lookahead
//! thread) and one consumer (the device). Committed buffers are delivered
//! strictly in commit order. The writer never starts on the slot the
//! consumer holds, and waits while every slot is full.

use parking_lot::{Condvar, Mutex, MutexGuard};
use sonant_core::SurroundBuffer;

/// Slot roles at one observation point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolIndices {
    /// Slot being rendered into
    pub write: Option<usize>,
    /// Slot last handed to the consumer
    pub read: Option<usize>,
    /// Most recently completed slot
    pub analysis: Option<usize>,
    /// Committed, undelivered buffers
    pub ready: usize,
}

/// What the consumer should do for its next period
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Copy this slot
    Ready(usize),
    /// Nothing queued and the writer is idle: render synchronously, then
    /// call [`BufferPool::end_direct`]
    Direct,
}

#[derive(Debug)]
struct PoolState {
    head: usize,
    ready: usize,
    writing: Option<usize>,
    read: Option<usize>,
    analysis: Option<usize>,
    /// Consumer is rendering synchronously; the writer must not start
    direct: bool,
    finished: bool,
}

impl PoolState {
    fn new() -> Self {
        Self {
            head: 0,
            ready: 0,
            writing: None,
            read: None,
            analysis: None,
            direct: false,
            finished: false,
        }
    }
}

pub struct BufferPool {
    slots: Box<[Mutex<SurroundBuffer>]>,
    state: Mutex<PoolState>,
    cond: Condvar,
}

impl BufferPool {
    /// `depth` is raised to 2 when smaller
    pub fn new(depth: usize, frames: usize, channels: usize) -> Self {
        let slots: Vec<_> = (0..depth.max(2))
            .map(|_| Mutex::new(SurroundBuffer::new(frames, channels)))
            .collect();
        Self {
            slots: slots.into_boxed_slice(),
            state: Mutex::new(PoolState::new()),
            cond: Condvar::new(),
        }
    }

    pub fn depth(&self) -> usize {
        self.slots.len()
    }

    fn write_index(&self, state: &PoolState) -> usize {
        (state.head + state.ready) % self.depth()
    }

    /// Wait for a free slot and claim it; `None` once the pool is finished
    pub fn begin_write(&self) -> Option<usize> {
        let mut state = self.state.lock();
        loop {
            if state.finished {
                return None;
            }
            let index = self.write_index(&state);
            let full = state.ready == self.depth();
            if !full && !state.direct && state.read != Some(index) {
                state.writing = Some(index);
                return Some(index);
            }
            self.cond.wait(&mut state);
        }
    }

    /// Queue a completed render
    pub fn commit_write(&self, index: usize) {
        let mut state = self.state.lock();
        debug_assert_eq!(state.writing, Some(index));
        state.writing = None;
        state.ready += 1;
        state.analysis = Some(index);
        self.cond.notify_all();
    }

    /// Drop a render without queueing it
    pub fn abandon_write(&self, index: usize) {
        let mut state = self.state.lock();
        debug_assert_eq!(state.writing, Some(index));
        state.writing = None;
        self.cond.notify_all();
    }

    /// Next period for the consumer
    ///
    /// Waits while the pool is empty but a render is in flight, so a
    /// synchronous render can never overtake a queued one.
    pub fn next_delivery(&self) -> Delivery {
        let mut state = self.state.lock();
        loop {
            if state.ready > 0 {
                let index = state.head;
                state.head = (state.head + 1) % self.depth();
                state.ready -= 1;
                state.read = Some(index);
                self.cond.notify_all();
                return Delivery::Ready(index);
            }
            if state.writing.is_none() || state.finished {
                state.read = None;
                state.direct = true;
                return Delivery::Direct;
            }
            self.cond.wait(&mut state);
        }
    }

    /// Finish a synchronous render claimed through [`Delivery::Direct`]
    pub fn end_direct(&self) {
        let mut state = self.state.lock();
        state.direct = false;
        self.cond.notify_all();
    }

    pub fn slot(&self, index: usize) -> MutexGuard<'_, SurroundBuffer> {
        self.slots[index].lock()
    }

    /// Copy of the most recently completed buffer, for visualisation
    pub fn analysis_buffer(&self) -> Option<SurroundBuffer> {
        let index = self.state.lock().analysis?;
        Some(self.slots[index].lock().clone())
    }

    pub fn indices(&self) -> PoolIndices {
        let state = self.state.lock();
        PoolIndices {
            write: state.writing,
            read: state.read,
            analysis: state.analysis,
            ready: state.ready,
        }
    }

    pub fn ready_count(&self) -> usize {
        self.state.lock().ready
    }

    /// Make the writer exit; wakes every waiter
    pub fn finish(&self) {
        let mut state = self.state.lock();
        state.finished = true;
        self.cond.notify_all();
    }

    pub fn is_finished(&self) -> bool {
        self.state.lock().finished
    }

    /// Forget queued buffers and accept a new writer
    pub fn reset(&self) {
        let mut state = self.state.lock();
        *state = PoolState::new();
        self.cond.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn write_value(pool: &BufferPool, index: usize, value: f64) {
        pool.slot(index).samples_mut().fill(value);
    }

    #[test]
    fn test_fifo_order() {
        let pool = BufferPool::new(4, 8, 2);
        for value in 1..=3 {
            let index = pool.begin_write().unwrap();
            write_value(&pool, index, value as f64);
            pool.commit_write(index);
        }

        for value in 1..=3 {
            match pool.next_delivery() {
                Delivery::Ready(index) => assert_eq!(pool.slot(index).samples()[0], value as f64),
                Delivery::Direct => panic!("expected a queued buffer"),
            }
        }
        assert_eq!(pool.next_delivery(), Delivery::Direct);
        pool.end_direct();
    }

    #[test]
    fn test_minimum_depth() {
        assert_eq!(BufferPool::new(0, 8, 2).depth(), 2);
        assert_eq!(BufferPool::new(1, 8, 2).depth(), 2);
    }

    #[test]
    fn test_abandoned_write_is_not_delivered() {
        let pool = BufferPool::new(2, 8, 2);
        let index = pool.begin_write().unwrap();
        pool.abandon_write(index);
        assert_eq!(pool.ready_count(), 0);
        assert_eq!(pool.indices().analysis, None);
        assert_eq!(pool.next_delivery(), Delivery::Direct);
    }

    #[test]
    fn test_writer_never_takes_the_read_slot() {
        let pool = BufferPool::new(2, 8, 2);
        let first = pool.begin_write().unwrap();
        pool.commit_write(first);
        let second = pool.begin_write().unwrap();
        pool.commit_write(second);

        let read = match pool.next_delivery() {
            Delivery::Ready(index) => index,
            Delivery::Direct => panic!("expected a queued buffer"),
        };
        assert_eq!(read, first);

        // The only free slot is the one being read: the writer must wait
        let pool = Arc::new(pool);
        let writer_pool = Arc::clone(&pool);
        let writer = thread::spawn(move || writer_pool.begin_write());
        thread::sleep(Duration::from_millis(30));
        let indices = pool.indices();
        assert_eq!(indices.write, None);
        assert_eq!(indices.read, Some(first));

        // Taking the next buffer releases the old read slot
        assert_eq!(pool.next_delivery(), Delivery::Ready(second));
        let claimed = writer.join().unwrap();
        assert_eq!(claimed, Some(first));
        let indices = pool.indices();
        assert_ne!(indices.write, indices.read);
    }

    #[test]
    fn test_finish_wakes_blocked_writer() {
        let pool = Arc::new(BufferPool::new(2, 8, 2));
        for _ in 0..2 {
            let index = pool.begin_write().unwrap();
            pool.commit_write(index);
        }
        let writer_pool = Arc::clone(&pool);
        let writer = thread::spawn(move || writer_pool.begin_write());
        thread::sleep(Duration::from_millis(20));
        pool.finish();
        assert_eq!(writer.join().unwrap(), None);
    }

    #[test]
    fn test_consumer_waits_for_render_in_flight() {
        let pool = Arc::new(BufferPool::new(3, 8, 2));
        let index = pool.begin_write().unwrap();

        let consumer_pool = Arc::clone(&pool);
        let consumer = thread::spawn(move || consumer_pool.next_delivery());
        thread::sleep(Duration::from_millis(20));
        write_value(&pool, index, 7.0);
        pool.commit_write(index);

        assert_eq!(consumer.join().unwrap(), Delivery::Ready(index));
    }

    #[test]
    fn test_direct_render_blocks_writer() {
        let pool = Arc::new(BufferPool::new(2, 8, 2));
        assert_eq!(pool.next_delivery(), Delivery::Direct);

        let writer_pool = Arc::clone(&pool);
        let writer = thread::spawn(move || writer_pool.begin_write());
        thread::sleep(Duration::from_millis(20));
        assert_eq!(pool.indices().write, None);

        pool.end_direct();
        assert!(writer.join().unwrap().is_some());
    }
}
