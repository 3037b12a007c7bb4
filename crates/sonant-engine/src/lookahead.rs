//! Lookahead writer thread
//!
//! Renders periods ahead of the device into the buffer pool. The thread
//! blocks while the pool is full and exits once the pool is finished; a
//! render interrupted by `finish` is abandoned, never committed.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use sonant_audio::thread_priority::{ThreadRole, promote_current_thread};

use crate::mixer::MixerCore;
use crate::{MixerError, MixerResult};

pub(crate) struct LookaheadWriter {
    core: Arc<MixerCore>,
    handle: Option<JoinHandle<()>>,
}

fn writer_loop(core: Arc<MixerCore>) {
    promote_current_thread(ThreadRole::LookaheadWriter);
    log::debug!("Lookahead writer started");

    let pool = core.pool();
    while let Some(index) = pool.begin_write() {
        {
            let mut slot = pool.slot(index);
            core.render_into(&mut slot);
        }
        if pool.is_finished() {
            pool.abandon_write(index);
        } else {
            pool.commit_write(index);
        }
    }

    log::debug!("Lookahead writer exiting");
}

impl LookaheadWriter {
    /// Reset the pool and start filling it
    pub fn spawn(core: Arc<MixerCore>) -> MixerResult<Self> {
        core.pool().reset();
        let thread_core = Arc::clone(&core);
        let handle = thread::Builder::new()
            .name("sonant-lookahead".into())
            .spawn(move || writer_loop(thread_core))
            .map_err(|e| MixerError::WorkerSpawn("lookahead", e.to_string()))?;
        Ok(Self {
            core,
            handle: Some(handle),
        })
    }

    /// Finish the pool and wait for the thread
    pub fn stop(&mut self) {
        self.core.pool().finish();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for LookaheadWriter {
    fn drop(&mut self) {
        self.stop();
    }
}
