//! Counting semaphore used for the worker barrier

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
pub struct Semaphore {
    permits: Mutex<usize>,
    cond: Condvar,
}

impl Semaphore {
    pub fn new(permits: usize) -> Self {
        Self {
            permits: Mutex::new(permits),
            cond: Condvar::new(),
        }
    }

    /// Block until a permit is available and take it
    pub fn acquire(&self) {
        let mut permits = self.permits.lock();
        while *permits == 0 {
            self.cond.wait(&mut permits);
        }
        *permits -= 1;
    }

    pub fn try_acquire(&self) -> bool {
        let mut permits = self.permits.lock();
        if *permits == 0 {
            return false;
        }
        *permits -= 1;
        true
    }

    pub fn release(&self, count: usize) {
        if count == 0 {
            return;
        }
        *self.permits.lock() += count;
        if count == 1 {
            self.cond.notify_one();
        } else {
            self.cond.notify_all();
        }
    }

    pub fn available(&self) -> usize {
        *self.permits.lock()
    }
}
