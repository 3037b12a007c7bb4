//! Lock-free telemetry shared with the UI

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use sonant_core::AtomicF64;

/// Weight of the newest measurement in the smoothed CPU load
const CPU_LOAD_SMOOTHING: f64 = 0.1;

#[derive(Debug, Default)]
pub struct MixerMeters {
    peak_left: AtomicF64,
    peak_right: AtomicF64,
    cpu_load: AtomicF64,
    periods: AtomicU64,
    overruns: AtomicU64,
    consecutive_overruns: AtomicU32,
    /// An overrun was recorded since the device last pulled a period
    overrun_since_pull: AtomicBool,
}

impl MixerMeters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one finished period into the meters; `raw_load` is in percent
    pub fn record_period(&self, peak_left: f64, peak_right: f64, raw_load: f64) {
        self.peak_left.set(self.peak_left.get().max(peak_left));
        self.peak_right.set(self.peak_right.get().max(peak_right));
        let smoothed = self.cpu_load.smooth_set(raw_load, CPU_LOAD_SMOOTHING);
        self.cpu_load.set(smoothed.clamp(0.0, 100.0));
        self.periods.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the new consecutive count
    pub fn record_overrun(&self) -> u32 {
        self.overrun_since_pull.store(true, Ordering::Relaxed);
        self.overruns.fetch_add(1, Ordering::Relaxed);
        self.consecutive_overruns.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// The device is pulling its next period
    ///
    /// Closes the device period that just ended: if no overrun was recorded
    /// during it, the streak of consecutive overruns is over. Periods the
    /// lookahead writer renders ahead of time never end a streak.
    pub fn record_pull(&self) {
        if !self.overrun_since_pull.swap(false, Ordering::Relaxed) {
            self.consecutive_overruns.store(0, Ordering::Relaxed);
        }
    }

    /// Highest left peak since the last [`take_peaks`](Self::take_peaks)
    pub fn peak_left(&self) -> f64 {
        self.peak_left.get()
    }

    pub fn peak_right(&self) -> f64 {
        self.peak_right.get()
    }

    /// Read and reset the held peaks
    pub fn take_peaks(&self) -> (f64, f64) {
        let peaks = (self.peak_left.get(), self.peak_right.get());
        self.peak_left.set(0.0);
        self.peak_right.set(0.0);
        peaks
    }

    /// Smoothed render load in percent of the period budget
    pub fn cpu_load(&self) -> f64 {
        self.cpu_load.get()
    }

    pub fn periods(&self) -> u64 {
        self.periods.load(Ordering::Relaxed)
    }

    pub fn overruns(&self) -> u64 {
        self.overruns.load(Ordering::Relaxed)
    }

    pub fn consecutive_overruns(&self) -> u32 {
        self.consecutive_overruns.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.take_peaks();
        self.cpu_load.set(0.0);
        self.consecutive_overruns.store(0, Ordering::Relaxed);
        self.overrun_since_pull.store(false, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_cpu_load_smoothing_and_clamp() {
        let meters = MixerMeters::new();
        meters.record_period(0.0, 0.0, 50.0);
        assert_relative_eq!(meters.cpu_load(), 5.0);
        meters.record_period(0.0, 0.0, 50.0);
        assert_relative_eq!(meters.cpu_load(), 9.5);

        for _ in 0..200 {
            meters.record_period(0.0, 0.0, 400.0);
        }
        assert_eq!(meters.cpu_load(), 100.0);
    }

    #[test]
    fn test_peaks_are_held_until_taken() {
        let meters = MixerMeters::new();
        meters.record_period(0.4, 0.2, 0.0);
        meters.record_period(0.1, 0.6, 0.0);
        assert_eq!(meters.peak_left(), 0.4);
        assert_eq!(meters.take_peaks(), (0.4, 0.6));
        assert_eq!(meters.peak_right(), 0.0);
    }

    #[test]
    fn test_consecutive_overruns() {
        let meters = MixerMeters::new();
        assert_eq!(meters.record_overrun(), 1);
        assert_eq!(meters.record_overrun(), 2);

        // The pull right after the overruns closes a late period
        meters.record_pull();
        assert_eq!(meters.consecutive_overruns(), 2);

        meters.record_pull();
        assert_eq!(meters.consecutive_overruns(), 0);
        assert_eq!(meters.overruns(), 2);
    }
}
