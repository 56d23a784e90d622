//! Per-Happen frame-time accounting.
//!
//! Every lifecycle dispatch a Happen performs is cheap individually but runs
//! every tick, so the profiling here is deliberately coarse and bounded:
//!
//! - Each tick's elapsed wall time goes into a fixed-capacity *window*.
//! - When the window fills, its mean is pushed into a bounded rolling
//!   *history* (oldest reading evicted first) and the window clears.
//!
//! This yields a smoothed signal over the last `HISTORY_CAP` windows without
//! retaining unbounded history. Collection is always-on; reporting
//! ([`PerfReport`]) is on demand.

use std::collections::VecDeque;
use std::time::Duration;

/// Window size for core-update sampling (ticks per averaged reading).
pub const CORE_WINDOW: usize = 200;
/// Window size for realized-update sampling.
pub const REALIZED_WINDOW: usize = 400;
/// Number of averaged readings retained.
pub const HISTORY_CAP: usize = 12;

/// Fixed-window sampler with a bounded rolling history of window means.
#[derive(Debug, Clone)]
pub struct FrameSampler {
    window_cap: usize,
    window: Vec<Duration>,
    history: VecDeque<f64>,
}

impl FrameSampler {
    pub fn new(window_cap: usize) -> Self {
        FrameSampler {
            window_cap,
            window: Vec::with_capacity(window_cap),
            history: VecDeque::with_capacity(HISTORY_CAP),
        }
    }

    /// Records one tick's elapsed time. On the tick that fills the window,
    /// folds the window into the history and clears it.
    pub fn record(&mut self, frame: Duration) {
        self.window.push(frame);
        if self.window.len() == self.window_cap {
            let total: Duration = self.window.iter().sum();
            let mean_ms = total.as_secs_f64() * 1000.0 / self.window_cap as f64;
            if self.history.len() == HISTORY_CAP {
                self.history.pop_front();
            }
            self.history.push_back(mean_ms);
            self.window.clear();
        }
    }

    /// Averaged readings, oldest first. One entry per completed window.
    pub fn readings(&self) -> impl Iterator<Item = f64> + '_ {
        self.history.iter().copied()
    }

    /// Number of completed-window readings currently held.
    pub fn samples(&self) -> usize {
        self.history.len()
    }

    /// Mean of the held readings, in milliseconds; NaN before the first
    /// window completes.
    pub fn average_ms(&self) -> f64 {
        if self.history.is_empty() {
            return f64::NAN;
        }
        self.history.iter().sum::<f64>() / self.history.len() as f64
    }
}

/// Point-in-time performance summary for one Happen.
#[derive(Debug, Clone)]
pub struct PerfReport {
    pub name: String,
    /// Average core-update frame time (ms); NaN with no samples.
    pub avg_core_ms: f64,
    pub core_samples: usize,
    /// Average realized-update frame time (ms); NaN with no samples.
    pub avg_realized_ms: f64,
    pub realized_samples: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_full_window_yields_one_reading() {
        let mut sampler = FrameSampler::new(CORE_WINDOW);
        for _ in 0..CORE_WINDOW - 1 {
            sampler.record(Duration::from_millis(2));
        }
        assert_eq!(sampler.samples(), 0);
        assert!(sampler.average_ms().is_nan());

        sampler.record(Duration::from_millis(2));
        assert_eq!(sampler.samples(), 1);
        let avg = sampler.average_ms();
        assert!((avg - 2.0).abs() < 1e-9, "got {avg}");
    }

    #[test]
    fn history_is_bounded_and_evicts_oldest_first() {
        let mut sampler = FrameSampler::new(CORE_WINDOW);
        // 2400 ticks = 12 windows at 1ms, then 2 more windows at 5ms.
        for _ in 0..CORE_WINDOW * HISTORY_CAP {
            sampler.record(Duration::from_millis(1));
        }
        assert_eq!(sampler.samples(), HISTORY_CAP);

        for _ in 0..CORE_WINDOW * 2 {
            sampler.record(Duration::from_millis(5));
        }
        assert_eq!(sampler.samples(), HISTORY_CAP);
        let readings: Vec<f64> = sampler.readings().collect();
        assert!((readings[0] - 1.0).abs() < 1e-9);
        assert!((readings[HISTORY_CAP - 2] - 5.0).abs() < 1e-9);
        assert!((readings[HISTORY_CAP - 1] - 5.0).abs() < 1e-9);
    }

    #[test]
    fn partial_window_contributes_nothing() {
        let mut sampler = FrameSampler::new(4);
        sampler.record(Duration::from_millis(100));
        sampler.record(Duration::from_millis(100));
        assert_eq!(sampler.samples(), 0);
        assert!(sampler.average_ms().is_nan());
    }
}
