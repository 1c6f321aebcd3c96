//! WaitTimeEstimator — queue wait from recent processing times.

use std::collections::VecDeque;

/// Rolling mean of the last `window` processing times (seconds).
#[derive(Debug, Clone)]
pub struct WaitTimeEstimator {
    samples: VecDeque<f64>,
    window: usize,
    default_secs: f64,
}

impl WaitTimeEstimator {
    pub fn new(window: usize, default_secs: f64) -> Self {
        let window = window.max(1);
        Self {
            samples: VecDeque::with_capacity(window),
            window,
            default_secs,
        }
    }

    /// Record one completed job. Negative or non-finite values are ignored.
    pub fn record(&mut self, secs: f64) {
        if !secs.is_finite() || secs < 0.0 {
            return;
        }
        if self.samples.len() == self.window {
            self.samples.pop_front();
        }
        self.samples.push_back(secs);
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Mean of the window, or the default before any sample exists.
    pub fn average(&self) -> f64 {
        if self.samples.is_empty() {
            return self.default_secs;
        }
        self.samples.iter().sum::<f64>() / self.samples.len() as f64
    }

    /// `ceil(queue_depth / workers) * average`, zero for an empty queue.
    ///
    /// A pool with no workers is treated as one worker.
    pub fn estimate(&self, queue_depth: usize, workers: u32) -> f64 {
        if queue_depth == 0 {
            return 0.0;
        }
        let workers = workers.max(1) as usize;
        queue_depth.div_ceil(workers) as f64 * self.average()
    }
}
