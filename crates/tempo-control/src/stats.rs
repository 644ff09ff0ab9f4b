// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Rolling tick duration statistics.
//!
//! Two windows over one history: a short one (one second at 60 Hz) for
//! spike detection through its maximum, and a long one (five seconds) for
//! sustained load through its average. The history capacity equals the long
//! window, so the short window is always a suffix of it.

use crate::metrics::RingBuffer;
use tempo_core::GovernanceConfig;

/// Recent tick durations with short-window max and long-window average.
#[derive(Debug, Clone)]
pub struct RollingTickStats {
    history: RingBuffer<f64>,
    short_window: usize,
    long_window: usize,
}

impl RollingTickStats {
    /// Creates stats with explicit window sizes, in samples.
    ///
    /// `long_window` is raised to `short_window` if smaller.
    pub fn new(short_window: usize, long_window: usize) -> Self {
        let short_window = short_window.max(1);
        let long_window = long_window.max(short_window);
        Self {
            history: RingBuffer::new(long_window),
            short_window,
            long_window,
        }
    }

    /// Creates stats sized from the configuration.
    pub fn from_config(config: &GovernanceConfig) -> Self {
        Self::new(config.window_short_ticks, config.window_long_ticks)
    }

    /// Appends one completed tick duration, in milliseconds.
    pub fn record(&mut self, duration_ms: f64) {
        self.history.push(duration_ms);
    }

    /// Largest sample over the short window; 0 when empty.
    pub fn max_over_short_window(&self) -> f64 {
        self.history.max_recent(self.short_window)
    }

    /// Mean over the long window (or whatever is available); 0 when empty.
    pub fn avg_over_long_window(&self) -> f64 {
        self.history.average_recent(self.long_window)
    }

    /// Standard deviation over the short window; used as a jitter signal.
    pub fn jitter_ms(&self) -> f64 {
        self.history.variance_recent(self.short_window).sqrt()
    }

    /// Largest of the last `k` samples.
    pub fn max_last(&self, k: usize) -> f64 {
        self.history.max_recent(k)
    }

    /// Mean of the last `k` samples.
    pub fn avg_last(&self, k: usize) -> f64 {
        self.history.average_recent(k)
    }

    /// Most recent sample; 0 when empty.
    pub fn last(&self) -> f64 {
        self.history.recent(1).copied().next().unwrap_or(0.0)
    }

    /// True once a full short window of samples exists.
    ///
    /// Without enough data callers must bypass, never throttle.
    pub fn has_enough_data(&self) -> bool {
        self.history.count() >= self.short_window
    }

    /// Number of stored samples.
    pub fn sample_count(&self) -> usize {
        self.history.count()
    }

    /// Short window size, in samples.
    pub fn short_window(&self) -> usize {
        self.short_window
    }

    /// Long window size, in samples.
    pub fn long_window(&self) -> usize {
        self.long_window
    }

    /// Forgets every sample.
    pub fn reset(&mut self) {
        self.history.clear();
    }
}

impl Default for RollingTickStats {
    fn default() -> Self {
        Self::new(60, 300)
    }
}
