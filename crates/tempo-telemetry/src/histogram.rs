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

//! Lock-free distribution of tick durations.
//!
//! Buckets are identified by their lower bound: bucket `i` holds samples in
//! `[bounds[i], bounds[i + 1])`, the last bucket is open-ended. Percentiles
//! are estimated by linear interpolation inside the bucket holding the rank.

use std::sync::atomic::{AtomicU64, Ordering};

/// Default bucket lower bounds, in milliseconds.
pub const DEFAULT_BUCKETS_MS: [f64; 9] = [0.0, 5.0, 10.0, 16.67, 20.0, 33.33, 50.0, 100.0, 200.0];

/// One 60 Hz frame.
const JANK_MS: f64 = 16.67;
/// Two 60 Hz frames.
const SEVERE_JANK_MS: f64 = 33.33;

/// Histogram of tick durations with jank counters.
#[derive(Debug)]
pub struct TickHistogram {
    bounds: Vec<f64>,
    counts: Vec<AtomicU64>,
    total: AtomicU64,
    sum_micros: AtomicU64,
    max_micros: AtomicU64,
    jank: AtomicU64,
    severe_jank: AtomicU64,
}

impl TickHistogram {
    /// Creates a histogram with [`DEFAULT_BUCKETS_MS`].
    pub fn new() -> Self {
        Self::with_buckets(&DEFAULT_BUCKETS_MS)
    }

    /// Creates a histogram with custom lower bounds.
    ///
    /// Bounds are sorted; an empty slice falls back to a single `[0, ∞)` bucket.
    pub fn with_buckets(bounds_ms: &[f64]) -> Self {
        let mut bounds: Vec<f64> = bounds_ms.iter().copied().filter(|b| b.is_finite()).collect();
        bounds.sort_by(f64::total_cmp);
        if bounds.is_empty() {
            bounds.push(0.0);
        }
        let counts = bounds.iter().map(|_| AtomicU64::new(0)).collect();
        Self {
            bounds,
            counts,
            total: AtomicU64::new(0),
            sum_micros: AtomicU64::new(0),
            max_micros: AtomicU64::new(0),
            jank: AtomicU64::new(0),
            severe_jank: AtomicU64::new(0),
        }
    }

    /// Records one tick duration. Negative and non-finite values count as zero.
    pub fn record(&self, duration_ms: f64) {
        let duration_ms = if duration_ms.is_finite() {
            duration_ms.max(0.0)
        } else {
            0.0
        };
        let micros = (duration_ms * 1000.0).round() as u64;

        self.counts[self.bucket_index(duration_ms)].fetch_add(1, Ordering::Relaxed);
        self.total.fetch_add(1, Ordering::Relaxed);
        self.sum_micros.fetch_add(micros, Ordering::Relaxed);
        self.max_micros.fetch_max(micros, Ordering::Relaxed);
        if duration_ms > JANK_MS {
            self.jank.fetch_add(1, Ordering::Relaxed);
        }
        if duration_ms > SEVERE_JANK_MS {
            self.severe_jank.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn bucket_index(&self, duration_ms: f64) -> usize {
        self.bounds
            .iter()
            .rposition(|&b| duration_ms >= b)
            .unwrap_or(0)
    }

    /// Bucket lower bounds.
    pub fn bounds(&self) -> &[f64] {
        &self.bounds
    }

    /// Per-bucket counts.
    pub fn counts(&self) -> Vec<u64> {
        self.counts.iter().map(|c| c.load(Ordering::Relaxed)).collect()
    }

    /// Number of recorded samples.
    pub fn total_samples(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    /// Samples above one 60 Hz frame.
    pub fn jank_count(&self) -> u64 {
        self.jank.load(Ordering::Relaxed)
    }

    /// Samples above two 60 Hz frames.
    pub fn severe_jank_count(&self) -> u64 {
        self.severe_jank.load(Ordering::Relaxed)
    }

    /// Longest recorded sample.
    pub fn max_ms(&self) -> f64 {
        self.max_micros.load(Ordering::Relaxed) as f64 / 1000.0
    }

    /// Mean of all samples; 0 when empty.
    pub fn average_ms(&self) -> f64 {
        let total = self.total_samples();
        if total == 0 {
            return 0.0;
        }
        self.sum_micros.load(Ordering::Relaxed) as f64 / 1000.0 / total as f64
    }

    /// Estimated `percentile` (0–100); 0 when empty.
    pub fn percentile(&self, percentile: f64) -> f64 {
        let counts = self.counts();
        let total: u64 = counts.iter().sum();
        if total == 0 {
            return 0.0;
        }
        let target = ((total as f64) * percentile.clamp(0.0, 100.0) / 100.0).ceil().max(1.0) as u64;

        let mut cumulative = 0u64;
        for (i, &count) in counts.iter().enumerate() {
            let previous = cumulative;
            cumulative += count;
            if cumulative >= target {
                let start = self.bounds[i];
                // The open-ended bucket is capped by the largest sample seen.
                let end = match self.bounds.get(i + 1) {
                    Some(&next) => next,
                    None => self.max_ms().max(start),
                };
                let fraction = (target - previous) as f64 / count as f64;
                return start + fraction * (end - start);
            }
        }
        self.max_ms()
    }

    /// Median estimate.
    pub fn p50(&self) -> f64 {
        self.percentile(50.0)
    }

    /// 95th percentile estimate.
    pub fn p95(&self) -> f64 {
        self.percentile(95.0)
    }

    /// 99th percentile estimate.
    pub fn p99(&self) -> f64 {
        self.percentile(99.0)
    }

    /// Zeroes every counter.
    pub fn reset(&self) {
        for c in &self.counts {
            c.store(0, Ordering::Relaxed);
        }
        self.total.store(0, Ordering::Relaxed);
        self.sum_micros.store(0, Ordering::Relaxed);
        self.max_micros.store(0, Ordering::Relaxed);
        self.jank.store(0, Ordering::Relaxed);
        self.severe_jank.store(0, Ordering::Relaxed);
    }
}

impl Default for TickHistogram {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_samples_land_in_lower_bound_buckets() {
        let h = TickHistogram::new();
        h.record(3.0); // [0, 5)
        h.record(5.0); // [5, 10)
        h.record(17.0); // [16.67, 20)
        h.record(250.0); // [200, ∞)
        assert_eq!(h.counts(), vec![1, 1, 0, 1, 0, 0, 0, 0, 1]);
        assert_eq!(h.total_samples(), 4);
    }

    #[test]
    fn test_jank_counters() {
        let h = TickHistogram::new();
        h.record(10.0);
        h.record(20.0);
        h.record(40.0);
        assert_eq!(h.jank_count(), 2);
        assert_eq!(h.severe_jank_count(), 1);
    }

    #[test]
    fn test_average_and_max() {
        let h = TickHistogram::new();
        h.record(2.0);
        h.record(4.0);
        assert_relative_eq!(h.average_ms(), 3.0, epsilon = 1e-9);
        assert_relative_eq!(h.max_ms(), 4.0, epsilon = 1e-9);
    }

    #[test]
    fn test_percentile_interpolates_inside_bucket() {
        let h = TickHistogram::new();
        // Ten samples in [0, 5): the median rank is 5 of 10, halfway through.
        for _ in 0..10 {
            h.record(1.0);
        }
        assert_relative_eq!(h.p50(), 2.5, epsilon = 1e-9);
        assert_relative_eq!(h.percentile(100.0), 5.0, epsilon = 1e-9);
    }

    #[test]
    fn test_percentile_in_open_bucket_is_capped_by_max() {
        let h = TickHistogram::new();
        h.record(300.0);
        assert!(h.p99() <= 300.0);
        assert!(h.p99() >= 200.0);
    }

    #[test]
    fn test_empty_histogram_reads_zero() {
        let h = TickHistogram::new();
        assert_eq!(h.p95(), 0.0);
        assert_eq!(h.average_ms(), 0.0);
    }

    #[test]
    fn test_reset() {
        let h = TickHistogram::new();
        h.record(50.0);
        h.reset();
        assert_eq!(h.total_samples(), 0);
        assert_eq!(h.severe_jank_count(), 0);
        assert_eq!(h.max_ms(), 0.0);
    }
}
