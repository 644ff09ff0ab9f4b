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

//! Monotonic time sources.
//!
//! Every component that reads time does so through [`Clock`], so tests can
//! drive it with a [`ManualClock`] and count how often it was read.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A monotonic time source. The origin is arbitrary but fixed.
pub trait Clock: Send + Sync {
    /// Time elapsed since the clock's origin.
    fn now(&self) -> Duration;

    /// Convenience: [`Clock::now`] in fractional milliseconds.
    fn now_ms(&self) -> f64 {
        self.now().as_secs_f64() * 1000.0
    }
}

/// Wall clock backed by [`Instant`].
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    /// Creates a clock whose origin is now.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// A hand-driven clock for deterministic tests and replays.
///
/// Clones share the same time and read counter.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    inner: Arc<ManualClockInner>,
}

#[derive(Debug, Default)]
struct ManualClockInner {
    nanos: AtomicU64,
    reads: AtomicU64,
}

impl ManualClock {
    /// Creates a clock at time zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves time forward.
    pub fn advance(&self, by: Duration) {
        self.inner
            .nanos
            .fetch_add(by.as_nanos() as u64, Ordering::SeqCst);
    }

    /// Moves time forward by fractional milliseconds.
    pub fn advance_ms(&self, ms: f64) {
        self.advance(Duration::from_secs_f64(ms.max(0.0) / 1000.0));
    }

    /// Jumps to an absolute time.
    pub fn set(&self, to: Duration) {
        self.inner.nanos.store(to.as_nanos() as u64, Ordering::SeqCst);
    }

    /// How many times [`Clock::now`] was called.
    pub fn reads(&self) -> u64 {
        self.inner.reads.load(Ordering::SeqCst)
    }

    /// Resets the read counter.
    pub fn reset_reads(&self) {
        self.inner.reads.store(0, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.inner.reads.fetch_add(1, Ordering::SeqCst);
        Duration::from_nanos(self.inner.nanos.load(Ordering::SeqCst))
    }
}
