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

//! Fixed-capacity sample storage.

/// A circular buffer with a capacity chosen at construction time.
///
/// Storage is allocated once; pushing never allocates and overwrites the
/// oldest sample once full.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    data: Vec<T>,
    index: usize,
    count: usize,
}

impl<T: Default + Copy> RingBuffer<T> {
    /// Creates an empty buffer holding at most `capacity` samples (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![T::default(); capacity.max(1)],
            index: 0,
            count: 0,
        }
    }

    /// Pushes a value, overwriting the oldest if full.
    pub fn push(&mut self, value: T) {
        let capacity = self.data.len();
        self.data[self.index] = value;
        self.index = (self.index + 1) % capacity;
        if self.count < capacity {
            self.count += 1;
        }
    }

    /// Number of samples currently stored.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Maximum number of samples.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Whether no sample was pushed since creation or the last clear.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Iterates the most recent `k` samples, newest first.
    pub fn recent(&self, k: usize) -> impl Iterator<Item = &T> {
        let capacity = self.data.len();
        let take = k.min(self.count);
        (1..=take).map(move |back| &self.data[(self.index + capacity - back) % capacity])
    }

    /// Iterates all samples in chronological order (oldest to newest).
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        let capacity = self.data.len();
        let start = (self.index + capacity - self.count) % capacity;
        (0..self.count).map(move |i| &self.data[(start + i) % capacity])
    }

    /// Forgets every sample. Storage is kept.
    pub fn clear(&mut self) {
        self.index = 0;
        self.count = 0;
    }
}

impl RingBuffer<f64> {
    /// Largest of the last `k` samples; 0 when empty.
    pub fn max_recent(&self, k: usize) -> f64 {
        self.recent(k).copied().reduce(f64::max).unwrap_or(0.0)
    }

    /// Mean of the last `k` samples; 0 when empty.
    pub fn average_recent(&self, k: usize) -> f64 {
        let n = k.min(self.count);
        if n == 0 {
            return 0.0;
        }
        self.recent(n).sum::<f64>() / n as f64
    }

    /// Population variance of the last `k` samples; 0 with fewer than two.
    pub fn variance_recent(&self, k: usize) -> f64 {
        let n = k.min(self.count);
        if n < 2 {
            return 0.0;
        }
        let avg = self.average_recent(n);
        self.recent(n).map(|v| (v - avg) * (v - avg)).sum::<f64>() / n as f64
    }
}
