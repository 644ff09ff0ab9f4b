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

//! Per-reason intervention counts.

use std::sync::atomic::{AtomicU64, Ordering};
use tempo_core::InterventionReason;

/// One counter per [`InterventionReason`].
#[derive(Debug)]
pub struct ReasonStats {
    counts: [AtomicU64; InterventionReason::COUNT],
}

impl ReasonStats {
    /// Creates a zeroed set of counters.
    pub fn new() -> Self {
        Self {
            counts: std::array::from_fn(|_| AtomicU64::new(0)),
        }
    }

    /// Counts one occurrence of `reason`.
    pub fn increment(&self, reason: InterventionReason) {
        self.counts[reason.index()].fetch_add(1, Ordering::Relaxed);
    }

    /// Occurrences of `reason` so far.
    pub fn count(&self, reason: InterventionReason) -> u64 {
        self.counts[reason.index()].load(Ordering::Relaxed)
    }

    /// Sum over all reasons.
    pub fn total(&self) -> u64 {
        self.counts.iter().map(|c| c.load(Ordering::Relaxed)).sum()
    }

    /// The `n` most frequent reasons with a non-zero count, most frequent first.
    /// Ties keep declaration order.
    pub fn top(&self, n: usize) -> Vec<(InterventionReason, u64)> {
        let mut entries: Vec<(InterventionReason, u64)> = InterventionReason::ALL
            .iter()
            .map(|&r| (r, self.count(r)))
            .filter(|&(_, c)| c > 0)
            .collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1));
        entries.truncate(n);
        entries
    }

    /// Zeroes every counter.
    pub fn reset(&self) {
        for c in &self.counts {
            c.store(0, Ordering::Relaxed);
        }
    }
}

impl Default for ReasonStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increment_and_count() {
        let stats = ReasonStats::new();
        stats.increment(InterventionReason::GovernorCutoff);
        stats.increment(InterventionReason::GovernorCutoff);
        stats.increment(InterventionReason::IoGuardActive);
        assert_eq!(stats.count(InterventionReason::GovernorCutoff), 2);
        assert_eq!(stats.count(InterventionReason::IoGuardActive), 1);
        assert_eq!(stats.count(InterventionReason::GcPressureDiet), 0);
        assert_eq!(stats.total(), 3);
    }

    #[test]
    fn test_top_orders_by_frequency_and_skips_zero() {
        let stats = ReasonStats::new();
        for _ in 0..3 {
            stats.increment(InterventionReason::PanicWindowSpikes);
        }
        stats.increment(InterventionReason::GateActivated);
        let top = stats.top(5);
        assert_eq!(
            top,
            vec![
                (InterventionReason::PanicWindowSpikes, 3),
                (InterventionReason::GateActivated, 1)
            ]
        );
        assert_eq!(stats.top(1).len(), 1);
    }

    #[test]
    fn test_reset_zeroes_everything() {
        let stats = ReasonStats::new();
        stats.increment(InterventionReason::BudgetHardLimit);
        stats.reset();
        assert_eq!(stats.total(), 0);
        assert!(stats.top(3).is_empty());
    }
}
