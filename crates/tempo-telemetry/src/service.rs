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

//! Periodic governance summary.

use crate::counters::GovernanceCounters;
use std::sync::Arc;

/// Owns the shared counters and logs a one-line summary every N ticks.
///
/// The interval is counted in ticks, not wall-clock time, so replays log at
/// the same points.
#[derive(Debug)]
pub struct TelemetryService {
    counters: Arc<GovernanceCounters>,
    summary_interval_ticks: u64,
    ticks_since_summary: u64,
}

impl TelemetryService {
    /// Creates a service. An interval of zero never logs.
    pub fn new(summary_interval_ticks: u64) -> Self {
        Self {
            counters: Arc::new(GovernanceCounters::new()),
            summary_interval_ticks,
            ticks_since_summary: 0,
        }
    }

    /// Should be called once per tick, after the tick is recorded.
    /// Returns `true` on ticks where a summary was emitted.
    pub fn tick(&mut self) -> bool {
        if self.summary_interval_ticks == 0 {
            return false;
        }
        self.ticks_since_summary += 1;
        if self.ticks_since_summary < self.summary_interval_ticks {
            return false;
        }
        self.ticks_since_summary = 0;

        let s = self.counters.snapshot();
        log::info!(
            "Governance: {} ticks | avg {:.2}ms p95 {:.2}ms max {:.2}ms | cutoffs {} panics {} gate {} guards {} | x{:.2}{}",
            s.ticks,
            s.tick_avg_ms,
            s.tick_p95_ms,
            s.tick_max_ms,
            s.cutoffs,
            s.panic_entries,
            s.gate_activations,
            s.guard_activations,
            s.budget_multiplier,
            if s.intervention_disabled { " | DISABLED" } else { "" },
        );
        if !s.top_reasons.is_empty() {
            log::debug!("Governance: top reasons {:?}", s.top_reasons);
        }
        true
    }

    /// Shared handle for reporting threads.
    pub fn counters(&self) -> Arc<GovernanceCounters> {
        Arc::clone(&self.counters)
    }

    /// Borrow of the counters for the tick thread.
    pub fn counters_ref(&self) -> &GovernanceCounters {
        &self.counters
    }

    /// Zeroes the counters and the summary interval.
    pub fn reset(&mut self) {
        self.counters.reset();
        self.ticks_since_summary = 0;
    }
}

impl Default for TelemetryService {
    fn default() -> Self {
        Self::new(1200)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_fires_every_interval() {
        let mut service = TelemetryService::new(3);
        let fired: Vec<bool> = (0..7).map(|_| service.tick()).collect();
        assert_eq!(fired, vec![false, false, true, false, false, true, false]);
    }

    #[test]
    fn test_zero_interval_never_fires() {
        let mut service = TelemetryService::new(0);
        assert!((0..100).all(|_| !service.tick()));
    }

    #[test]
    fn test_counters_handle_is_shared() {
        let service = TelemetryService::new(10);
        let handle = service.counters();
        service.counters_ref().record_cutoff();
        assert_eq!(handle.cutoffs(), 1);
    }
}
