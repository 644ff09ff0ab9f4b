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

//! Yields elastic work while the world is streaming in around a fast observer.

use super::{Guard, GuardFlag, GUARD_STREAMING};
use crate::error::GovernanceError;
use crate::failsoft::{ErrorBudget, ErrorVerdict};
use crate::metrics::RingBuffer;
use tempo_core::{GovernanceConfig, InterventionReason, QueryError, ThrottleLevel};

/// Streaming guard.
#[derive(Debug, Clone)]
pub struct StreamingGuard {
    enabled: bool,
    drop_threshold_ms: f64,
    min_drops: usize,
    speed_threshold: f64,

    drops: RingBuffer<bool>,
    yielding: bool,
    yield_ticks: u64,
    errors: ErrorBudget,
}

impl StreamingGuard {
    /// Creates a guard that is not yielding.
    pub fn new(config: &GovernanceConfig) -> Self {
        Self {
            enabled: config.streaming_guard_enabled,
            drop_threshold_ms: config.streaming_drop_threshold_ms,
            min_drops: config.streaming_min_drops.max(1) as usize,
            speed_threshold: config.streaming_speed_threshold,
            drops: RingBuffer::new(config.streaming_drop_window_ticks as usize),
            yielding: false,
            yield_ticks: 0,
            errors: ErrorBudget::new(config.streaming_max_errors),
        }
    }

    /// Records one completed tick duration.
    pub fn record_tick(&mut self, duration_ms: f64) {
        self.drops.push(duration_ms >= self.drop_threshold_ms);
    }

    /// Dropped ticks inside the window.
    pub fn drops_in_window(&self) -> usize {
        self.drops.iter().filter(|dropped| **dropped).count()
    }

    /// Re-evaluates yield mode from the observer's speed.
    ///
    /// Returns the new yield flag when it changed.
    pub fn update(&mut self, observer_speed: Result<f64, QueryError>) -> Option<bool> {
        if !self.is_operational() {
            return None;
        }
        let speed = match observer_speed {
            Ok(speed) if speed.is_finite() => {
                self.errors.record_success();
                speed
            }
            Ok(speed) => {
                return self.record_fault(GovernanceError::InvalidSample {
                    what: "observer_speed",
                    value: speed,
                })
            }
            Err(err) => return self.record_fault(err.into()),
        };

        let fast = speed > self.speed_threshold;
        let should_yield = fast && self.drops_in_window() >= self.min_drops;
        if should_yield {
            self.yield_ticks += 1;
        }
        if should_yield == self.yielding {
            return None;
        }
        self.yielding = should_yield;
        if should_yield {
            log::info!(
                "StreamingGuard: yielding ({} drops, observer speed {:.1})",
                self.drops_in_window(),
                speed
            );
        } else {
            log::info!("StreamingGuard: resumed");
        }
        Some(should_yield)
    }

    /// Counts a fault. On trip the guard stops yielding for good.
    pub fn record_fault(&mut self, error: GovernanceError) -> Option<bool> {
        let message = error.to_string();
        match self.errors.record_error(error) {
            ErrorVerdict::Tolerated => {
                log::warn!(
                    "StreamingGuard: error {}/{}: {}",
                    self.errors.consecutive(),
                    self.errors.ceiling(),
                    message
                );
                None
            }
            ErrorVerdict::Tripped => {
                log::error!(
                    "StreamingGuard: {} consecutive errors, guard DISABLED ({})",
                    self.errors.ceiling(),
                    message
                );
                let was_yielding = std::mem::replace(&mut self.yielding, false);
                was_yielding.then_some(false)
            }
            ErrorVerdict::AlreadyDisabled => None,
        }
    }

    fn is_operational(&self) -> bool {
        self.enabled && !self.errors.is_disabled()
    }

    /// Whether elastic work is yielding this tick.
    pub fn is_yielding(&self) -> bool {
        self.is_operational() && self.yielding
    }

    /// Ticks spent yielding.
    pub fn yield_ticks(&self) -> u64 {
        self.yield_ticks
    }

    /// Whether the error budget is exhausted.
    pub fn is_failed(&self) -> bool {
        self.errors.is_disabled()
    }

    /// Forgets drops, yield mode and faults.
    pub fn reset(&mut self) {
        self.drops.clear();
        self.yielding = false;
        self.yield_ticks = 0;
        self.errors.reset();
    }
}

impl Guard for StreamingGuard {
    fn name(&self) -> &'static str {
        "StreamingGuard"
    }

    fn flag(&self) -> GuardFlag {
        GUARD_STREAMING
    }

    fn is_active(&self) -> bool {
        self.is_yielding()
    }

    fn multiplier(&self) -> f64 {
        1.0
    }

    fn last_reason(&self) -> Option<InterventionReason> {
        self.is_yielding().then_some(InterventionReason::GuardStreaming)
    }

    fn override_level(&self) -> Option<ThrottleLevel> {
        self.is_yielding().then_some(ThrottleLevel::Minimal)
    }
}
