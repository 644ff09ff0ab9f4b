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

//! Distance-tiered throttle levels with a system-wide hysteresis floor.
//!
//! [`ThrottleCalculator::distance_level`] is a pure function of squared
//! distance. On top of it, [`ThrottleStateMachine`] escalates one step per
//! tick while the tick statistics are bad and holds that level for every
//! object until the long-window average has been low for a full recovery
//! run. While hysteresis is active the distance level is ignored.

use crate::stats::RollingTickStats;
use tempo_core::{GovernanceConfig, InterventionReason, ThrottleLevel};

/// A change of the hysteresis state on this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HysteresisChange {
    /// Entry conditions held; the floor moved one step.
    Escalated {
        /// The new floor.
        level: ThrottleLevel,
        /// Which entry condition fired.
        reason: InterventionReason,
    },
    /// The recovery run completed; distance levels apply again.
    Released,
}

/// Hysteresis over tick statistics.
#[derive(Debug, Clone)]
pub struct ThrottleStateMachine {
    entry_max_short_ms: f64,
    entry_avg_long_ms: f64,
    exit_avg_long_ms: f64,
    exit_stability_ticks: u32,

    level: ThrottleLevel,
    stability_counter: u32,
    active: bool,
    last_reason: Option<InterventionReason>,
}

impl ThrottleStateMachine {
    /// Creates an inactive state machine.
    pub fn new(config: &GovernanceConfig) -> Self {
        Self {
            entry_max_short_ms: config.throttle_entry_max_short_ms,
            entry_avg_long_ms: config.throttle_entry_avg_long_ms,
            exit_avg_long_ms: config.throttle_exit_avg_long_ms,
            exit_stability_ticks: config.throttle_exit_stability_ticks,
            level: ThrottleLevel::Full,
            stability_counter: 0,
            active: false,
            last_reason: None,
        }
    }

    /// Advances the hysteresis by one tick. Without enough data this is a no-op.
    pub fn update(&mut self, stats: &RollingTickStats) -> Option<HysteresisChange> {
        if !stats.has_enough_data() {
            return None;
        }
        let max_short = stats.max_over_short_window();
        let avg_long = stats.avg_over_long_window();

        if max_short > self.entry_max_short_ms || avg_long > self.entry_avg_long_ms {
            let reason = if max_short > self.entry_max_short_ms {
                InterventionReason::ThrottleWindowExceeded
            } else {
                InterventionReason::ThrottleAvgHigh
            };
            self.stability_counter = 0;
            self.active = true;
            self.last_reason = Some(reason);
            let next = self.level.more_conservative();
            if next == self.level {
                return None;
            }
            self.level = next;
            log::debug!("Throttle: hysteresis escalated to {} ({})", next, reason);
            return Some(HysteresisChange::Escalated {
                level: next,
                reason,
            });
        }

        if avg_long < self.exit_avg_long_ms {
            self.stability_counter = self.stability_counter.saturating_add(1);
            if self.active && self.stability_counter >= self.exit_stability_ticks {
                self.release();
                log::info!(
                    "Throttle: hysteresis released after {} stable ticks",
                    self.exit_stability_ticks
                );
                return Some(HysteresisChange::Released);
            }
        } else {
            self.stability_counter = 0;
        }
        None
    }

    fn release(&mut self) {
        self.active = false;
        self.level = ThrottleLevel::Full;
        self.stability_counter = 0;
        self.last_reason = None;
    }

    /// The level to use for an object whose distance tier is `base`.
    #[inline]
    pub fn apply(&self, base: ThrottleLevel) -> ThrottleLevel {
        if self.active {
            self.level
        } else {
            base
        }
    }

    /// Whether a conservative floor is being held.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// The held level (`Full` when inactive).
    pub fn level(&self) -> ThrottleLevel {
        self.level
    }

    /// Consecutive stable ticks.
    pub fn stability_counter(&self) -> u32 {
        self.stability_counter
    }

    /// Why the floor is held.
    pub fn last_reason(&self) -> Option<InterventionReason> {
        self.last_reason
    }

    /// Deactivates and forgets counters.
    pub fn reset(&mut self) {
        self.release();
    }
}

/// Distance bands plus hysteresis.
#[derive(Debug, Clone)]
pub struct ThrottleCalculator {
    full_sq: f64,
    reduced_sq: f64,
    low_sq: f64,
    hysteresis: ThrottleStateMachine,
}

impl ThrottleCalculator {
    /// Creates a calculator with the configured bands.
    pub fn new(config: &GovernanceConfig) -> Self {
        Self {
            full_sq: config.distance_full_sq,
            reduced_sq: config.distance_reduced_sq,
            low_sq: config.distance_low_sq,
            hysteresis: ThrottleStateMachine::new(config),
        }
    }

    /// Base tier for an object at squared distance `distance_sq`.
    pub fn distance_level(&self, distance_sq: f64) -> ThrottleLevel {
        if distance_sq < self.full_sq {
            ThrottleLevel::Full
        } else if distance_sq < self.reduced_sq {
            ThrottleLevel::Reduced
        } else if distance_sq < self.low_sq {
            ThrottleLevel::Low
        } else {
            ThrottleLevel::Minimal
        }
    }

    /// Advances hysteresis once per tick.
    pub fn update_for_tick(&mut self, stats: &RollingTickStats) -> Option<HysteresisChange> {
        self.hysteresis.update(stats)
    }

    /// Final level for an object at `distance_sq`.
    pub fn calculate(&self, distance_sq: f64) -> ThrottleLevel {
        self.hysteresis.apply(self.distance_level(distance_sq))
    }

    /// The level held by hysteresis, regardless of distance, if active.
    pub fn hysteresis_floor(&self) -> Option<ThrottleLevel> {
        self.hysteresis.is_active().then(|| self.hysteresis.level())
    }

    /// The hysteresis state machine.
    pub fn hysteresis(&self) -> &ThrottleStateMachine {
        &self.hysteresis
    }

    /// Resets hysteresis.
    pub fn reset(&mut self) {
        self.hysteresis.reset();
    }
}
