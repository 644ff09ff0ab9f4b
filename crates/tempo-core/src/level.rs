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

//! Throttle tiers and the per-category execution intervals they carry.
//!
//! A [`ThrottleLevel`] is a plain value ordered by permissiveness:
//! `Full > Reduced > Low > Minimal`.
//! [`ThrottleLevel::more_conservative`] is the successor function used by the
//! hysteresis layer, with `Minimal` as its absorbing state.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A category of elastic per-object work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepCategory {
    /// Sensing the surroundings (line of sight, nearby actors).
    Perception,
    /// Decision making (goal selection, state machines).
    Behavior,
    /// Target acquisition and re-validation.
    Target,
    /// Movement integration. Never throttled.
    Motion,
    /// Collision resolution. Never throttled.
    Collision,
}

impl StepCategory {
    /// All categories, in a stable order suitable for indexing counters.
    pub const ALL: [StepCategory; 5] = [
        StepCategory::Perception,
        StepCategory::Behavior,
        StepCategory::Target,
        StepCategory::Motion,
        StepCategory::Collision,
    ];

    /// Stable index of this category inside [`StepCategory::ALL`].
    pub fn index(self) -> usize {
        match self {
            StepCategory::Perception => 0,
            StepCategory::Behavior => 1,
            StepCategory::Target => 2,
            StepCategory::Motion => 3,
            StepCategory::Collision => 4,
        }
    }

    /// Lowercase label used for logs and metric labels.
    pub fn as_str(self) -> &'static str {
        match self {
            StepCategory::Perception => "perception",
            StepCategory::Behavior => "behavior",
            StepCategory::Target => "target",
            StepCategory::Motion => "motion",
            StepCategory::Collision => "collision",
        }
    }
}

/// A throttle tier applied to elastic work.
///
/// Ordered by permissiveness, so `Full > Reduced > Low > Minimal` and the
/// most conservative of two levels is their `min`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ThrottleLevel {
    /// Every category runs every tick.
    Full,
    /// Perception every 2nd tick.
    Reduced,
    /// Perception every 4th tick, behavior every 2nd.
    Low,
    /// Perception every 8th tick, behavior every 4th, targeting every 2nd.
    Minimal,
}

impl ThrottleLevel {
    /// All levels from most to least permissive.
    pub const ALL: [ThrottleLevel; 4] = [
        ThrottleLevel::Full,
        ThrottleLevel::Reduced,
        ThrottleLevel::Low,
        ThrottleLevel::Minimal,
    ];

    /// Number of ticks between two executions of `category` at this level.
    pub fn interval(self, category: StepCategory) -> u64 {
        match category {
            StepCategory::Motion | StepCategory::Collision => 1,
            StepCategory::Perception => match self {
                ThrottleLevel::Full => 1,
                ThrottleLevel::Reduced => 2,
                ThrottleLevel::Low => 4,
                ThrottleLevel::Minimal => 8,
            },
            StepCategory::Behavior => match self {
                ThrottleLevel::Full | ThrottleLevel::Reduced => 1,
                ThrottleLevel::Low => 2,
                ThrottleLevel::Minimal => 4,
            },
            StepCategory::Target => match self {
                ThrottleLevel::Full | ThrottleLevel::Reduced | ThrottleLevel::Low => 1,
                ThrottleLevel::Minimal => 2,
            },
        }
    }

    /// Relative share of elastic work permitted at this level, in percent.
    pub fn budget_weight(self) -> u32 {
        match self {
            ThrottleLevel::Full => 100,
            ThrottleLevel::Reduced => 75,
            ThrottleLevel::Low => 50,
            ThrottleLevel::Minimal => 25,
        }
    }

    /// Whether `category` work for `item_id` runs on `world_tick`.
    ///
    /// Items are staggered by id so that a level with interval N spreads the
    /// population evenly over N ticks instead of bunching it on one.
    pub fn should_execute(self, category: StepCategory, item_id: u64, world_tick: u64) -> bool {
        let interval = self.interval(category);
        interval <= 1 || item_id.wrapping_add(world_tick) % interval == 0
    }

    /// The next, more conservative tier. `Minimal` maps to itself.
    pub fn more_conservative(self) -> ThrottleLevel {
        match self {
            ThrottleLevel::Full => ThrottleLevel::Reduced,
            ThrottleLevel::Reduced => ThrottleLevel::Low,
            ThrottleLevel::Low | ThrottleLevel::Minimal => ThrottleLevel::Minimal,
        }
    }

    /// Rank used by `Ord`; `Full` is the highest.
    fn permissiveness(self) -> u8 {
        match self {
            ThrottleLevel::Full => 3,
            ThrottleLevel::Reduced => 2,
            ThrottleLevel::Low => 1,
            ThrottleLevel::Minimal => 0,
        }
    }

    /// The least permissive of two levels.
    pub fn most_conservative(self, other: ThrottleLevel) -> ThrottleLevel {
        self.min(other)
    }

    /// Forced floor implied by a combined budget multiplier, if any.
    ///
    /// `<= 0.2` forces `Minimal`, `<= 0.5` forces `Low`, anything above
    /// leaves the level untouched.
    pub fn from_multiplier(multiplier: f64) -> Option<ThrottleLevel> {
        if multiplier <= 0.2 {
            Some(ThrottleLevel::Minimal)
        } else if multiplier <= 0.5 {
            Some(ThrottleLevel::Low)
        } else {
            None
        }
    }

    /// Uppercase label used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            ThrottleLevel::Full => "FULL",
            ThrottleLevel::Reduced => "REDUCED",
            ThrottleLevel::Low => "LOW",
            ThrottleLevel::Minimal => "MINIMAL",
        }
    }
}

impl Default for ThrottleLevel {
    fn default() -> Self {
        ThrottleLevel::Full
    }
}

impl Ord for ThrottleLevel {
    fn cmp(&self, other: &Self) -> Ordering {
        self.permissiveness().cmp(&other.permissiveness())
    }
}

impl PartialOrd for ThrottleLevel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ThrottleLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_successor_saturates_at_minimal() {
        assert_eq!(ThrottleLevel::Full.more_conservative(), ThrottleLevel::Reduced);
        assert_eq!(ThrottleLevel::Reduced.more_conservative(), ThrottleLevel::Low);
        assert_eq!(ThrottleLevel::Low.more_conservative(), ThrottleLevel::Minimal);
        assert_eq!(ThrottleLevel::Minimal.more_conservative(), ThrottleLevel::Minimal);
    }

    #[test]
    fn test_motion_and_collision_never_throttled() {
        for level in ThrottleLevel::ALL {
            for tick in 0..16 {
                assert!(level.should_execute(StepCategory::Motion, 7, tick));
                assert!(level.should_execute(StepCategory::Collision, 7, tick));
            }
        }
    }

    #[test]
    fn test_minimal_perception_runs_once_every_eight_ticks() {
        let runs = (0..64)
            .filter(|&tick| ThrottleLevel::Minimal.should_execute(StepCategory::Perception, 3, tick))
            .count();
        assert_eq!(runs, 8);
    }

    #[test]
    fn test_staggering_spreads_items_across_ticks() {
        // With interval 2, two consecutive ids never run on the same tick.
        let a = ThrottleLevel::Reduced.should_execute(StepCategory::Perception, 10, 5);
        let b = ThrottleLevel::Reduced.should_execute(StepCategory::Perception, 11, 5);
        assert_ne!(a, b);
    }

    #[test]
    fn test_from_multiplier_thresholds() {
        assert_eq!(ThrottleLevel::from_multiplier(0.1), Some(ThrottleLevel::Minimal));
        assert_eq!(ThrottleLevel::from_multiplier(0.2), Some(ThrottleLevel::Minimal));
        assert_eq!(ThrottleLevel::from_multiplier(0.3), Some(ThrottleLevel::Low));
        assert_eq!(ThrottleLevel::from_multiplier(0.5), Some(ThrottleLevel::Low));
        assert_eq!(ThrottleLevel::from_multiplier(0.75), None);
        assert_eq!(ThrottleLevel::from_multiplier(1.0), None);
    }

    #[test]
    fn test_most_conservative_picks_less_permissive() {
        assert_eq!(
            ThrottleLevel::Reduced.most_conservative(ThrottleLevel::Low),
            ThrottleLevel::Low
        );
        assert_eq!(
            ThrottleLevel::Minimal.most_conservative(ThrottleLevel::Full),
            ThrottleLevel::Minimal
        );
    }

    #[test]
    fn test_order_runs_from_full_down_to_minimal() {
        assert!(ThrottleLevel::Full > ThrottleLevel::Reduced);
        assert!(ThrottleLevel::Reduced > ThrottleLevel::Low);
        assert!(ThrottleLevel::Low > ThrottleLevel::Minimal);
        assert!(ThrottleLevel::Full > ThrottleLevel::Minimal);

        let mut levels = vec![ThrottleLevel::Low, ThrottleLevel::Full, ThrottleLevel::Minimal];
        levels.sort();
        assert_eq!(
            levels,
            vec![ThrottleLevel::Minimal, ThrottleLevel::Low, ThrottleLevel::Full]
        );
        for level in ThrottleLevel::ALL {
            assert!(level.more_conservative() <= level);
        }
    }

    #[test]
    fn test_budget_weights() {
        let weights: Vec<u32> = ThrottleLevel::ALL.iter().map(|l| l.budget_weight()).collect();
        assert_eq!(weights, vec![100, 75, 50, 25]);
    }
}
