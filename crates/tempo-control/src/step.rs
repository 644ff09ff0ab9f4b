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

//! Per-category step skipping.

use tempo_core::{StepCategory, ThrottleLevel};

const CATEGORIES: usize = StepCategory::ALL.len();

/// Applies a throttle level to individual work items, staggered by item id.
#[derive(Debug, Clone)]
pub struct StepPolicy {
    enabled: bool,
    executed: [u64; CATEGORIES],
    skipped: [u64; CATEGORIES],
}

impl StepPolicy {
    /// Creates a policy. A disabled policy never skips.
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            executed: [0; CATEGORIES],
            skipped: [0; CATEGORIES],
        }
    }

    /// Whether `item_id` should skip its `category` step on `world_tick`.
    pub fn should_skip(
        &mut self,
        category: StepCategory,
        item_id: u64,
        world_tick: u64,
        level: ThrottleLevel,
    ) -> bool {
        let skip = self.enabled && !level.should_execute(category, item_id, world_tick);
        let slot = category.index();
        if skip {
            self.skipped[slot] += 1;
        } else {
            self.executed[slot] += 1;
        }
        skip
    }

    /// Whether skipping is enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Executions counted for `category`.
    pub fn executed(&self, category: StepCategory) -> u64 {
        self.executed[category.index()]
    }

    /// Skips counted for `category`.
    pub fn skipped(&self, category: StepCategory) -> u64 {
        self.skipped[category.index()]
    }

    /// Fraction of `category` steps skipped; 0 when none was asked about.
    pub fn skip_ratio(&self, category: StepCategory) -> f64 {
        let slot = category.index();
        let total = self.executed[slot] + self.skipped[slot];
        if total == 0 {
            0.0
        } else {
            self.skipped[slot] as f64 / total as f64
        }
    }

    /// Zeroes counters.
    pub fn reset(&mut self) {
        self.executed = [0; CATEGORIES];
        self.skipped = [0; CATEGORIES];
    }
}
