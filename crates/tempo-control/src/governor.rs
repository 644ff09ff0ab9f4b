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

//! Per-tick wall-clock cutoff for elastic work.
//!
//! The elastic-work loop calls [`TickBudgetGovernor::should_continue`] before
//! each item. The clock is only read every `batch_check_size` calls, and once
//! the force-cutoff threshold is reached the answer stays `false` until the
//! next [`TickBudgetGovernor::begin_tick`]. Unfinished work is deferred, never
//! aborted mid-item.
//!
//! The governor also accounts for the governance layer's own overhead through
//! [`TickBudgetGovernor::begin_intervention`] and
//! [`TickBudgetGovernor::end_intervention`].

use std::sync::Arc;
use std::time::Duration;
use tempo_core::{Clock, GovernanceConfig};

/// Outcome of [`TickBudgetGovernor::can_intervene`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverheadCheck {
    /// Overhead is below the soft limit, or the soft limit was already reported.
    Within,
    /// Overhead just crossed the soft limit. Reported once per tick.
    SoftLimitCrossed,
    /// Overhead reached the hard limit; the intervention must be skipped.
    HardLimit,
}

/// Wall-clock budget for one tick.
pub struct TickBudgetGovernor {
    clock: Arc<dyn Clock>,
    budget_ms: f64,
    force_cutoff_ms: f64,
    batch_check_size: u32,
    soft_limit_ms: f64,
    hard_limit_ms: f64,

    tick_start: Option<Duration>,
    work_this_tick: u32,
    cutoff_triggered: bool,
    last_tick_ms: f64,

    overhead_ms: f64,
    intervention_start: Option<Duration>,
    soft_limit_warned: bool,

    total_cutoffs: u64,
    total_ticks: u64,
    soft_limit_hits: u64,
    hard_limit_hits: u64,
}

impl std::fmt::Debug for TickBudgetGovernor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TickBudgetGovernor")
            .field("budget_ms", &self.budget_ms)
            .field("force_cutoff_ms", &self.force_cutoff_ms)
            .field("batch_check_size", &self.batch_check_size)
            .field("cutoff_triggered", &self.cutoff_triggered)
            .field("total_cutoffs", &self.total_cutoffs)
            .field("total_ticks", &self.total_ticks)
            .finish_non_exhaustive()
    }
}

impl TickBudgetGovernor {
    /// Creates a governor reading time from `clock`.
    pub fn new(config: &GovernanceConfig, clock: Arc<dyn Clock>) -> Self {
        log::info!(
            "Governor: initialized (budget: {}ms, cutoff: {}ms, batch: {})",
            config.tick_budget_ms,
            config.force_cutoff_ms,
            config.batch_check_size
        );
        Self {
            clock,
            budget_ms: config.tick_budget_ms,
            force_cutoff_ms: config.force_cutoff_ms,
            batch_check_size: config.batch_check_size.max(1),
            soft_limit_ms: config.overhead_soft_limit_ms,
            hard_limit_ms: config.overhead_hard_limit_ms,
            tick_start: None,
            work_this_tick: 0,
            cutoff_triggered: false,
            last_tick_ms: 0.0,
            overhead_ms: 0.0,
            intervention_start: None,
            soft_limit_warned: false,
            total_cutoffs: 0,
            total_ticks: 0,
            soft_limit_hits: 0,
            hard_limit_hits: 0,
        }
    }

    // ── Tick lifecycle ───────────────────────────────────────────────

    /// Opens the budget window and resets per-tick state.
    pub fn begin_tick(&mut self) {
        self.tick_start = Some(self.clock.now());
        self.work_this_tick = 0;
        self.cutoff_triggered = false;
        self.overhead_ms = 0.0;
        self.intervention_start = None;
        self.soft_limit_warned = false;
    }

    /// Closes the window and returns the measured tick duration in ms.
    ///
    /// Without a matching [`TickBudgetGovernor::begin_tick`] nothing is
    /// recorded and `None` is returned.
    pub fn end_tick(&mut self) -> Option<f64> {
        self.tick_start?;
        let elapsed = self.elapsed_ms();
        self.end_tick_with(elapsed);
        Some(elapsed)
    }

    /// Closes the window with an externally measured duration.
    pub fn end_tick_with(&mut self, duration_ms: f64) {
        self.last_tick_ms = duration_ms;
        self.total_ticks += 1;
        self.tick_start = None;
    }

    // ── Cutoff ───────────────────────────────────────────────────────

    /// Whether elastic work may continue in this tick.
    pub fn should_continue(&mut self) -> bool {
        self.work_this_tick = self.work_this_tick.wrapping_add(1);

        if self.cutoff_triggered {
            return false;
        }
        if self.work_this_tick % self.batch_check_size != 0 {
            return true;
        }

        let elapsed = self.elapsed_ms();
        if elapsed >= self.force_cutoff_ms {
            self.cutoff_triggered = true;
            self.total_cutoffs += 1;
            if self.total_cutoffs % 100 == 1 {
                log::debug!(
                    "Governor: cutoff triggered at {:.2}ms (total: {})",
                    elapsed,
                    self.total_cutoffs
                );
            }
            return false;
        }
        true
    }

    /// Time since [`TickBudgetGovernor::begin_tick`]; 0 outside a tick.
    pub fn elapsed_ms(&self) -> f64 {
        match self.tick_start {
            Some(start) => self.clock.now().saturating_sub(start).as_secs_f64() * 1000.0,
            None => 0.0,
        }
    }

    /// Whether the cutoff fired in the current tick.
    pub fn is_cut_off(&self) -> bool {
        self.cutoff_triggered
    }

    /// Calls to [`TickBudgetGovernor::should_continue`] in the current tick.
    pub fn work_this_tick(&self) -> u32 {
        self.work_this_tick
    }

    // ── Overhead accounting ──────────────────────────────────────────

    /// Marks the start of a governance intervention.
    pub fn begin_intervention(&mut self) {
        self.intervention_start = Some(self.clock.now());
    }

    /// Adds the time since [`TickBudgetGovernor::begin_intervention`] to this
    /// tick's overhead.
    pub fn end_intervention(&mut self) {
        if let Some(start) = self.intervention_start.take() {
            self.overhead_ms += self.clock.now().saturating_sub(start).as_secs_f64() * 1000.0;
        }
    }

    /// Whether another intervention fits into this tick's overhead budget.
    pub fn can_intervene(&mut self) -> OverheadCheck {
        if self.overhead_ms >= self.hard_limit_ms {
            self.hard_limit_hits += 1;
            return OverheadCheck::HardLimit;
        }
        if self.overhead_ms >= self.soft_limit_ms && !self.soft_limit_warned {
            self.soft_limit_warned = true;
            self.soft_limit_hits += 1;
            return OverheadCheck::SoftLimitCrossed;
        }
        OverheadCheck::Within
    }

    /// Governance overhead accumulated in this tick.
    pub fn overhead_ms(&self) -> f64 {
        self.overhead_ms
    }

    // ── Statistics ───────────────────────────────────────────────────

    /// Duration of the last completed tick.
    pub fn last_tick_ms(&self) -> f64 {
        self.last_tick_ms
    }

    /// Whether the last completed tick exceeded the nominal budget.
    pub fn last_tick_over_budget(&self) -> bool {
        self.last_tick_ms > self.budget_ms
    }

    /// Lifetime cutoffs.
    pub fn total_cutoffs(&self) -> u64 {
        self.total_cutoffs
    }

    /// Lifetime completed ticks.
    pub fn total_ticks(&self) -> u64 {
        self.total_ticks
    }

    /// Lifetime soft limit crossings.
    pub fn soft_limit_hits(&self) -> u64 {
        self.soft_limit_hits
    }

    /// Lifetime hard limit refusals.
    pub fn hard_limit_hits(&self) -> u64 {
        self.hard_limit_hits
    }

    /// Fraction of ticks that were cut off.
    pub fn cutoff_ratio(&self) -> f64 {
        if self.total_ticks == 0 {
            0.0
        } else {
            self.total_cutoffs as f64 / self.total_ticks as f64
        }
    }

    /// Zeroes lifetime statistics.
    pub fn reset_stats(&mut self) {
        self.total_cutoffs = 0;
        self.total_ticks = 0;
        self.soft_limit_hits = 0;
        self.hard_limit_hits = 0;
    }
}
