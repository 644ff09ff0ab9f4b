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

//! Save-aware guard.
//!
//! ```text
//! IDLE ─save begin─► ENTER ─enter_ticks─► ACTIVE ─save end / deadman─► EXIT
//!   ▲                  └──────────save end──────────────────────────────┘│
//!   └──────────── COOLDOWN ◄──────────── recovery_ticks ─────────────────┘
//! ```
//!
//! Every counter is measured in ticks, so the guard replays deterministically.

use super::{Guard, GuardFlag, GUARD_IO};
use crate::error::GovernanceError;
use crate::failsoft::{ErrorBudget, ErrorVerdict};
use tempo_core::{GovernanceConfig, InterventionReason, IoGuardState, SaveKind, Transition};

/// Lifetime save statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IoStats {
    /// Saves that completed or timed out.
    pub total_saves: u64,
    /// Sum of save durations, in ticks.
    pub total_save_ticks: u64,
    /// Longest save, in ticks.
    pub max_save_ticks: u32,
    /// Deadman timeouts.
    pub timeouts: u64,
    /// Saves reported as failed by the host.
    pub failed_saves: u64,
}

/// IO guard state machine.
#[derive(Debug, Clone)]
pub struct IoGuard {
    enabled: bool,
    world_save_only: bool,
    enter_multiplier: f64,
    active_multiplier: f64,
    cooldown_multiplier: f64,
    enter_ticks: u32,
    recovery_ticks: u32,
    cooldown_ticks: u32,
    active_timeout_ticks: u32,

    state: IoGuardState,
    remaining: u32,
    active_elapsed: u32,
    save_ticks: u32,
    current_save: Option<String>,
    errors: ErrorBudget,
    stats: IoStats,
    last_reason: Option<InterventionReason>,
}

impl IoGuard {
    /// Creates a guard in IDLE.
    pub fn new(config: &GovernanceConfig) -> Self {
        log::info!(
            "IoGuard: initialized (enabled: {}, world saves only: {}, deadman: {} ticks)",
            config.io_guard_enabled,
            config.io_world_save_only,
            config.io_active_timeout_ticks
        );
        Self {
            enabled: config.io_guard_enabled,
            world_save_only: config.io_world_save_only,
            enter_multiplier: config.io_enter_multiplier,
            active_multiplier: config.io_active_multiplier,
            cooldown_multiplier: config.io_cooldown_multiplier,
            enter_ticks: config.io_enter_ticks.max(1),
            recovery_ticks: config.io_recovery_ticks.max(1),
            cooldown_ticks: config.io_cooldown_ticks.max(1),
            active_timeout_ticks: config.io_active_timeout_ticks.max(1),
            state: IoGuardState::Idle,
            remaining: 0,
            active_elapsed: 0,
            save_ticks: 0,
            current_save: None,
            errors: ErrorBudget::new(config.io_max_errors),
            stats: IoStats::default(),
            last_reason: None,
        }
    }

    /// A save is about to start. Ignored unless IDLE or COOLDOWN.
    pub fn on_save_begin(&mut self, kind: SaveKind, name: &str) -> Option<Transition<IoGuardState>> {
        if !self.is_operational() {
            return None;
        }
        if self.world_save_only && kind != SaveKind::World {
            log::trace!("IoGuard: ignoring {:?} save '{}'", kind, name);
            return None;
        }
        if !matches!(self.state, IoGuardState::Idle | IoGuardState::Cooldown) {
            log::debug!("IoGuard: save '{}' began while {:?}, ignored", name, self.state);
            return None;
        }
        self.remaining = self.enter_ticks;
        self.active_elapsed = 0;
        self.save_ticks = 0;
        self.current_save = Some(name.to_owned());
        self.set_state(IoGuardState::Enter, Some(InterventionReason::IoGuardActive))
    }

    /// The save finished. Ignored unless ENTER or ACTIVE.
    pub fn on_save_end(&mut self, success: bool) -> Option<Transition<IoGuardState>> {
        if !self.is_operational() {
            return None;
        }
        if !matches!(self.state, IoGuardState::Enter | IoGuardState::Active) {
            return None;
        }
        if !success {
            self.stats.failed_saves += 1;
        }
        self.finish_save();
        self.enter_exit(InterventionReason::IoGuardRecovery)
    }

    /// Advances the tick counters. Call once per tick.
    pub fn tick(&mut self) -> Option<Transition<IoGuardState>> {
        if !self.is_operational() {
            return None;
        }
        match self.state {
            IoGuardState::Idle => None,
            IoGuardState::Enter => {
                self.save_ticks = self.save_ticks.saturating_add(1);
                self.remaining = self.remaining.saturating_sub(1);
                if self.remaining == 0 {
                    self.set_state(IoGuardState::Active, Some(InterventionReason::IoGuardActive))
                } else {
                    None
                }
            }
            IoGuardState::Active => {
                self.save_ticks = self.save_ticks.saturating_add(1);
                self.active_elapsed += 1;
                if self.active_elapsed > self.active_timeout_ticks {
                    self.stats.timeouts += 1;
                    log::warn!(
                        "IoGuard: deadman timeout after {} ticks waiting for '{}' to finish",
                        self.active_elapsed,
                        self.current_save.as_deref().unwrap_or("<unnamed>")
                    );
                    self.finish_save();
                    self.enter_exit(InterventionReason::IoGuardTimeout)
                } else {
                    None
                }
            }
            IoGuardState::Exit => {
                self.remaining = self.remaining.saturating_sub(1);
                if self.remaining == 0 {
                    self.remaining = self.cooldown_ticks;
                    self.set_state(
                        IoGuardState::Cooldown,
                        Some(InterventionReason::IoGuardRecovery),
                    )
                } else {
                    None
                }
            }
            IoGuardState::Cooldown => {
                self.remaining = self.remaining.saturating_sub(1);
                if self.remaining == 0 {
                    self.set_state(IoGuardState::Idle, None)
                } else {
                    None
                }
            }
        }
    }

    /// Counts a fault raised by the host's save hooks. On trip the guard
    /// returns to IDLE and stays out of the way until reset.
    pub fn record_fault(&mut self, error: GovernanceError) -> Option<Transition<IoGuardState>> {
        let message = error.to_string();
        match self.errors.record_error(error) {
            ErrorVerdict::Tolerated => {
                log::warn!(
                    "IoGuard: error {}/{}: {}",
                    self.errors.consecutive(),
                    self.errors.ceiling(),
                    message
                );
                None
            }
            ErrorVerdict::Tripped => {
                log::error!(
                    "IoGuard: {} consecutive errors, guard DISABLED ({})",
                    self.errors.ceiling(),
                    message
                );
                self.current_save = None;
                self.set_state(IoGuardState::Idle, None)
            }
            ErrorVerdict::AlreadyDisabled => None,
        }
    }

    /// A hook call completed cleanly.
    pub fn record_success(&mut self) {
        self.errors.record_success();
    }

    fn finish_save(&mut self) {
        self.stats.total_saves += 1;
        self.stats.total_save_ticks += u64::from(self.save_ticks);
        self.stats.max_save_ticks = self.stats.max_save_ticks.max(self.save_ticks);
        self.current_save = None;
    }

    fn enter_exit(&mut self, reason: InterventionReason) -> Option<Transition<IoGuardState>> {
        self.remaining = self.recovery_ticks;
        self.set_state(IoGuardState::Exit, Some(reason))
    }

    fn set_state(
        &mut self,
        next: IoGuardState,
        reason: Option<InterventionReason>,
    ) -> Option<Transition<IoGuardState>> {
        let change = Transition::between(self.state, next)?;
        self.state = next;
        self.last_reason = reason;
        log::info!("IoGuard: {:?} → {:?}", change.from, change.to);
        Some(change)
    }

    fn is_operational(&self) -> bool {
        self.enabled && !self.errors.is_disabled()
    }

    /// Fraction of the EXIT ramp already covered.
    fn exit_progress(&self) -> f64 {
        1.0 - self.remaining as f64 / self.recovery_ticks as f64
    }

    /// Current state.
    pub fn state(&self) -> IoGuardState {
        self.state
    }

    /// Lifetime statistics.
    pub fn stats(&self) -> IoStats {
        self.stats
    }

    /// Whether the error budget is exhausted.
    pub fn is_failed(&self) -> bool {
        self.errors.is_disabled()
    }

    /// Returns to IDLE and clears statistics and the error budget.
    pub fn reset(&mut self) {
        self.state = IoGuardState::Idle;
        self.remaining = 0;
        self.active_elapsed = 0;
        self.save_ticks = 0;
        self.current_save = None;
        self.errors.reset();
        self.stats = IoStats::default();
        self.last_reason = None;
    }
}

impl Guard for IoGuard {
    fn name(&self) -> &'static str {
        "IoGuard"
    }

    fn flag(&self) -> GuardFlag {
        GUARD_IO
    }

    fn is_active(&self) -> bool {
        self.is_operational() && self.state != IoGuardState::Idle
    }

    fn multiplier(&self) -> f64 {
        if !self.is_operational() {
            return 1.0;
        }
        match self.state {
            IoGuardState::Idle => 1.0,
            IoGuardState::Enter => self.enter_multiplier,
            IoGuardState::Active => self.active_multiplier,
            IoGuardState::Exit => {
                let progress = self.exit_progress().clamp(0.0, 1.0);
                self.active_multiplier + (1.0 - self.active_multiplier) * progress
            }
            IoGuardState::Cooldown => self.cooldown_multiplier,
        }
    }

    fn last_reason(&self) -> Option<InterventionReason> {
        if self.is_active() {
            self.last_reason
        } else {
            None
        }
    }
}
