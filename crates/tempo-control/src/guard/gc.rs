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

//! Memory-pressure guard.
//!
//! Entry into a diet and collections are driven by [`PressureSample`]s; the
//! recovery ramps and the diet deadman advance once per engine tick, so a
//! sampler that goes quiet cannot pin the guard in a restricted state.

use super::pressure::GcPressureSignal;
use super::{Guard, GuardFlag, GUARD_GC};
use crate::error::GovernanceError;
use crate::failsoft::{ErrorBudget, ErrorVerdict};
use tempo_core::{GcGuardState, GovernanceConfig, InterventionReason, PressureSample, Transition};

/// GC pressure state machine.
#[derive(Debug, Clone)]
pub struct GcPressureGuard {
    enabled: bool,
    diet_threshold: f64,
    recovery_threshold: f64,
    diet_multiplier: f64,
    critical_multiplier: f64,
    recovery_ticks: u32,
    hysteresis_window: u32,
    post_gc_ticks: u32,
    max_diet_ticks: u32,

    state: GcGuardState,
    signal: GcPressureSignal,
    stability_counter: u32,
    recovery_tick: u32,
    post_gc_tick: u32,
    diet_tick: u32,
    errors: ErrorBudget,

    transitions: u64,
    diet_ticks: u64,
    recovering_ticks: u64,
    post_gc_ticks_spent: u64,
    deadman_trips: u64,
    last_reason: Option<InterventionReason>,
}

impl GcPressureGuard {
    /// Creates a guard in NORMAL.
    pub fn new(config: &GovernanceConfig) -> Self {
        log::info!(
            "GcGuard: initialized (enabled: {}, diet >= {:.2}, recovery < {:.2})",
            config.gc_guard_enabled,
            config.gc_diet_threshold,
            config.gc_recovery_threshold
        );
        Self {
            enabled: config.gc_guard_enabled,
            diet_threshold: config.gc_diet_threshold,
            recovery_threshold: config.gc_recovery_threshold,
            diet_multiplier: config.gc_diet_multiplier,
            critical_multiplier: config.gc_critical_multiplier,
            recovery_ticks: config.gc_recovery_ticks.max(1),
            hysteresis_window: config.gc_hysteresis_window.max(1),
            post_gc_ticks: config.gc_post_gc_recovery_ticks.max(1),
            max_diet_ticks: config.gc_max_diet_ticks.max(1),
            state: GcGuardState::Normal,
            signal: GcPressureSignal::normal(),
            stability_counter: 0,
            recovery_tick: 0,
            post_gc_tick: 0,
            diet_tick: 0,
            errors: ErrorBudget::new(config.gc_max_errors),
            transitions: 0,
            diet_ticks: 0,
            recovering_ticks: 0,
            post_gc_ticks_spent: 0,
            deadman_trips: 0,
            last_reason: None,
        }
    }

    /// Feeds one pressure sample together with the current tick jitter.
    pub fn on_sample(
        &mut self,
        sample: &PressureSample,
        tick_jitter_ms: f64,
    ) -> Option<Transition<GcGuardState>> {
        if !self.is_operational() {
            return None;
        }
        match GcPressureSignal::from_sample(sample, tick_jitter_ms) {
            Ok(signal) => {
                self.errors.record_success();
                self.signal = signal;
                self.advance()
            }
            Err(err) => self.record_fault(err),
        }
    }

    /// Advances the tick-driven parts of the machine: the RECOVERING and
    /// POST_GC_RECOVERY ramps and the DIET deadman.
    pub fn tick(&mut self) -> Option<Transition<GcGuardState>> {
        if !self.is_operational() {
            return None;
        }
        match self.state {
            GcGuardState::Normal => None,
            GcGuardState::Diet => {
                self.diet_ticks += 1;
                self.diet_tick += 1;
                if self.diet_tick < self.max_diet_ticks {
                    return None;
                }
                self.deadman_trips += 1;
                log::warn!(
                    "GcGuard: deadman after {} ticks in DIET, forcing recovery",
                    self.diet_tick
                );
                self.enter_recovering()
            }
            GcGuardState::Recovering => {
                self.recovering_ticks += 1;
                self.recovery_tick += 1;
                if self.recovery_tick >= self.recovery_ticks {
                    self.set_state(GcGuardState::Normal, None)
                } else {
                    None
                }
            }
            GcGuardState::PostGcRecovery => {
                self.post_gc_ticks_spent += 1;
                self.post_gc_tick += 1;
                if self.post_gc_tick < self.post_gc_ticks {
                    None
                } else if self.signal.pressure() >= self.diet_threshold {
                    self.enter_diet()
                } else {
                    self.set_state(GcGuardState::Normal, None)
                }
            }
        }
    }

    /// Counts a fault against this guard. On trip the guard returns to
    /// NORMAL and stays out of the way until reset.
    pub fn record_fault(&mut self, error: GovernanceError) -> Option<Transition<GcGuardState>> {
        let message = error.to_string();
        match self.errors.record_error(error) {
            ErrorVerdict::Tolerated => {
                log::warn!(
                    "GcGuard: error {}/{}: {}",
                    self.errors.consecutive(),
                    self.errors.ceiling(),
                    message
                );
                None
            }
            ErrorVerdict::Tripped => {
                log::error!(
                    "GcGuard: {} consecutive errors, guard DISABLED ({})",
                    self.errors.ceiling(),
                    message
                );
                self.signal = GcPressureSignal::normal();
                self.set_state(GcGuardState::Normal, None)
            }
            ErrorVerdict::AlreadyDisabled => None,
        }
    }

    fn advance(&mut self) -> Option<Transition<GcGuardState>> {
        let pressure = self.signal.pressure();
        let gc = self.signal.gc_occurred();

        match self.state {
            GcGuardState::Normal => {
                if gc {
                    self.enter_post_gc()
                } else if pressure >= self.diet_threshold {
                    self.enter_diet()
                } else {
                    None
                }
            }
            GcGuardState::Diet => {
                if gc {
                    return self.enter_post_gc();
                }
                if pressure < self.recovery_threshold {
                    self.stability_counter += 1;
                    if self.stability_counter >= self.hysteresis_window {
                        return self.enter_recovering();
                    }
                } else {
                    self.stability_counter = 0;
                }
                None
            }
            GcGuardState::Recovering => {
                if gc {
                    self.enter_post_gc()
                } else if pressure >= self.diet_threshold {
                    self.enter_diet()
                } else {
                    None
                }
            }
            GcGuardState::PostGcRecovery => {
                // A further collection restarts the ramp.
                if gc {
                    self.post_gc_tick = 0;
                }
                None
            }
        }
    }

    fn enter_diet(&mut self) -> Option<Transition<GcGuardState>> {
        self.stability_counter = 0;
        self.diet_tick = 0;
        self.set_state(GcGuardState::Diet, Some(InterventionReason::GcPressureDiet))
    }

    fn enter_recovering(&mut self) -> Option<Transition<GcGuardState>> {
        self.recovery_tick = 0;
        self.set_state(
            GcGuardState::Recovering,
            Some(InterventionReason::GcPressureRecovering),
        )
    }

    fn enter_post_gc(&mut self) -> Option<Transition<GcGuardState>> {
        self.post_gc_tick = 0;
        self.set_state(
            GcGuardState::PostGcRecovery,
            Some(InterventionReason::GcPressurePostGc),
        )
    }

    fn set_state(
        &mut self,
        next: GcGuardState,
        reason: Option<InterventionReason>,
    ) -> Option<Transition<GcGuardState>> {
        let change = Transition::between(self.state, next)?;
        self.state = next;
        self.transitions += 1;
        self.last_reason = reason;
        log::info!(
            "GcGuard: {:?} → {:?} (pressure {:.2})",
            change.from,
            change.to,
            self.signal.pressure()
        );
        Some(change)
    }

    fn is_operational(&self) -> bool {
        self.enabled && !self.errors.is_disabled()
    }

    /// Current state.
    pub fn state(&self) -> GcGuardState {
        self.state
    }

    /// Last accepted pressure signal.
    pub fn signal(&self) -> GcPressureSignal {
        self.signal
    }

    /// Whether the error budget is exhausted.
    pub fn is_failed(&self) -> bool {
        self.errors.is_disabled()
    }

    /// Lifetime state changes.
    pub fn transitions(&self) -> u64 {
        self.transitions
    }

    /// Ticks spent in DIET, RECOVERING and POST_GC_RECOVERY.
    pub fn ticks_per_state(&self) -> (u64, u64, u64) {
        (self.diet_ticks, self.recovering_ticks, self.post_gc_ticks_spent)
    }

    /// Diets ended by the deadman rather than by low pressure.
    pub fn deadman_trips(&self) -> u64 {
        self.deadman_trips
    }

    /// Returns to NORMAL and clears the error budget.
    pub fn reset(&mut self) {
        self.state = GcGuardState::Normal;
        self.signal = GcPressureSignal::normal();
        self.stability_counter = 0;
        self.recovery_tick = 0;
        self.post_gc_tick = 0;
        self.diet_tick = 0;
        self.errors.reset();
        self.transitions = 0;
        self.diet_ticks = 0;
        self.recovering_ticks = 0;
        self.post_gc_ticks_spent = 0;
        self.deadman_trips = 0;
        self.last_reason = None;
    }

    fn ramp(&self, progress: u32, span: u32) -> f64 {
        let t = (progress as f64 / span as f64).clamp(0.0, 1.0);
        self.diet_multiplier + (1.0 - self.diet_multiplier) * t
    }
}

impl Guard for GcPressureGuard {
    fn name(&self) -> &'static str {
        "GcGuard"
    }

    fn flag(&self) -> GuardFlag {
        GUARD_GC
    }

    fn is_active(&self) -> bool {
        self.is_operational() && self.state != GcGuardState::Normal
    }

    fn multiplier(&self) -> f64 {
        if !self.is_operational() {
            return 1.0;
        }
        match self.state {
            GcGuardState::Normal => 1.0,
            GcGuardState::Diet => {
                if self.signal.is_critical() {
                    self.critical_multiplier
                } else {
                    self.diet_multiplier
                }
            }
            GcGuardState::Recovering => self.ramp(self.recovery_tick, self.recovery_ticks),
            GcGuardState::PostGcRecovery => self.ramp(self.post_gc_tick, self.post_gc_ticks),
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

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn quiet() -> PressureSample {
        PressureSample::new(0.1, 0.0, 0)
    }

    fn heavy() -> PressureSample {
        // 0.4 + 0.3 = 0.70, HIGH but not critical.
        PressureSample::new(1.0, 8.0, 0)
    }

    fn collected() -> PressureSample {
        PressureSample::new(0.3, 2.0, 1)
    }

    #[test]
    fn test_high_pressure_enters_diet() {
        let mut guard = GcPressureGuard::new(&GovernanceConfig::default());
        assert_eq!(guard.on_sample(&quiet(), 0.0), None);
        let change = guard.on_sample(&heavy(), 0.0);
        assert_eq!(change.map(|c| c.to), Some(GcGuardState::Diet));
        assert_relative_eq!(guard.multiplier(), 0.65);
        assert_eq!(guard.last_reason(), Some(InterventionReason::GcPressureDiet));
    }

    #[test]
    fn test_critical_pressure_uses_critical_multiplier() {
        let mut guard = GcPressureGuard::new(&GovernanceConfig::default());
        guard.on_sample(&PressureSample::new(1.0, 8.0, 0), 20.0);
        // 0.4 + 0.3 + 0.1 = 0.80
        assert!(guard.signal().is_critical());
        assert_relative_eq!(guard.multiplier(), 0.45);
    }

    #[test]
    fn test_diet_recovers_after_hysteresis_window() {
        let mut guard = GcPressureGuard::new(&GovernanceConfig::default());
        guard.on_sample(&heavy(), 0.0);
        for _ in 0..29 {
            assert_eq!(guard.on_sample(&quiet(), 0.0), None);
        }
        let change = guard.on_sample(&quiet(), 0.0);
        assert_eq!(change.map(|c| c.to), Some(GcGuardState::Recovering));
        assert_relative_eq!(guard.multiplier(), 0.65);

        // Samples alone do not move the ramp.
        for _ in 0..30 {
            guard.on_sample(&quiet(), 0.0);
        }
        assert_relative_eq!(guard.multiplier(), 0.65);

        for _ in 0..30 {
            assert_eq!(guard.tick(), None);
        }
        // Halfway through the 60-tick ramp.
        assert_relative_eq!(guard.multiplier(), 0.825, epsilon = 1e-9);
        for _ in 0..29 {
            guard.tick();
        }
        let change = guard.tick();
        assert_eq!(change.map(|c| c.to), Some(GcGuardState::Normal));
        assert_relative_eq!(guard.multiplier(), 1.0);
        assert_eq!(guard.ticks_per_state(), (0, 60, 0));
    }

    #[test]
    fn test_collection_starts_post_gc_ramp() {
        let mut guard = GcPressureGuard::new(&GovernanceConfig::default());
        let change = guard.on_sample(&collected(), 0.0);
        assert_eq!(change.map(|c| c.to), Some(GcGuardState::PostGcRecovery));
        assert_relative_eq!(guard.multiplier(), 0.65);

        for _ in 0..10 {
            guard.tick();
        }
        assert!(guard.multiplier() > 0.65);
        // Another collection restarts the ramp without a transition.
        assert_eq!(guard.on_sample(&collected(), 0.0), None);
        assert_relative_eq!(guard.multiplier(), 0.65);

        for _ in 0..44 {
            guard.tick();
        }
        assert_eq!(guard.state(), GcGuardState::PostGcRecovery);
        let change = guard.tick();
        assert_eq!(change.map(|c| c.to), Some(GcGuardState::Normal));
    }

    #[test]
    fn test_post_gc_returns_to_diet_under_pressure() {
        let config = GovernanceConfig {
            gc_post_gc_recovery_ticks: 3,
            ..GovernanceConfig::default()
        };
        let mut guard = GcPressureGuard::new(&config);
        guard.on_sample(&collected(), 0.0);
        assert_eq!(guard.on_sample(&heavy(), 0.0), None);
        guard.tick();
        guard.tick();
        let change = guard.tick();
        assert_eq!(change.map(|c| c.to), Some(GcGuardState::Diet));
    }

    #[test]
    fn test_diet_without_samples_hits_deadman() {
        let config = GovernanceConfig {
            gc_max_diet_ticks: 100,
            ..GovernanceConfig::default()
        };
        let mut guard = GcPressureGuard::new(&config);
        guard.on_sample(&heavy(), 0.0);
        for _ in 0..99 {
            assert_eq!(guard.tick(), None);
        }
        assert_eq!(guard.state(), GcGuardState::Diet);

        let change = guard.tick();
        assert_eq!(change.map(|c| c.to), Some(GcGuardState::Recovering));
        assert_eq!(guard.deadman_trips(), 1);
        assert_eq!(
            guard.last_reason(),
            Some(InterventionReason::GcPressureRecovering)
        );

        for _ in 0..60 {
            guard.tick();
        }
        assert_eq!(guard.state(), GcGuardState::Normal);
        assert_relative_eq!(guard.multiplier(), 1.0);
    }

    #[test]
    fn test_fresh_heavy_sample_restarts_deadman() {
        let config = GovernanceConfig {
            gc_max_diet_ticks: 10,
            ..GovernanceConfig::default()
        };
        let mut guard = GcPressureGuard::new(&config);
        guard.on_sample(&heavy(), 0.0);
        for _ in 0..10 {
            guard.tick();
        }
        assert_eq!(guard.state(), GcGuardState::Recovering);
        // Pressure returns, so the diet starts over with a fresh deadline.
        let change = guard.on_sample(&heavy(), 0.0);
        assert_eq!(change.map(|c| c.to), Some(GcGuardState::Diet));
        for _ in 0..9 {
            assert_eq!(guard.tick(), None);
        }
        assert_eq!(guard.state(), GcGuardState::Diet);
    }

    #[test]
    fn test_invalid_samples_disable_guard() {
        let mut guard = GcPressureGuard::new(&GovernanceConfig::default());
        guard.on_sample(&heavy(), 0.0);
        let bad = PressureSample::new(f64::NAN, 0.0, 0);
        for _ in 0..4 {
            assert_eq!(guard.on_sample(&bad, 0.0), None);
        }
        assert!(!guard.is_failed());
        let change = guard.on_sample(&bad, 0.0);
        assert_eq!(change.map(|c| c.to), Some(GcGuardState::Normal));
        assert!(guard.is_failed());

        // Ignored from now on.
        assert_eq!(guard.on_sample(&heavy(), 0.0), None);
        assert_relative_eq!(guard.multiplier(), 1.0);
        assert!(!guard.is_active());
    }

    #[test]
    fn test_disabled_guard_never_intervenes() {
        let config = GovernanceConfig {
            gc_guard_enabled: false,
            ..GovernanceConfig::default()
        };
        let mut guard = GcPressureGuard::new(&config);
        assert_eq!(guard.on_sample(&heavy(), 0.0), None);
        assert_relative_eq!(guard.multiplier(), 1.0);
    }
}
