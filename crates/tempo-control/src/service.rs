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

//! The per-tick governance orchestrator.
//!
//! [`GovernanceEngine`] owns every component and drives them from the tick
//! thread. Evaluation order inside [`GovernanceEngine::end_tick`] is fixed:
//! fail-soft, panic protocol, adaptive gate, guards, throttle hysteresis.
//! Later stages read state the earlier ones already updated this tick.
//!
//! No public method returns an error. Internal faults are counted by the
//! [`FailsoftController`]; once it trips the engine behaves as if it were not
//! installed until [`GovernanceEngine::manual_reset`].

use crate::error::{check_non_negative, GovernanceError};
use crate::evaluator::GuardEvaluator;
use crate::failsoft::{ErrorVerdict, FailsoftController};
use crate::gate::AdaptiveGate;
use crate::governor::{OverheadCheck, TickBudgetGovernor};
use crate::guard::{
    GcPressureGuard, Guard, GuardFlag, IoGuard, StreamingGuard, VehicleGuard, GUARD_GC, GUARD_IO,
    GUARD_STREAMING, GUARD_VEHICLE,
};
use crate::panic::SpikePanicProtocol;
use crate::stats::RollingTickStats;
use crate::step::StepPolicy;
use crate::throttle::{HysteresisChange, ThrottleCalculator};
use crossbeam_channel::Sender;
use std::sync::Arc;
use std::time::Duration;
use tempo_core::telemetry::TelemetryEvent;
use tempo_core::{
    Clock, Engagement, GateState, GcGuardState, GovernanceConfig, InterventionReason,
    IoGuardState, MonotonicClock, ObjectId, PanicState, PressureSample, SaveKind, StepCategory,
    ThrottleLevel, WorldQuery,
};
use tempo_telemetry::{GovernanceCounters, TelemetryService, TelemetrySnapshot};

/// Adaptive tick-budget governance engine.
pub struct GovernanceEngine {
    config: GovernanceConfig,
    clock: Arc<dyn Clock>,
    world: Option<Box<dyn WorldQuery>>,
    observer: Option<Sender<TelemetryEvent>>,

    stats: RollingTickStats,
    governor: TickBudgetGovernor,
    panic: SpikePanicProtocol,
    gate: AdaptiveGate,
    throttle: ThrottleCalculator,
    io_guard: IoGuard,
    gc_guard: GcPressureGuard,
    streaming_guard: StreamingGuard,
    vehicle_guard: VehicleGuard,
    evaluator: GuardEvaluator,
    failsoft: FailsoftController,
    steps: StepPolicy,
    telemetry: TelemetryService,

    tick: u64,
    last_tick_at: Duration,
    faults_this_tick: u32,
    published_level: ThrottleLevel,
}

impl std::fmt::Debug for GovernanceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GovernanceEngine")
            .field("tick", &self.tick)
            .field("gate", &self.gate.state())
            .field("panic", &self.panic.state())
            .field("published_level", &self.published_level)
            .field("intervention_disabled", &self.failsoft.is_intervention_disabled())
            .field("has_world", &self.world.is_some())
            .field("has_observer", &self.observer.is_some())
            .finish_non_exhaustive()
    }
}

impl GovernanceEngine {
    /// Creates an engine reading wall-clock time.
    pub fn new(config: GovernanceConfig) -> Self {
        Self::with_clock(config, Arc::new(MonotonicClock::new()))
    }

    /// Creates an engine reading time from `clock`.
    ///
    /// An invalid configuration is logged and replaced by the defaults.
    pub fn with_clock(config: GovernanceConfig, clock: Arc<dyn Clock>) -> Self {
        let config = match config.validate() {
            Ok(()) => config,
            Err(err) => {
                log::warn!("Governance: invalid configuration ({}), using defaults", err);
                GovernanceConfig::default()
            }
        };
        log::info!(
            "Governance: engine created (throttling: {}, windows: {}/{} ticks)",
            config.throttling_enabled,
            config.window_short_ticks,
            config.window_long_ticks
        );
        Self {
            stats: RollingTickStats::from_config(&config),
            governor: TickBudgetGovernor::new(&config, Arc::clone(&clock)),
            panic: SpikePanicProtocol::new(&config),
            gate: AdaptiveGate::new(&config),
            throttle: ThrottleCalculator::new(&config),
            io_guard: IoGuard::new(&config),
            gc_guard: GcPressureGuard::new(&config),
            streaming_guard: StreamingGuard::new(&config),
            vehicle_guard: VehicleGuard::new(&config),
            evaluator: GuardEvaluator::new(),
            failsoft: FailsoftController::new(config.max_consecutive_errors),
            steps: StepPolicy::new(config.step_throttling_enabled),
            telemetry: TelemetryService::new(config.telemetry_summary_interval_ticks),
            clock,
            world: None,
            observer: None,
            tick: 0,
            last_tick_at: Duration::ZERO,
            faults_this_tick: 0,
            published_level: ThrottleLevel::Full,
            config,
        }
    }

    /// Attaches the host's world queries.
    pub fn with_world(mut self, world: Box<dyn WorldQuery>) -> Self {
        self.world = Some(world);
        self
    }

    /// Attaches an observer receiving state transitions. Events that do not
    /// fit into the channel are dropped.
    pub fn with_observer(mut self, observer: Sender<TelemetryEvent>) -> Self {
        self.observer = Some(observer);
        self
    }

    // ── Tick lifecycle ───────────────────────────────────────────────

    /// Opens the tick's budget window.
    pub fn begin_tick(&mut self) {
        self.governor.begin_tick();
    }

    /// Whether elastic work may continue in this tick.
    ///
    /// Always true while intervention is off or the gate is in passthrough.
    pub fn should_continue(&mut self) -> bool {
        if !self.is_intervening() {
            return true;
        }
        let already_cut = self.governor.is_cut_off();
        let proceed = self.governor.should_continue();
        if !already_cut && self.governor.is_cut_off() {
            self.telemetry.counters_ref().record_cutoff();
        }
        proceed
    }

    /// Closes the tick, measuring its duration with the governor's clock.
    ///
    /// Without a matching [`GovernanceEngine::begin_tick`] there is no
    /// duration to record and the tick is not evaluated.
    pub fn end_tick(&mut self) {
        match self.governor.end_tick() {
            Some(duration_ms) => self.evaluate_tick(duration_ms),
            None => log::debug!("Governance: end_tick without begin_tick, ignored"),
        }
    }

    /// Closes the tick with a duration measured by the host.
    pub fn end_tick_with_duration(&mut self, duration_ms: f64) {
        self.governor.end_tick_with(duration_ms);
        self.evaluate_tick(duration_ms);
    }

    fn evaluate_tick(&mut self, duration_ms: f64) {
        self.tick += 1;
        let tick = self.tick;

        // ── 1. Record ────────────────────────────────────────────────
        let duration_ms = match check_non_negative("tick_duration_ms", duration_ms) {
            Ok(ms) => ms,
            Err(err) => {
                self.fault(err);
                self.finish_tick();
                return;
            }
        };
        // Telemetry keeps counting while fail-soft is tripped.
        self.telemetry.counters_ref().record_tick(duration_ms);

        // ── 2. Fail-soft short-circuit ───────────────────────────────
        if self.failsoft.is_intervention_disabled() {
            self.finish_tick();
            return;
        }
        self.stats.record(duration_ms);
        self.streaming_guard.record_tick(duration_ms);

        // ── 3. Panic protocol ────────────────────────────────────────
        let mut now = self.clock.now();
        if now < self.last_tick_at {
            self.fault(GovernanceError::InvalidState {
                component: "Clock",
                detail: format!(
                    "time went backwards ({:?} < {:?})",
                    now, self.last_tick_at
                ),
            });
            now = self.last_tick_at;
        }
        self.last_tick_at = now;
        if let Some(transition) = self.panic.record_tick(duration_ms, now) {
            if transition.to == PanicState::Panic {
                self.telemetry.counters_ref().record_panic_entry();
            }
            self.emit(TelemetryEvent::Panic { tick, transition });
        }

        // ── 4. Adaptive gate ─────────────────────────────────────────
        if let Some(transition) = self.gate.evaluate_this_tick(&self.stats, self.panic.state()) {
            self.telemetry
                .counters_ref()
                .record_gate_transition(transition.to == GateState::Active);
            self.emit(TelemetryEvent::Gate { tick, transition });
        }

        // ── 5. Guards ────────────────────────────────────────────────
        if let Some(transition) = self.io_guard.tick() {
            self.emit(TelemetryEvent::IoGuard { tick, transition });
        }
        if let Some(transition) = self.gc_guard.tick() {
            self.emit(TelemetryEvent::GcGuard { tick, transition });
        }
        let (speed, vehicle_speed) = match self.world.as_deref() {
            Some(world) => (world.observer_speed(), world.observer_vehicle_speed_kmh()),
            None => (Ok(0.0), Ok(None)),
        };
        self.streaming_guard.update(speed);
        self.vehicle_guard.update(vehicle_speed);
        let guards: [&dyn Guard; 4] = [
            &self.io_guard,
            &self.gc_guard,
            &self.streaming_guard,
            &self.vehicle_guard,
        ];
        let rising = self.evaluator.update_for_tick(&guards);
        self.record_guard_activations(rising);

        // ── 6. Throttle hysteresis ───────────────────────────────────
        match self.throttle.update_for_tick(&self.stats) {
            Some(HysteresisChange::Escalated { level, reason }) => {
                self.telemetry
                    .counters_ref()
                    .record_hysteresis_escalation(reason);
                self.emit(TelemetryEvent::Hysteresis {
                    tick,
                    active: true,
                    level,
                    reason: Some(reason),
                });
            }
            Some(HysteresisChange::Released) => self.emit(TelemetryEvent::Hysteresis {
                tick,
                active: false,
                level: ThrottleLevel::Full,
                reason: None,
            }),
            None => {}
        }

        // ── 7. Reasons ───────────────────────────────────────────────
        let counters = self.telemetry.counters_ref();
        if self.panic.state() != PanicState::Normal {
            if let Some(reason) = self.panic.last_reason() {
                counters.record_reason(reason);
            }
        }
        if let Some(reason) = self.evaluator.last_reason() {
            counters.record_reason(reason);
        }
        if let Some(reason) = self.throttle.hysteresis().last_reason() {
            counters.record_reason(reason);
        }

        self.finish_tick();
    }

    /// Publishes the tick's decision and settles the fault budget.
    fn finish_tick(&mut self) {
        if self.faults_this_tick == 0 {
            self.failsoft.record_success();
        }
        self.faults_this_tick = 0;

        self.published_level = if self.is_intervening() {
            self.system_floor().unwrap_or(ThrottleLevel::Full)
        } else {
            ThrottleLevel::Full
        };
        let counters = self.telemetry.counters_ref();
        counters.set_budget_multiplier(self.current_budget_multiplier());
        counters.set_intervention_disabled(self.failsoft.is_intervention_disabled());
        self.telemetry.tick();
    }

    fn guard_views(&self) -> [&dyn Guard; 4] {
        [
            &self.io_guard,
            &self.gc_guard,
            &self.streaming_guard,
            &self.vehicle_guard,
        ]
    }

    fn record_guard_activations(&self, rising: GuardFlag) {
        let counters = self.telemetry.counters_ref();
        for guard in self.guard_views() {
            if rising & guard.flag() == 0 {
                continue;
            }
            log::debug!("Governance: {} engaged", guard.name());
            if let Some(reason) = guard.last_reason() {
                counters.record_guard_activation(reason);
            }
        }
    }

    // ── Decisions ────────────────────────────────────────────────────

    /// False while switched off, tripped, in gate passthrough, or passive
    /// behind a fast vehicle.
    fn is_intervening(&self) -> bool {
        self.config.throttling_enabled
            && !self.failsoft.is_intervention_disabled()
            && !self.gate.is_passthrough()
            && !self.evaluator.has(GUARD_VEHICLE)
    }

    fn combined_multiplier(&self) -> f64 {
        self.panic
            .multiplier()
            .min(self.evaluator.multiplier())
            .max(self.config.min_budget_multiplier)
    }

    /// Most conservative level forced on every object, if any.
    fn system_floor(&self) -> Option<ThrottleLevel> {
        [
            self.throttle.hysteresis_floor(),
            self.evaluator.override_level(),
            ThrottleLevel::from_multiplier(self.combined_multiplier()),
        ]
        .into_iter()
        .flatten()
        .reduce(ThrottleLevel::most_conservative)
    }

    /// Throttle level for an object at `distance_sq` from the nearest actor.
    ///
    /// `Full` while the engine is not intervening (switched off, fail-soft
    /// tripped, gate in passthrough, or passive behind a fast vehicle), and
    /// for engaged objects. Otherwise
    /// the distance tier, the hysteresis floor, the panic multiplier and the
    /// guards each propose a level and the most conservative one wins. After
    /// a governor cutoff the distance tier is skipped and the hysteresis
    /// level is held.
    pub fn current_throttle_level(&self, distance_sq: f64, engagement: Engagement) -> ThrottleLevel {
        if !self.is_intervening() {
            return ThrottleLevel::Full;
        }
        let counters = self.telemetry.counters_ref();
        if engagement.is_engaged() {
            counters.record_engaged_upgrade();
            counters.record_throttle_decision(ThrottleLevel::Full);
            return ThrottleLevel::Full;
        }
        let base = if self.governor.is_cut_off() {
            self.throttle.hysteresis().level()
        } else {
            self.throttle.calculate(distance_sq)
        };
        let level = match self.system_floor() {
            Some(floor) => base.most_conservative(floor),
            None => base,
        };
        counters.record_throttle_decision(level);
        level
    }

    /// Throttle level for a host object, resolved through the attached
    /// [`WorldQuery`].
    ///
    /// Returns `Full` without querying anything while the engine is not
    /// intervening, when no world is attached, or when the governance
    /// overhead for this tick hit its hard limit. A failed query is an
    /// internal fault and also yields `Full`.
    pub fn throttle_level_for(&mut self, object: ObjectId) -> ThrottleLevel {
        if !self.is_intervening() {
            return ThrottleLevel::Full;
        }
        match self.governor.can_intervene() {
            OverheadCheck::Within => {}
            OverheadCheck::SoftLimitCrossed => self
                .telemetry
                .counters_ref()
                .record_reason(InterventionReason::BudgetSoftLimit),
            OverheadCheck::HardLimit => {
                self.telemetry
                    .counters_ref()
                    .record_reason(InterventionReason::BudgetHardLimit);
                return ThrottleLevel::Full;
            }
        }

        let queried = match self.world.as_deref() {
            Some(world) => {
                self.governor.begin_intervention();
                let result = world
                    .distance_squared_to_nearest_actor(object)
                    .and_then(|distance_sq| Ok((distance_sq, world.engagement(object)?)));
                self.governor.end_intervention();
                result
            }
            None => return ThrottleLevel::Full,
        };

        match queried {
            Ok((distance_sq, engagement)) => {
                match check_non_negative("distance_squared", distance_sq) {
                    Ok(distance_sq) => self.current_throttle_level(distance_sq, engagement),
                    Err(err) => {
                        self.fault(err);
                        ThrottleLevel::Full
                    }
                }
            }
            Err(err) => {
                self.fault(err.into());
                ThrottleLevel::Full
            }
        }
    }

    /// Whether a host object should run its elastic work this tick.
    pub fn should_process(&mut self, object: ObjectId) -> bool {
        self.throttle_level_for(object) != ThrottleLevel::Minimal
    }

    /// Whether `item_id` should skip its `category` step on `world_tick`,
    /// according to the level published at the end of the last tick.
    pub fn should_skip_step(&mut self, category: StepCategory, item_id: u64, world_tick: u64) -> bool {
        let level = self.published_level;
        self.steps.should_skip(category, item_id, world_tick, level)
    }

    /// Scale applied to the amount of elastic work, in `[0, 1]`.
    pub fn current_budget_multiplier(&self) -> f64 {
        if !self.is_intervening() {
            return 1.0;
        }
        self.combined_multiplier()
    }

    /// System-wide level decided at the end of the last tick.
    pub fn published_level(&self) -> ThrottleLevel {
        self.published_level
    }

    // ── External events ──────────────────────────────────────────────

    /// A save is about to start.
    pub fn on_save_begin(&mut self, kind: SaveKind, name: &str) {
        if self.failsoft.is_intervention_disabled() {
            return;
        }
        self.io_guard.record_success();
        if let Some(transition) = self.io_guard.on_save_begin(kind, name) {
            self.emit(TelemetryEvent::IoGuard {
                tick: self.tick,
                transition,
            });
        }
    }

    /// The save finished.
    pub fn on_save_end(&mut self, success: bool) {
        if self.failsoft.is_intervention_disabled() {
            return;
        }
        self.io_guard.record_success();
        if let Some(transition) = self.io_guard.on_save_end(success) {
            self.emit(TelemetryEvent::IoGuard {
                tick: self.tick,
                transition,
            });
        }
    }

    /// A periodic memory pressure sample.
    pub fn on_pressure_sample(&mut self, sample: PressureSample) {
        if self.failsoft.is_intervention_disabled() {
            return;
        }
        let jitter_ms = self.stats.jitter_ms();
        if let Some(transition) = self.gc_guard.on_sample(&sample, jitter_ms) {
            self.emit(TelemetryEvent::GcGuard {
                tick: self.tick,
                transition,
            });
        }
    }

    // ── Faults ───────────────────────────────────────────────────────

    /// Counts a fault raised by the host inside governance code.
    pub fn report_fault(&mut self, error: GovernanceError) {
        self.fault(error);
    }

    /// Counts a fault raised by the host hooks feeding the guard `flag`.
    ///
    /// Unknown flags count against the engine instead.
    pub fn report_guard_fault(&mut self, flag: GuardFlag, error: GovernanceError) {
        let tick = self.tick;
        match flag {
            GUARD_IO => {
                if let Some(transition) = self.io_guard.record_fault(error) {
                    self.emit(TelemetryEvent::IoGuard { tick, transition });
                }
            }
            GUARD_GC => {
                if let Some(transition) = self.gc_guard.record_fault(error) {
                    self.emit(TelemetryEvent::GcGuard { tick, transition });
                }
            }
            GUARD_STREAMING => {
                self.streaming_guard.record_fault(error);
            }
            GUARD_VEHICLE => {
                self.vehicle_guard.record_fault(error);
            }
            _ => self.fault(error),
        }
    }

    fn fault(&mut self, error: GovernanceError) {
        self.faults_this_tick += 1;
        let cause = error.to_string();
        let counters = self.telemetry.counters_ref();
        counters.record_internal_error();
        if self.failsoft.record_error(error, self.tick) == ErrorVerdict::Tripped {
            counters.record_failsoft_trip();
            counters.set_intervention_disabled(true);
            counters.set_budget_multiplier(1.0);
            self.published_level = ThrottleLevel::Full;
            self.emit(TelemetryEvent::FailsoftTripped {
                tick: self.tick,
                cause,
            });
        }
    }

    /// Re-enables intervention after fail-soft tripped.
    pub fn manual_reset(&mut self) {
        let was_disabled = self.failsoft.is_intervention_disabled();
        self.failsoft.manual_reset();
        self.telemetry.counters_ref().set_intervention_disabled(false);
        if was_disabled {
            self.emit(TelemetryEvent::FailsoftReset);
        }
    }

    /// Returns every component to its initial state. Identity, clock,
    /// world and observer are kept.
    pub fn reset(&mut self) {
        self.stats.reset();
        self.governor.reset_stats();
        self.panic.reset();
        self.gate.reset();
        self.throttle.reset();
        self.io_guard.reset();
        self.gc_guard.reset();
        self.streaming_guard.reset();
        self.vehicle_guard.reset();
        self.evaluator.reset();
        self.failsoft.manual_reset();
        self.steps.reset();
        self.telemetry.reset();
        self.tick = 0;
        self.last_tick_at = Duration::ZERO;
        self.faults_this_tick = 0;
        self.published_level = ThrottleLevel::Full;
        log::info!("Governance: engine reset");
    }

    fn emit(&self, event: TelemetryEvent) {
        if let Some(observer) = &self.observer {
            // Full or disconnected: dropped.
            let _ = observer.try_send(event);
        }
    }

    // ── Read-only views ──────────────────────────────────────────────

    /// Whether fail-soft disabled all intervention.
    pub fn is_intervention_disabled(&self) -> bool {
        self.failsoft.is_intervention_disabled()
    }

    /// Completed ticks since creation or reset.
    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    /// Adaptive gate state.
    pub fn gate_state(&self) -> GateState {
        self.gate.state()
    }

    /// Panic protocol state.
    pub fn panic_state(&self) -> PanicState {
        self.panic.state()
    }

    /// IO guard state.
    pub fn io_guard_state(&self) -> IoGuardState {
        self.io_guard.state()
    }

    /// GC guard state.
    pub fn gc_guard_state(&self) -> GcGuardState {
        self.gc_guard.state()
    }

    /// The GC pressure guard.
    pub fn gc_guard(&self) -> &GcPressureGuard {
        &self.gc_guard
    }

    /// Whether the engine stepped aside for a fast vehicle this tick.
    pub fn is_vehicle_passive(&self) -> bool {
        self.evaluator.has(GUARD_VEHICLE)
    }

    /// Configuration in use.
    pub fn config(&self) -> &GovernanceConfig {
        &self.config
    }

    /// Rolling tick statistics.
    pub fn stats(&self) -> &RollingTickStats {
        &self.stats
    }

    /// The budget governor.
    pub fn governor(&self) -> &TickBudgetGovernor {
        &self.governor
    }

    /// The cached guard outcome for this tick.
    pub fn guards(&self) -> &GuardEvaluator {
        &self.evaluator
    }

    /// The hysteresis-aware throttle calculator.
    pub fn throttle(&self) -> &ThrottleCalculator {
        &self.throttle
    }

    /// The fail-soft controller.
    pub fn failsoft(&self) -> &FailsoftController {
        &self.failsoft
    }

    /// Step skipping counters.
    pub fn step_policy(&self) -> &StepPolicy {
        &self.steps
    }

    /// Shared counters for a reporting thread.
    pub fn telemetry(&self) -> Arc<GovernanceCounters> {
        self.telemetry.counters()
    }

    /// Point-in-time copy of the counters.
    pub fn snapshot(&self) -> TelemetrySnapshot {
        self.telemetry.counters_ref().snapshot()
    }
}
