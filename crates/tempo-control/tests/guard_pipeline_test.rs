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

use approx::assert_relative_eq;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tempo_control::guard::{GUARD_GC, GUARD_IO, GUARD_STREAMING, GUARD_VEHICLE};
use tempo_control::{GovernanceEngine, GovernanceError};
use tempo_core::telemetry::TelemetryEvent;
use tempo_core::{
    Engagement, GateState, GcGuardState, GovernanceConfig, InterventionReason, IoGuardState,
    ManualClock, ObjectId, PressureSample, QueryError, SaveKind, ThrottleLevel, WorldQuery,
};

/// A host world with fixed per-object answers.
struct FakeWorld {
    distances: HashMap<u64, f64>,
    engaged: Vec<u64>,
    observer_speed: f64,
    vehicle_kmh: Arc<Mutex<Option<f64>>>,
}

impl FakeWorld {
    fn new(observer_speed: f64) -> Self {
        let mut distances = HashMap::new();
        distances.insert(1, 100.0);
        distances.insert(2, 2500.0);
        distances.insert(3, 10_000.0);
        Self {
            distances,
            engaged: vec![3],
            observer_speed,
            vehicle_kmh: Arc::new(Mutex::new(None)),
        }
    }
}

impl WorldQuery for FakeWorld {
    fn distance_squared_to_nearest_actor(&self, object: ObjectId) -> Result<f64, QueryError> {
        self.distances
            .get(&object.0)
            .copied()
            .ok_or_else(|| QueryError::new("distance", format!("unknown object {}", object.0)))
    }

    fn engagement(&self, object: ObjectId) -> Result<Engagement, QueryError> {
        Ok(Engagement {
            has_target: self.engaged.contains(&object.0),
            ..Engagement::IDLE
        })
    }

    fn observer_speed(&self) -> Result<f64, QueryError> {
        Ok(self.observer_speed)
    }

    fn observer_vehicle_speed_kmh(&self) -> Result<Option<f64>, QueryError> {
        Ok(*self.vehicle_kmh.lock().unwrap())
    }
}

fn engine(observer_speed: f64) -> (GovernanceEngine, ManualClock) {
    let clock = ManualClock::new();
    let engine = GovernanceEngine::with_clock(GovernanceConfig::default(), Arc::new(clock.clone()))
        .with_world(Box::new(FakeWorld::new(observer_speed)));
    (engine, clock)
}

fn run(engine: &mut GovernanceEngine, clock: &ManualClock, ms: f64, n: usize) {
    for _ in 0..n {
        clock.advance_ms(ms);
        engine.end_tick_with_duration(ms);
    }
}

/// Warm-up followed by one slow tick: the gate opens.
fn activate_gate(engine: &mut GovernanceEngine, clock: &ManualClock) {
    run(engine, clock, 2.0, 60);
    run(engine, clock, 30.0, 1);
    assert_eq!(engine.gate_state(), GateState::Active);
}

#[test]
fn test_save_cycle_lowers_budget_and_recovers() {
    // --- 1. ARRANGE ---
    let (tx, rx) = crossbeam_channel::unbounded();
    let (engine, clock) = engine(0.0);
    let mut engine = engine.with_observer(tx);
    activate_gate(&mut engine, &clock);

    // --- 2. ACT ---
    engine.on_save_begin(SaveKind::World, "overworld");
    run(&mut engine, &clock, 2.0, 5);
    let active_multiplier = engine.current_budget_multiplier();
    engine.on_save_end(true);
    run(&mut engine, &clock, 2.0, 40);

    // --- 3. ASSERT ---
    assert_relative_eq!(active_multiplier, 0.3);
    assert_eq!(engine.io_guard_state(), IoGuardState::Idle);
    assert!(!engine.guards().has(GUARD_IO));
    let io_states: Vec<IoGuardState> = rx
        .try_iter()
        .filter_map(|event| match event {
            TelemetryEvent::IoGuard { transition, .. } => Some(transition.to),
            _ => None,
        })
        .collect();
    assert_eq!(
        io_states,
        vec![
            IoGuardState::Enter,
            IoGuardState::Active,
            IoGuardState::Exit,
            IoGuardState::Cooldown,
            IoGuardState::Idle
        ]
    );
    assert_eq!(engine.snapshot().guard_activations, 1);
}

#[test]
fn test_missing_save_end_hits_deadman() {
    // --- 1. ARRANGE ---
    let (mut engine, clock) = engine(0.0);
    engine.on_save_begin(SaveKind::World, "stuck");

    // --- 2. ACT ---
    run(&mut engine, &clock, 2.0, 5 + 300);
    let before_timeout = engine.io_guard_state();
    run(&mut engine, &clock, 2.0, 1);

    // --- 3. ASSERT ---
    assert_eq!(before_timeout, IoGuardState::Active);
    assert_eq!(engine.io_guard_state(), IoGuardState::Exit);
    assert_eq!(
        engine.guards().last_reason(),
        Some(InterventionReason::IoGuardTimeout)
    );
}

#[test]
fn test_gc_pressure_puts_engine_on_diet() {
    // --- 1. ARRANGE ---
    let (mut engine, clock) = engine(0.0);
    activate_gate(&mut engine, &clock);

    // --- 2. ACT ---
    engine.on_pressure_sample(PressureSample::new(1.0, 8.0, 0));
    run(&mut engine, &clock, 2.0, 1);

    // --- 3. ASSERT ---
    assert_eq!(engine.gc_guard_state(), GcGuardState::Diet);
    assert!(engine.guards().has(GUARD_GC));
    assert_relative_eq!(engine.current_budget_multiplier(), 0.65);
    assert_eq!(
        engine.guards().last_reason(),
        Some(InterventionReason::GcPressureDiet)
    );
}

#[test]
fn test_streaming_yield_forces_minimal_for_idle_objects() {
    // --- 1. ARRANGE ---
    let (mut engine, clock) = engine(35.0);
    activate_gate(&mut engine, &clock);

    // --- 2. ACT ---
    run(&mut engine, &clock, 60.0, 2);

    // --- 3. ASSERT ---
    assert!(engine.guards().has(GUARD_STREAMING));
    assert_eq!(engine.throttle_level_for(ObjectId(1)), ThrottleLevel::Minimal);
    assert!(!engine.should_process(ObjectId(1)));
    // Engaged objects are exempt.
    assert_eq!(engine.throttle_level_for(ObjectId(3)), ThrottleLevel::Full);
}

#[test]
fn test_world_lookup_uses_distance_tiers() {
    // --- 1. ARRANGE ---
    let config = GovernanceConfig {
        window_short_ticks: 1,
        ..GovernanceConfig::default()
    };
    let clock = ManualClock::new();
    let mut engine = GovernanceEngine::with_clock(config, Arc::new(clock.clone()))
        .with_world(Box::new(FakeWorld::new(0.0)));
    // Average above the gate's 18ms entry but below the throttle's 20ms.
    run(&mut engine, &clock, 19.0, 300);
    assert_eq!(engine.gate_state(), GateState::Active);
    assert_eq!(engine.throttle().hysteresis_floor(), None);

    // --- 2. ACT ---
    let near = engine.throttle_level_for(ObjectId(1));
    let far = engine.throttle_level_for(ObjectId(2));
    let unknown = engine.throttle_level_for(ObjectId(99));

    // --- 3. ASSERT ---
    assert_eq!(near, ThrottleLevel::Full);
    assert_eq!(far, ThrottleLevel::Low);
    assert_eq!(unknown, ThrottleLevel::Full);
    assert_eq!(engine.failsoft().consecutive_errors(), 1);
}

#[test]
fn test_passthrough_skips_world_queries() {
    // --- 1. ARRANGE ---
    let (mut engine, clock) = engine(0.0);
    run(&mut engine, &clock, 5.0, 61);

    // --- 2. ACT ---
    let unknown = engine.throttle_level_for(ObjectId(99));

    // --- 3. ASSERT ---
    assert_eq!(engine.gate_state(), GateState::Passthrough);
    assert_eq!(unknown, ThrottleLevel::Full);
    assert_eq!(engine.failsoft().consecutive_errors(), 0);
}

#[test]
fn test_guard_faults_disable_only_that_guard() {
    // --- 1. ARRANGE ---
    let (mut engine, clock) = engine(0.0);
    activate_gate(&mut engine, &clock);
    engine.on_save_begin(SaveKind::World, "overworld");

    // --- 2. ACT ---
    for _ in 0..3 {
        engine.report_guard_fault(GUARD_IO, GovernanceError::Injected("hook".into()));
    }
    run(&mut engine, &clock, 2.0, 1);
    engine.on_pressure_sample(PressureSample::new(1.0, 8.0, 0));
    run(&mut engine, &clock, 2.0, 1);

    // --- 3. ASSERT ---
    assert_eq!(engine.io_guard_state(), IoGuardState::Idle);
    assert!(!engine.guards().has(GUARD_IO));
    assert!(engine.guards().has(GUARD_GC));
    assert!(!engine.is_intervention_disabled());
}

#[test]
fn test_gc_diet_ends_when_samples_stop() {
    // --- 1. ARRANGE ---
    let (tx, rx) = crossbeam_channel::unbounded();
    let (engine, clock) = engine(0.0);
    let mut engine = engine.with_observer(tx);
    activate_gate(&mut engine, &clock);
    engine.on_pressure_sample(PressureSample::new(1.0, 8.0, 0));

    // --- 2. ACT ---
    run(&mut engine, &clock, 2.0, 599);
    let before_deadman = engine.gc_guard_state();
    run(&mut engine, &clock, 2.0, 1);
    let after_deadman = engine.gc_guard_state();
    run(&mut engine, &clock, 2.0, 60);

    // --- 3. ASSERT ---
    assert_eq!(before_deadman, GcGuardState::Diet);
    assert_eq!(after_deadman, GcGuardState::Recovering);
    assert_eq!(engine.gc_guard_state(), GcGuardState::Normal);
    assert_eq!(engine.gc_guard().deadman_trips(), 1);
    assert!(!engine.guards().has(GUARD_GC));
    let gc_states: Vec<GcGuardState> = rx
        .try_iter()
        .filter_map(|event| match event {
            TelemetryEvent::GcGuard { transition, .. } => Some(transition.to),
            _ => None,
        })
        .collect();
    assert_eq!(
        gc_states,
        vec![
            GcGuardState::Diet,
            GcGuardState::Recovering,
            GcGuardState::Normal
        ]
    );
}

#[test]
fn test_fast_vehicle_puts_engine_in_passive_mode() {
    // --- 1. ARRANGE ---
    let world = FakeWorld::new(0.0);
    let vehicle_kmh = Arc::clone(&world.vehicle_kmh);
    let clock = ManualClock::new();
    let mut engine =
        GovernanceEngine::with_clock(GovernanceConfig::default(), Arc::new(clock.clone()))
            .with_world(Box::new(world));
    activate_gate(&mut engine, &clock);
    engine.on_pressure_sample(PressureSample::new(1.0, 8.0, 0));
    run(&mut engine, &clock, 2.0, 1);
    assert_relative_eq!(engine.current_budget_multiplier(), 0.65);

    // --- 2. ACT ---
    *vehicle_kmh.lock().unwrap() = Some(45.0);
    run(&mut engine, &clock, 2.0, 1);
    let passive_level = engine.throttle_level_for(ObjectId(2));
    let passive_multiplier = engine.current_budget_multiplier();
    let passive_published = engine.published_level();

    *vehicle_kmh.lock().unwrap() = Some(25.0);
    run(&mut engine, &clock, 2.0, 1);
    let still_passive = engine.is_vehicle_passive();

    *vehicle_kmh.lock().unwrap() = Some(15.0);
    run(&mut engine, &clock, 2.0, 1);

    // --- 3. ASSERT ---
    assert_eq!(passive_level, ThrottleLevel::Full);
    assert_relative_eq!(passive_multiplier, 1.0);
    assert_eq!(passive_published, ThrottleLevel::Full);
    assert!(still_passive);
    assert!(!engine.is_vehicle_passive());
    assert!(!engine.guards().has(GUARD_VEHICLE));
    assert_eq!(engine.gate_state(), GateState::Active);
    assert_relative_eq!(engine.current_budget_multiplier(), 0.65);
    assert_eq!(engine.snapshot().guard_activations, 2);
}
