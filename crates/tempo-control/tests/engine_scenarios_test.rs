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
use std::sync::Arc;
use std::time::Duration;
use tempo_control::{GovernanceEngine, GovernanceError};
use tempo_core::telemetry::TelemetryEvent;
use tempo_core::{
    Clock, Engagement, GateState, GovernanceConfig, ManualClock, PanicState, StepCategory,
    ThrottleLevel,
};

/// 50 units away: LOW tier.
const FAR_SQ: f64 = 2500.0;

fn engine_with(config: GovernanceConfig) -> (GovernanceEngine, ManualClock) {
    let clock = ManualClock::new();
    let engine = GovernanceEngine::with_clock(config, Arc::new(clock.clone()));
    (engine, clock)
}

fn run(engine: &mut GovernanceEngine, clock: &ManualClock, ms: f64, n: usize) {
    for _ in 0..n {
        clock.advance_ms(ms);
        engine.end_tick_with_duration(ms);
    }
}

fn enter_panic(engine: &mut GovernanceEngine, clock: &ManualClock) {
    run(engine, clock, 150.0, 1);
    clock.advance_ms(850.0);
    run(engine, clock, 150.0, 1);
}

#[test]
fn test_healthy_ticks_keep_gate_open_and_base_tier() {
    // --- 1. ARRANGE ---
    let (mut engine, clock) = engine_with(GovernanceConfig::default());

    // --- 2. ACT ---
    run(&mut engine, &clock, 5.0, 61);

    // --- 3. ASSERT ---
    assert_eq!(engine.gate_state(), GateState::Passthrough);
    assert!(engine.throttle().hysteresis_floor().is_none());
    assert_eq!(
        engine.current_throttle_level(FAR_SQ, Engagement::IDLE),
        ThrottleLevel::Full
    );
    assert_relative_eq!(engine.current_budget_multiplier(), 1.0);
    assert_eq!(engine.snapshot().decisions_low, 0);
}

#[test]
fn test_gate_exit_lifts_throttle_while_hysteresis_still_holds() {
    // --- 1. ARRANGE ---
    let (mut engine, clock) = engine_with(GovernanceConfig::default());
    run(&mut engine, &clock, 2.0, 60);
    run(&mut engine, &clock, 40.0, 1);
    assert_eq!(engine.gate_state(), GateState::Active);

    // --- 2. ACT ---
    run(&mut engine, &clock, 2.0, 180);

    // --- 3. ASSERT ---
    // The gate needs 180 stable ticks, hysteresis needs 300.
    assert_eq!(engine.gate_state(), GateState::Passthrough);
    assert!(engine.throttle().hysteresis_floor().is_some());
    assert_eq!(engine.published_level(), ThrottleLevel::Full);
    assert_relative_eq!(engine.current_budget_multiplier(), 1.0);
    assert_eq!(
        engine.current_throttle_level(0.0, Engagement::IDLE),
        ThrottleLevel::Full
    );
    assert_eq!(
        engine.current_throttle_level(FAR_SQ * 10.0, Engagement::IDLE),
        ThrottleLevel::Full
    );
}

#[test]
fn test_gate_returns_to_passthrough_on_180th_healthy_tick() {
    // --- 1. ARRANGE ---
    let (tx, rx) = crossbeam_channel::unbounded();
    let (engine, clock) = engine_with(GovernanceConfig::default());
    let mut engine = engine.with_observer(tx);
    run(&mut engine, &clock, 2.0, 60);

    // --- 2. ACT ---
    run(&mut engine, &clock, 40.0, 1);
    assert_eq!(engine.gate_state(), GateState::Active);
    run(&mut engine, &clock, 2.0, 179);
    let before_exit = engine.gate_state();
    run(&mut engine, &clock, 2.0, 1);

    // --- 3. ASSERT ---
    assert_eq!(before_exit, GateState::Active);
    assert_eq!(engine.gate_state(), GateState::Passthrough);

    let gate_ticks: Vec<(u64, GateState)> = rx
        .try_iter()
        .filter_map(|event| match event {
            TelemetryEvent::Gate { tick, transition } => Some((tick, transition.to)),
            _ => None,
        })
        .collect();
    assert_eq!(
        gate_ticks,
        vec![(61, GateState::Active), (241, GateState::Passthrough)]
    );
    let snapshot = engine.snapshot();
    assert_eq!(snapshot.gate_activations, 1);
    assert_eq!(snapshot.gate_transitions, 2);
}

#[test]
fn test_two_spikes_one_second_apart_enter_panic() {
    // --- 1. ARRANGE ---
    let (mut engine, clock) = engine_with(GovernanceConfig::default());

    // --- 2. ACT ---
    enter_panic(&mut engine, &clock);

    // --- 3. ASSERT ---
    assert_eq!(engine.panic_state(), PanicState::Panic);
    assert_eq!(engine.gate_state(), GateState::Active);
    assert_relative_eq!(engine.current_budget_multiplier(), 0.1);
    assert_eq!(engine.published_level(), ThrottleLevel::Minimal);
    assert_eq!(engine.snapshot().panic_entries, 1);
}

#[test]
fn test_spikes_six_seconds_apart_do_not_panic() {
    // --- 1. ARRANGE ---
    let (mut engine, clock) = engine_with(GovernanceConfig::default());

    // --- 2. ACT ---
    run(&mut engine, &clock, 150.0, 1);
    clock.advance(Duration::from_millis(5850));
    run(&mut engine, &clock, 150.0, 1);

    // --- 3. ASSERT ---
    assert_eq!(engine.panic_state(), PanicState::Normal);
    assert_eq!(engine.snapshot().panic_entries, 0);
}

#[test]
fn test_hysteresis_holds_for_299_idle_ticks_then_releases() {
    // --- 1. ARRANGE ---
    // A one-tick short window lets the spike leave it immediately, so the
    // recovery run starts on the first idle tick. The gate is held open
    // longer than hysteresis so the held level stays observable.
    let config = GovernanceConfig {
        window_short_ticks: 1,
        gate_exit_stability_ticks: 400,
        ..GovernanceConfig::default()
    };
    let (mut engine, clock) = engine_with(config);
    run(&mut engine, &clock, 2.0, 300);
    run(&mut engine, &clock, 40.0, 1);
    assert_eq!(engine.throttle().hysteresis_floor(), Some(ThrottleLevel::Reduced));

    // --- 2. ACT & ASSERT ---
    for _ in 0..299 {
        run(&mut engine, &clock, 2.0, 1);
        assert_eq!(
            engine.current_throttle_level(0.0, Engagement::IDLE),
            ThrottleLevel::Reduced
        );
    }
    run(&mut engine, &clock, 2.0, 1);

    assert_eq!(engine.throttle().hysteresis_floor(), None);
    assert_eq!(
        engine.current_throttle_level(0.0, Engagement::IDLE),
        ThrottleLevel::Full
    );
    assert_eq!(
        engine.current_throttle_level(FAR_SQ, Engagement::IDLE),
        ThrottleLevel::Low
    );
}

#[test]
fn test_engagement_forces_full_during_panic() {
    // --- 1. ARRANGE ---
    let (mut engine, clock) = engine_with(GovernanceConfig::default());
    enter_panic(&mut engine, &clock);
    let attacking = Engagement {
        attacking: true,
        ..Engagement::IDLE
    };

    // --- 2. ACT ---
    let idle_level = engine.current_throttle_level(FAR_SQ, Engagement::IDLE);
    let engaged_level = engine.current_throttle_level(FAR_SQ, attacking);

    // --- 3. ASSERT ---
    assert_eq!(idle_level, ThrottleLevel::Minimal);
    assert_eq!(engaged_level, ThrottleLevel::Full);
    let snapshot = engine.snapshot();
    assert_eq!(snapshot.engaged_upgrades, 1);
    assert_eq!(snapshot.decisions_minimal, 1);
    assert_eq!(snapshot.decisions_full, 1);
}

#[test]
fn test_failsoft_trips_after_three_faults_and_needs_manual_reset() {
    // --- 1. ARRANGE ---
    let (tx, rx) = crossbeam_channel::bounded(16);
    let (engine, clock) = engine_with(GovernanceConfig::default());
    let mut engine = engine.with_observer(tx);
    enter_panic(&mut engine, &clock);
    assert_relative_eq!(engine.current_budget_multiplier(), 0.1);

    // --- 2. ACT ---
    for i in 0..3 {
        engine.report_fault(GovernanceError::Injected(format!("fault {i}")));
    }
    run(&mut engine, &clock, 2.0, 500);

    // --- 3. ASSERT ---
    assert!(engine.is_intervention_disabled());
    assert_eq!(
        engine.current_throttle_level(FAR_SQ, Engagement::IDLE),
        ThrottleLevel::Full
    );
    assert_relative_eq!(engine.current_budget_multiplier(), 1.0);
    assert!(engine.should_continue());
    assert_eq!(engine.published_level(), ThrottleLevel::Full);
    assert!(rx
        .try_iter()
        .any(|event| matches!(event, TelemetryEvent::FailsoftTripped { .. })));
    assert_eq!(engine.snapshot().failsoft_trips, 1);

    engine.manual_reset();
    assert!(!engine.is_intervention_disabled());
    assert_eq!(
        engine.current_throttle_level(FAR_SQ, Engagement::IDLE),
        ThrottleLevel::Minimal
    );
}

#[test]
fn test_clean_tick_resets_fault_counter() {
    // --- 1. ARRANGE ---
    let (mut engine, clock) = engine_with(GovernanceConfig::default());

    // --- 2. ACT ---
    engine.report_fault(GovernanceError::Injected("a".into()));
    engine.report_fault(GovernanceError::Injected("b".into()));
    run(&mut engine, &clock, 5.0, 1);
    let after_faulty_tick = engine.failsoft().consecutive_errors();
    run(&mut engine, &clock, 5.0, 1);
    engine.report_fault(GovernanceError::Injected("c".into()));
    engine.report_fault(GovernanceError::Injected("d".into()));

    // --- 3. ASSERT ---
    assert_eq!(after_faulty_tick, 2);
    assert_eq!(engine.failsoft().consecutive_errors(), 2);
    assert!(!engine.is_intervention_disabled());
}

#[test]
fn test_should_continue_batches_clock_reads_and_latches() {
    // --- 1. ARRANGE ---
    let (mut engine, clock) = engine_with(GovernanceConfig::default());
    enter_panic(&mut engine, &clock);
    engine.begin_tick();
    let tick_start = clock.now();
    clock.reset_reads();

    // --- 2. ACT ---
    let healthy = (0..100).all(|_| engine.should_continue());
    let reads_while_healthy = clock.reads();

    clock.advance_ms(40.0);
    let mut calls_until_cutoff = 0;
    while engine.should_continue() {
        calls_until_cutoff += 1;
    }

    // Rewinding the clock does not reopen the tick.
    clock.set(tick_start);
    clock.reset_reads();
    let reopened = (0..100).any(|_| engine.should_continue());

    // --- 3. ASSERT ---
    assert!(healthy);
    assert!(reads_while_healthy <= 100 / 20);
    assert!(calls_until_cutoff < 20);
    assert!(!reopened);
    assert_eq!(clock.reads(), 0);
    assert_eq!(engine.snapshot().cutoffs, 1);
}

#[test]
fn test_throttling_switched_off_never_intervenes() {
    // --- 1. ARRANGE ---
    let config = GovernanceConfig {
        throttling_enabled: false,
        ..GovernanceConfig::default()
    };
    let (mut engine, clock) = engine_with(config);

    // --- 2. ACT ---
    enter_panic(&mut engine, &clock);

    // --- 3. ASSERT ---
    assert_eq!(
        engine.current_throttle_level(FAR_SQ * 10.0, Engagement::IDLE),
        ThrottleLevel::Full
    );
    assert_relative_eq!(engine.current_budget_multiplier(), 1.0);
    assert!(engine.should_continue());
    assert!(!engine.should_skip_step(StepCategory::Perception, 1, 0));
}

#[test]
fn test_panic_level_staggers_perception_steps() {
    // --- 1. ARRANGE ---
    let (mut engine, clock) = engine_with(GovernanceConfig::default());
    enter_panic(&mut engine, &clock);

    // --- 2. ACT ---
    let skipped = (0..64)
        .filter(|world_tick| engine.should_skip_step(StepCategory::Perception, 5, *world_tick))
        .count();
    let collisions_skipped = (0..64)
        .filter(|world_tick| engine.should_skip_step(StepCategory::Collision, 5, *world_tick))
        .count();

    // --- 3. ASSERT ---
    assert_eq!(skipped, 56);
    assert_eq!(collisions_skipped, 0);
    assert_eq!(engine.step_policy().skipped(StepCategory::Perception), 56);
}
