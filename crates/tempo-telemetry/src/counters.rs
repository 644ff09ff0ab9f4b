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

//! Lifetime governance counters shared with reporting threads.
//!
//! The tick thread is the only writer. Readers take an `Arc` clone and call
//! [`GovernanceCounters::snapshot`] whenever they like.

use crate::histogram::TickHistogram;
use crate::reasons::ReasonStats;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tempo_core::telemetry::{Metric, MetricId};
use tempo_core::{InterventionReason, ThrottleLevel};

const NAMESPACE: &str = "governance";

/// Atomic counters describing what the governance engine has done so far.
#[derive(Debug, Default)]
pub struct GovernanceCounters {
    ticks: AtomicU64,
    cutoffs: AtomicU64,
    panic_entries: AtomicU64,
    gate_activations: AtomicU64,
    gate_transitions: AtomicU64,
    guard_activations: AtomicU64,
    hysteresis_escalations: AtomicU64,
    failsoft_trips: AtomicU64,
    internal_errors: AtomicU64,
    engaged_upgrades: AtomicU64,
    throttle_decisions: [AtomicU64; 4],
    // f64 bits of the last published combined multiplier.
    budget_multiplier_bits: AtomicU64,
    intervention_disabled: AtomicBool,
    reasons: ReasonStats,
    histogram: TickHistogram,
}

impl GovernanceCounters {
    /// Creates zeroed counters with a published multiplier of 1.0.
    pub fn new() -> Self {
        let counters = Self::default();
        counters.set_budget_multiplier(1.0);
        counters
    }

    /// Counts a completed tick and records its duration.
    pub fn record_tick(&self, duration_ms: f64) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        self.histogram.record(duration_ms);
    }

    /// Counts a governor cutoff.
    pub fn record_cutoff(&self) {
        self.cutoffs.fetch_add(1, Ordering::Relaxed);
        self.reasons.increment(InterventionReason::GovernorCutoff);
    }

    /// Counts an entry into panic.
    pub fn record_panic_entry(&self) {
        self.panic_entries.fetch_add(1, Ordering::Relaxed);
        self.reasons.increment(InterventionReason::PanicWindowSpikes);
    }

    /// Counts a gate transition. `activated` is true for PASSTHROUGH → ACTIVE.
    pub fn record_gate_transition(&self, activated: bool) {
        self.gate_transitions.fetch_add(1, Ordering::Relaxed);
        if activated {
            self.gate_activations.fetch_add(1, Ordering::Relaxed);
            self.reasons.increment(InterventionReason::GateActivated);
        } else {
            self.reasons.increment(InterventionReason::GatePassthrough);
        }
    }

    /// Counts a guard leaving its idle state.
    pub fn record_guard_activation(&self, reason: InterventionReason) {
        self.guard_activations.fetch_add(1, Ordering::Relaxed);
        self.reasons.increment(reason);
    }

    /// Counts a hysteresis escalation.
    pub fn record_hysteresis_escalation(&self, reason: InterventionReason) {
        self.hysteresis_escalations.fetch_add(1, Ordering::Relaxed);
        self.reasons.increment(reason);
    }

    /// Counts an internal fault.
    pub fn record_internal_error(&self) {
        self.internal_errors.fetch_add(1, Ordering::Relaxed);
        self.reasons.increment(InterventionReason::FailsoftError);
    }

    /// Counts a fail-soft trip.
    pub fn record_failsoft_trip(&self) {
        self.failsoft_trips.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts an engaged object forced to `Full`.
    pub fn record_engaged_upgrade(&self) {
        self.engaged_upgrades.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts one throttle decision at `level`.
    pub fn record_throttle_decision(&self, level: ThrottleLevel) {
        self.throttle_decisions[level as usize].fetch_add(1, Ordering::Relaxed);
    }

    /// Counts `reason` without touching any other counter.
    pub fn record_reason(&self, reason: InterventionReason) {
        self.reasons.increment(reason);
    }

    /// Publishes the combined budget multiplier.
    pub fn set_budget_multiplier(&self, multiplier: f64) {
        self.budget_multiplier_bits
            .store(multiplier.to_bits(), Ordering::Relaxed);
    }

    /// Publishes the fail-soft flag.
    pub fn set_intervention_disabled(&self, disabled: bool) {
        self.intervention_disabled.store(disabled, Ordering::Relaxed);
    }

    /// Completed ticks.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Lifetime governor cutoffs.
    pub fn cutoffs(&self) -> u64 {
        self.cutoffs.load(Ordering::Relaxed)
    }

    /// Lifetime entries into panic.
    pub fn panic_entries(&self) -> u64 {
        self.panic_entries.load(Ordering::Relaxed)
    }

    /// Lifetime gate activations.
    pub fn gate_activations(&self) -> u64 {
        self.gate_activations.load(Ordering::Relaxed)
    }

    /// Lifetime gate transitions in either direction.
    pub fn gate_transitions(&self) -> u64 {
        self.gate_transitions.load(Ordering::Relaxed)
    }

    /// Lifetime guard activations.
    pub fn guard_activations(&self) -> u64 {
        self.guard_activations.load(Ordering::Relaxed)
    }

    /// Lifetime hysteresis escalations.
    pub fn hysteresis_escalations(&self) -> u64 {
        self.hysteresis_escalations.load(Ordering::Relaxed)
    }

    /// Lifetime fail-soft trips.
    pub fn failsoft_trips(&self) -> u64 {
        self.failsoft_trips.load(Ordering::Relaxed)
    }

    /// Lifetime internal faults.
    pub fn internal_errors(&self) -> u64 {
        self.internal_errors.load(Ordering::Relaxed)
    }

    /// Lifetime engaged upgrades.
    pub fn engaged_upgrades(&self) -> u64 {
        self.engaged_upgrades.load(Ordering::Relaxed)
    }

    /// Lifetime decisions at `level`.
    pub fn throttle_decisions(&self, level: ThrottleLevel) -> u64 {
        self.throttle_decisions[level as usize].load(Ordering::Relaxed)
    }

    /// Last published combined multiplier.
    pub fn budget_multiplier(&self) -> f64 {
        f64::from_bits(self.budget_multiplier_bits.load(Ordering::Relaxed))
    }

    /// Last published fail-soft flag.
    pub fn intervention_disabled(&self) -> bool {
        self.intervention_disabled.load(Ordering::Relaxed)
    }

    /// Per-reason counts.
    pub fn reasons(&self) -> &ReasonStats {
        &self.reasons
    }

    /// Tick duration distribution.
    pub fn histogram(&self) -> &TickHistogram {
        &self.histogram
    }

    /// Copies every counter into a serializable value.
    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            ticks: self.ticks(),
            cutoffs: self.cutoffs(),
            panic_entries: self.panic_entries(),
            gate_activations: self.gate_activations(),
            gate_transitions: self.gate_transitions(),
            guard_activations: self.guard_activations(),
            hysteresis_escalations: self.hysteresis_escalations(),
            failsoft_trips: self.failsoft_trips(),
            internal_errors: self.internal_errors(),
            engaged_upgrades: self.engaged_upgrades(),
            decisions_full: self.throttle_decisions(ThrottleLevel::Full),
            decisions_reduced: self.throttle_decisions(ThrottleLevel::Reduced),
            decisions_low: self.throttle_decisions(ThrottleLevel::Low),
            decisions_minimal: self.throttle_decisions(ThrottleLevel::Minimal),
            budget_multiplier: self.budget_multiplier(),
            intervention_disabled: self.intervention_disabled(),
            tick_avg_ms: self.histogram.average_ms(),
            tick_p50_ms: self.histogram.p50(),
            tick_p95_ms: self.histogram.p95(),
            tick_p99_ms: self.histogram.p99(),
            tick_max_ms: self.histogram.max_ms(),
            jank_ticks: self.histogram.jank_count(),
            severe_jank_ticks: self.histogram.severe_jank_count(),
            top_reasons: self
                .reasons
                .top(5)
                .into_iter()
                .map(|(r, c)| (r.as_str().to_string(), c))
                .collect(),
        }
    }

    /// Zeroes every counter. For test isolation.
    pub fn reset(&self) {
        for counter in [
            &self.ticks,
            &self.cutoffs,
            &self.panic_entries,
            &self.gate_activations,
            &self.gate_transitions,
            &self.guard_activations,
            &self.hysteresis_escalations,
            &self.failsoft_trips,
            &self.internal_errors,
            &self.engaged_upgrades,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        for counter in &self.throttle_decisions {
            counter.store(0, Ordering::Relaxed);
        }
        self.set_budget_multiplier(1.0);
        self.set_intervention_disabled(false);
        self.reasons.reset();
        self.histogram.reset();
    }
}

/// Point-in-time copy of [`GovernanceCounters`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetrySnapshot {
    /// Completed ticks.
    pub ticks: u64,
    /// Governor cutoffs.
    pub cutoffs: u64,
    /// Entries into panic.
    pub panic_entries: u64,
    /// Gate activations.
    pub gate_activations: u64,
    /// Gate transitions in either direction.
    pub gate_transitions: u64,
    /// Guard activations.
    pub guard_activations: u64,
    /// Hysteresis escalations.
    pub hysteresis_escalations: u64,
    /// Fail-soft trips.
    pub failsoft_trips: u64,
    /// Internal faults.
    pub internal_errors: u64,
    /// Engaged objects forced to `Full`.
    pub engaged_upgrades: u64,
    /// Decisions at `Full`.
    pub decisions_full: u64,
    /// Decisions at `Reduced`.
    pub decisions_reduced: u64,
    /// Decisions at `Low`.
    pub decisions_low: u64,
    /// Decisions at `Minimal`.
    pub decisions_minimal: u64,
    /// Last combined multiplier.
    pub budget_multiplier: f64,
    /// Fail-soft flag.
    pub intervention_disabled: bool,
    /// Mean tick duration.
    pub tick_avg_ms: f64,
    /// Median tick duration.
    pub tick_p50_ms: f64,
    /// 95th percentile tick duration.
    pub tick_p95_ms: f64,
    /// 99th percentile tick duration.
    pub tick_p99_ms: f64,
    /// Longest tick.
    pub tick_max_ms: f64,
    /// Ticks above one frame.
    pub jank_ticks: u64,
    /// Ticks above two frames.
    pub severe_jank_ticks: u64,
    /// Most frequent intervention reasons.
    pub top_reasons: Vec<(String, u64)>,
}

impl TelemetrySnapshot {
    /// Exports the snapshot as engine metrics in the `governance` namespace.
    pub fn to_metrics(&self) -> Vec<Metric> {
        let mut metrics = vec![
            Metric::counter(id("ticks_total"), "Completed ticks", self.ticks),
            Metric::counter(id("cutoffs_total"), "Governor cutoffs", self.cutoffs),
            Metric::counter(id("panic_entries_total"), "Entries into panic", self.panic_entries),
            Metric::counter(
                id("gate_activations_total"),
                "Adaptive gate activations",
                self.gate_activations,
            ),
            Metric::counter(
                id("guard_activations_total"),
                "Guard activations",
                self.guard_activations,
            ),
            Metric::counter(
                id("failsoft_trips_total"),
                "Fail-soft trips",
                self.failsoft_trips,
            ),
            Metric::gauge(
                id("budget_multiplier"),
                "Combined budget multiplier",
                "ratio",
                self.budget_multiplier,
            ),
            Metric::gauge(id("tick_p95_ms"), "95th percentile tick", "ms", self.tick_p95_ms),
        ];
        for (level, count) in [
            (ThrottleLevel::Full, self.decisions_full),
            (ThrottleLevel::Reduced, self.decisions_reduced),
            (ThrottleLevel::Low, self.decisions_low),
            (ThrottleLevel::Minimal, self.decisions_minimal),
        ] {
            metrics.push(Metric::counter(
                id("throttle_decisions_total").with_label("level", level.as_str()),
                "Throttle decisions per level",
                count,
            ));
        }
        metrics
    }

    /// Serializes the snapshot as a single JSON line.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

fn id(name: &str) -> MetricId {
    MetricId::new(NAMESPACE, name)
}
