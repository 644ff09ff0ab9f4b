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

//! Adaptive activation gate.
//!
//! A two-state hysteresis gate deciding whether the governance machinery
//! runs at all. Entry is immediate (panic, or short-window max / long-window
//! average above threshold); exit requires the long-window average to stay
//! below the exit threshold for a run of consecutive ticks. Fast entry and
//! slow exit keep the gate from oscillating.
//!
//! [`AdaptiveGate::evaluate_this_tick`] is the only mutator and runs once
//! per tick. [`AdaptiveGate::is_passthrough`] is a pure read for hot paths.

use crate::stats::RollingTickStats;
use tempo_core::{GateState, GovernanceConfig, InterventionReason, PanicState, Transition};

/// The adaptive gate.
#[derive(Debug, Clone)]
pub struct AdaptiveGate {
    entry_max_short_ms: f64,
    entry_avg_long_ms: f64,
    exit_avg_long_ms: f64,
    exit_stability_ticks: u32,

    state: GateState,
    stability_counter: u32,
    transitions: u64,
    last_reason: Option<InterventionReason>,
}

impl AdaptiveGate {
    /// Creates a gate in PASSTHROUGH.
    pub fn new(config: &GovernanceConfig) -> Self {
        log::info!(
            "AdaptiveGate: initialized (entry: max>{}ms OR avg>{}ms, exit: avg<{}ms for {} ticks)",
            config.gate_entry_max_short_ms,
            config.gate_entry_avg_long_ms,
            config.gate_exit_avg_long_ms,
            config.gate_exit_stability_ticks
        );
        Self {
            entry_max_short_ms: config.gate_entry_max_short_ms,
            entry_avg_long_ms: config.gate_entry_avg_long_ms,
            exit_avg_long_ms: config.gate_exit_avg_long_ms,
            exit_stability_ticks: config.gate_exit_stability_ticks,
            state: GateState::Passthrough,
            stability_counter: 0,
            transitions: 0,
            last_reason: None,
        }
    }

    /// Evaluates the gate for this tick. Call exactly once per tick, after
    /// the panic protocol.
    pub fn evaluate_this_tick(
        &mut self,
        stats: &RollingTickStats,
        panic: PanicState,
    ) -> Option<Transition<GateState>> {
        // ── 1. Panic forces ACTIVE ───────────────────────────────────
        if panic != PanicState::Normal {
            return self.transition_to(GateState::Active, InterventionReason::PanicWindowSpikes);
        }

        // ── 2. Not enough data: hold ─────────────────────────────────
        if !stats.has_enough_data() {
            return None;
        }

        let max_short = stats.max_over_short_window();
        let avg_long = stats.avg_over_long_window();

        // ── 3. Hysteresis ────────────────────────────────────────────
        match self.state {
            GateState::Passthrough => {
                if max_short > self.entry_max_short_ms || avg_long > self.entry_avg_long_ms {
                    return self.transition_to(GateState::Active, InterventionReason::GateActivated);
                }
            }
            GateState::Active => {
                if avg_long < self.exit_avg_long_ms {
                    self.stability_counter += 1;
                    if self.stability_counter >= self.exit_stability_ticks {
                        return self.transition_to(
                            GateState::Passthrough,
                            InterventionReason::GatePassthrough,
                        );
                    }
                } else {
                    self.stability_counter = 0;
                }
            }
        }
        None
    }

    fn transition_to(
        &mut self,
        next: GateState,
        reason: InterventionReason,
    ) -> Option<Transition<GateState>> {
        let change = Transition::between(self.state, next)?;
        self.state = next;
        self.transitions += 1;
        self.last_reason = Some(reason);
        if next == GateState::Passthrough {
            self.stability_counter = 0;
        }
        log::info!("AdaptiveGate: {:?} → {:?} ({})", change.from, change.to, reason);
        Some(change)
    }

    /// Whether the governance machinery may be skipped this tick.
    #[inline]
    pub fn is_passthrough(&self) -> bool {
        self.state == GateState::Passthrough
    }

    /// Current state.
    pub fn state(&self) -> GateState {
        self.state
    }

    /// Consecutive stable ticks counted while ACTIVE.
    pub fn stability_counter(&self) -> u32 {
        self.stability_counter
    }

    /// Lifetime transitions.
    pub fn transitions(&self) -> u64 {
        self.transitions
    }

    /// Reason of the last transition.
    pub fn last_reason(&self) -> Option<InterventionReason> {
        self.last_reason
    }

    /// Returns to PASSTHROUGH and zeroes counters.
    pub fn reset(&mut self) {
        self.state = GateState::Passthrough;
        self.stability_counter = 0;
        self.transitions = 0;
        self.last_reason = None;
    }
}
