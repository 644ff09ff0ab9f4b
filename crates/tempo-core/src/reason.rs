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

//! Tags describing why a tick was throttled.
//!
//! Reasons are aggregated by telemetry only. Control flow never branches on
//! them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Why an intervention happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InterventionReason {
    /// 1-second max exceeded the throttle entry threshold.
    ThrottleWindowExceeded,
    /// 5-second average exceeded the throttle entry threshold.
    ThrottleAvgHigh,
    /// The adaptive gate switched to ACTIVE.
    GateActivated,
    /// The adaptive gate returned to PASSTHROUGH.
    GatePassthrough,
    /// Too many spikes inside the panic window.
    PanicWindowSpikes,
    /// Panic protocol is ramping back to normal.
    RecoveringGradual,
    /// Elastic work yielded to world streaming.
    GuardStreaming,
    /// A governance component recorded an internal fault.
    FailsoftError,
    /// The tick budget governor cut elastic work short.
    GovernorCutoff,
    /// A save is in progress.
    IoGuardActive,
    /// Ramping back after a save.
    IoGuardRecovery,
    /// The save completion event never arrived.
    IoGuardTimeout,
    /// Memory pressure forced a reduced budget.
    GcPressureDiet,
    /// Ramping back after memory pressure eased.
    GcPressureRecovering,
    /// Ramping back after an observed collection.
    GcPressurePostGc,
    /// Governance overhead crossed the soft limit.
    BudgetSoftLimit,
    /// Governance overhead crossed the hard limit.
    BudgetHardLimit,
    /// The observer rides a fast vehicle and the engine stepped aside.
    GuardVehicle,
}

impl InterventionReason {
    /// Number of distinct reasons.
    pub const COUNT: usize = 18;

    /// All reasons, in a stable order matching [`InterventionReason::index`].
    pub const ALL: [InterventionReason; Self::COUNT] = [
        InterventionReason::ThrottleWindowExceeded,
        InterventionReason::ThrottleAvgHigh,
        InterventionReason::GateActivated,
        InterventionReason::GatePassthrough,
        InterventionReason::PanicWindowSpikes,
        InterventionReason::RecoveringGradual,
        InterventionReason::GuardStreaming,
        InterventionReason::FailsoftError,
        InterventionReason::GovernorCutoff,
        InterventionReason::IoGuardActive,
        InterventionReason::IoGuardRecovery,
        InterventionReason::IoGuardTimeout,
        InterventionReason::GcPressureDiet,
        InterventionReason::GcPressureRecovering,
        InterventionReason::GcPressurePostGc,
        InterventionReason::BudgetSoftLimit,
        InterventionReason::BudgetHardLimit,
        InterventionReason::GuardVehicle,
    ];

    /// Stable index used for per-reason counter arrays.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Snake-case label used in logs and exported metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            InterventionReason::ThrottleWindowExceeded => "throttle_window_exceeded",
            InterventionReason::ThrottleAvgHigh => "throttle_avg_high",
            InterventionReason::GateActivated => "gate_activated",
            InterventionReason::GatePassthrough => "gate_passthrough",
            InterventionReason::PanicWindowSpikes => "panic_window_spikes",
            InterventionReason::RecoveringGradual => "recovering_gradual",
            InterventionReason::GuardStreaming => "guard_streaming",
            InterventionReason::FailsoftError => "failsoft_error",
            InterventionReason::GovernorCutoff => "governor_cutoff",
            InterventionReason::IoGuardActive => "io_guard_active",
            InterventionReason::IoGuardRecovery => "io_guard_recovery",
            InterventionReason::IoGuardTimeout => "io_guard_timeout",
            InterventionReason::GcPressureDiet => "gc_pressure_diet",
            InterventionReason::GcPressureRecovering => "gc_pressure_recovering",
            InterventionReason::GcPressurePostGc => "gc_pressure_post_gc",
            InterventionReason::BudgetSoftLimit => "budget_soft_limit",
            InterventionReason::BudgetHardLimit => "budget_hard_limit",
            InterventionReason::GuardVehicle => "guard_vehicle",
        }
    }
}

impl fmt::Display for InterventionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_matches_position_in_all() {
        for (i, reason) in InterventionReason::ALL.iter().enumerate() {
            assert_eq!(reason.index(), i);
        }
    }
}
