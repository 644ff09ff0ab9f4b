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

//! Events published by the orchestrator to an optional observer.

use crate::level::ThrottleLevel;
use crate::reason::InterventionReason;
use crate::state::{GateState, GcGuardState, IoGuardState, PanicState, Transition};
use serde::Serialize;

/// A governance event, emitted on the tick it happened.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TelemetryEvent {
    /// The adaptive gate changed state.
    Gate {
        /// Tick index of the change.
        tick: u64,
        /// The change.
        transition: Transition<GateState>,
    },
    /// The spike panic protocol changed state.
    Panic {
        /// Tick index of the change.
        tick: u64,
        /// The change.
        transition: Transition<PanicState>,
    },
    /// The I/O guard changed state.
    IoGuard {
        /// Tick index of the change.
        tick: u64,
        /// The change.
        transition: Transition<IoGuardState>,
    },
    /// The GC pressure guard changed state.
    GcGuard {
        /// Tick index of the change.
        tick: u64,
        /// The change.
        transition: Transition<GcGuardState>,
    },
    /// Throttle hysteresis escalated or released.
    Hysteresis {
        /// Tick index of the change.
        tick: u64,
        /// Whether hysteresis is now holding a conservative level.
        active: bool,
        /// The level hysteresis now holds.
        level: ThrottleLevel,
        /// Why it escalated, if it did.
        reason: Option<InterventionReason>,
    },
    /// Fail-soft disabled all intervention.
    FailsoftTripped {
        /// Tick index of the trip.
        tick: u64,
        /// Display form of the last fault.
        cause: String,
    },
    /// Fail-soft was reset by hand.
    FailsoftReset,
}
