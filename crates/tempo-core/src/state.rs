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

//! State enumerations of the governance state machines.
//!
//! They live here rather than next to their machines so telemetry events can
//! carry them without depending on `tempo-control`.

use serde::{Deserialize, Serialize};

/// Spike panic protocol state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PanicState {
    /// No emergency.
    #[default]
    Normal,
    /// Too many spikes in the trailing window; aggressive reduction.
    Panic,
    /// Ramping back to normal in phases.
    Recovering,
}

/// Adaptive gate state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum GateState {
    /// Healthy: the rest of the governance machinery is skipped.
    #[default]
    Passthrough,
    /// Governance runs.
    Active,
}

/// I/O guard state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum IoGuardState {
    /// No save in progress.
    #[default]
    Idle,
    /// Save announced; pre-emptive reduction.
    Enter,
    /// Save running.
    Active,
    /// Save finished; ramping back.
    Exit,
    /// Re-entry delay.
    Cooldown,
}

/// GC pressure guard state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum GcGuardState {
    /// Pressure is low.
    #[default]
    Normal,
    /// Pressure is high; reduced budget.
    Diet,
    /// Pressure eased; ramping back.
    Recovering,
    /// A collection was observed; ramping back.
    PostGcRecovery,
}

/// A state change reported by a state machine on the tick it happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition<S> {
    /// State before the tick.
    pub from: S,
    /// State after the tick.
    pub to: S,
}

impl<S: PartialEq> Transition<S> {
    /// Returns a transition when `from != to`, `None` otherwise.
    pub fn between(from: S, to: S) -> Option<Self> {
        if from == to {
            None
        } else {
            Some(Self { from, to })
        }
    }
}
