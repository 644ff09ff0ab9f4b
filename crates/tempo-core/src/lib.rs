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

//! # Tempo Core
//!
//! Foundational crate containing the value types, configuration, and interface
//! contracts shared by the governance engine and its host integration.
//!
//! Nothing in here holds per-tick decision state. `tempo-control` owns the
//! state machines, `tempo-telemetry` owns the counters a reporting thread reads.

#![warn(missing_docs)]

pub mod clock;
pub mod config;
pub mod level;
pub mod reason;
pub mod signal;
pub mod state;
pub mod telemetry;
pub mod world;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{ConfigError, GovernanceConfig};
pub use level::{StepCategory, ThrottleLevel};
pub use reason::InterventionReason;
pub use signal::{PressureSample, SaveKind};
pub use state::{GateState, GcGuardState, IoGuardState, PanicState, Transition};
pub use world::{Engagement, ObjectId, QueryError, WorldQuery};
