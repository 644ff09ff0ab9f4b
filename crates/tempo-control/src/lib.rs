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

//! # Tempo Control
//!
//! The adaptive tick-budget governance engine: rolling statistics, the
//! budget governor, the spike panic protocol, the adaptive gate, throttle
//! hysteresis, the pressure guards, and the [`GovernanceEngine`] that runs
//! them once per tick.
//!
//! ```no_run
//! use tempo_control::GovernanceEngine;
//! use tempo_core::{Engagement, GovernanceConfig};
//!
//! let mut engine = GovernanceEngine::new(GovernanceConfig::default());
//! engine.begin_tick();
//! for distance_sq in [100.0, 900.0, 10_000.0] {
//!     if !engine.should_continue() {
//!         break;
//!     }
//!     let _level = engine.current_throttle_level(distance_sq, Engagement::IDLE);
//! }
//! engine.end_tick();
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod evaluator;
pub mod failsoft;
pub mod gate;
pub mod governor;
pub mod guard;
pub mod metrics;
pub mod panic;
pub mod service;
pub mod stats;
pub mod step;
pub mod throttle;

pub use error::{GovernanceError, GovernanceResult};
pub use evaluator::GuardEvaluator;
pub use failsoft::{ErrorBudget, ErrorVerdict, FailsoftController};
pub use gate::AdaptiveGate;
pub use governor::{OverheadCheck, TickBudgetGovernor};
pub use guard::{GcPressureGuard, Guard, GuardFlag, IoGuard, StreamingGuard, VehicleGuard};
pub use panic::SpikePanicProtocol;
pub use service::GovernanceEngine;
pub use stats::RollingTickStats;
pub use step::StepPolicy;
pub use throttle::{HysteresisChange, ThrottleCalculator, ThrottleStateMachine};
