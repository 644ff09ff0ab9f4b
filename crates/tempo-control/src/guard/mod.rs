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

//! Pressure-reactive guards.
//!
//! Each guard is a small state machine driven by discrete external events
//! and tick counters, never by wall-clock time. Each maps its state to a
//! budget multiplier in `[0, 1]` and owns an [`ErrorBudget`](crate::failsoft::ErrorBudget):
//! once exhausted the guard reports 1.0 forever.

pub mod gc;
pub mod io;
pub mod pressure;
pub mod streaming;
pub mod vehicle;

pub use gc::GcPressureGuard;
pub use io::IoGuard;
pub use pressure::{GcPressureSignal, PressureLevel};
pub use streaming::StreamingGuard;
pub use vehicle::VehicleGuard;

use tempo_core::{InterventionReason, ThrottleLevel};

/// Bit identifying a guard inside [`GuardEvaluator`](crate::evaluator::GuardEvaluator) flags.
pub type GuardFlag = u8;

/// A save is in progress or being recovered from.
pub const GUARD_IO: GuardFlag = 0x01;
/// Memory pressure.
pub const GUARD_GC: GuardFlag = 0x02;
/// World streaming.
pub const GUARD_STREAMING: GuardFlag = 0x04;
/// The observer drives a fast vehicle.
pub const GUARD_VEHICLE: GuardFlag = 0x08;

/// Read-only view of a guard, consumed once per tick by the evaluator.
pub trait Guard {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// This guard's bit.
    fn flag(&self) -> GuardFlag;

    /// Whether the guard is currently intervening.
    fn is_active(&self) -> bool;

    /// Budget multiplier in `[0, 1]`; 1.0 when idle or disabled.
    fn multiplier(&self) -> f64;

    /// Why the guard is intervening.
    fn last_reason(&self) -> Option<InterventionReason>;

    /// A level this guard forces directly, bypassing multiplier mapping.
    fn override_level(&self) -> Option<ThrottleLevel> {
        None
    }
}
