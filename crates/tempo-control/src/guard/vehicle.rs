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

//! Puts the engine in passive mode while the observer drives a fast vehicle.
//!
//! Throttling objects the observer flies past is visible and saves little,
//! so above the entry speed the engine steps aside until the vehicle slows
//! below the exit speed or the observer gets out.

use super::{Guard, GuardFlag, GUARD_VEHICLE};
use crate::error::GovernanceError;
use crate::failsoft::{ErrorBudget, ErrorVerdict};
use tempo_core::{GovernanceConfig, InterventionReason, QueryError};

/// Vehicle guard.
#[derive(Debug, Clone)]
pub struct VehicleGuard {
    enabled: bool,
    entry_kmh: f64,
    exit_kmh: f64,

    passive: bool,
    passive_ticks: u64,
    activations: u64,
    errors: ErrorBudget,
}

impl VehicleGuard {
    /// Creates a guard that is not passive.
    pub fn new(config: &GovernanceConfig) -> Self {
        Self {
            enabled: config.vehicle_guard_enabled,
            entry_kmh: config.vehicle_speed_entry_kmh,
            exit_kmh: config.vehicle_speed_exit_kmh,
            passive: false,
            passive_ticks: 0,
            activations: 0,
            errors: ErrorBudget::new(config.vehicle_max_errors),
        }
    }

    /// Re-evaluates passive mode from the observer's vehicle speed in km/h,
    /// `None` meaning the observer is on foot.
    ///
    /// Returns the new passive flag when it changed.
    pub fn update(&mut self, vehicle_speed: Result<Option<f64>, QueryError>) -> Option<bool> {
        if !self.is_operational() {
            return None;
        }
        let speed = match vehicle_speed {
            Ok(Some(speed)) if !speed.is_finite() => {
                return self.record_fault(GovernanceError::InvalidSample {
                    what: "vehicle_speed",
                    value: speed,
                })
            }
            Ok(speed) => {
                self.errors.record_success();
                speed
            }
            Err(err) => return self.record_fault(err.into()),
        };

        let passive = match speed {
            None => false,
            Some(kmh) if self.passive => kmh >= self.exit_kmh,
            Some(kmh) => kmh > self.entry_kmh,
        };
        if passive {
            self.passive_ticks += 1;
        }
        if passive == self.passive {
            return None;
        }
        self.passive = passive;
        match speed {
            Some(kmh) if passive => {
                self.activations += 1;
                log::info!("VehicleGuard: passive (vehicle at {:.1} km/h)", kmh);
            }
            Some(kmh) => log::info!("VehicleGuard: resumed (vehicle at {:.1} km/h)", kmh),
            None => log::info!("VehicleGuard: resumed (left vehicle)"),
        }
        Some(passive)
    }

    /// Counts a fault. On trip the guard leaves passive mode for good.
    pub fn record_fault(&mut self, error: GovernanceError) -> Option<bool> {
        let message = error.to_string();
        match self.errors.record_error(error) {
            ErrorVerdict::Tolerated => {
                log::warn!(
                    "VehicleGuard: error {}/{}: {}",
                    self.errors.consecutive(),
                    self.errors.ceiling(),
                    message
                );
                None
            }
            ErrorVerdict::Tripped => {
                log::error!(
                    "VehicleGuard: {} consecutive errors, guard DISABLED ({})",
                    self.errors.ceiling(),
                    message
                );
                let was_passive = std::mem::replace(&mut self.passive, false);
                was_passive.then_some(false)
            }
            ErrorVerdict::AlreadyDisabled => None,
        }
    }

    fn is_operational(&self) -> bool {
        self.enabled && !self.errors.is_disabled()
    }

    /// Whether the engine should stay out of the way this tick.
    pub fn is_passive(&self) -> bool {
        self.is_operational() && self.passive
    }

    /// Ticks spent passive.
    pub fn passive_ticks(&self) -> u64 {
        self.passive_ticks
    }

    /// Times passive mode was entered.
    pub fn activations(&self) -> u64 {
        self.activations
    }

    /// Whether the error budget is exhausted.
    pub fn is_failed(&self) -> bool {
        self.errors.is_disabled()
    }

    /// Leaves passive mode and forgets faults.
    pub fn reset(&mut self) {
        self.passive = false;
        self.passive_ticks = 0;
        self.activations = 0;
        self.errors.reset();
    }
}

impl Guard for VehicleGuard {
    fn name(&self) -> &'static str {
        "VehicleGuard"
    }

    fn flag(&self) -> GuardFlag {
        GUARD_VEHICLE
    }

    fn is_active(&self) -> bool {
        self.is_passive()
    }

    fn multiplier(&self) -> f64 {
        1.0
    }

    fn last_reason(&self) -> Option<InterventionReason> {
        self.is_passive().then_some(InterventionReason::GuardVehicle)
    }
}
