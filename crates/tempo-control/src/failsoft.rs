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

//! Fail-soft degradation.
//!
//! An [`ErrorBudget`] counts consecutive internal faults. When the count
//! reaches its ceiling the budget is exhausted and stays so until an explicit
//! reset: nothing clears it automatically. The [`FailsoftController`] wraps
//! the engine-wide budget; the guards each own their own.

use crate::error::GovernanceError;

/// Result of recording a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorVerdict {
    /// Below the ceiling.
    Tolerated,
    /// This fault reached the ceiling; the budget is now exhausted.
    Tripped,
    /// The budget was already exhausted.
    AlreadyDisabled,
}

/// Consecutive-failure counter with a sticky disabled flag.
#[derive(Debug, Clone)]
pub struct ErrorBudget {
    ceiling: u32,
    consecutive: u32,
    disabled: bool,
    last_error: Option<GovernanceError>,
}

impl ErrorBudget {
    /// Creates a budget tripping after `ceiling` consecutive faults (minimum 1).
    pub fn new(ceiling: u32) -> Self {
        Self {
            ceiling: ceiling.max(1),
            consecutive: 0,
            disabled: false,
            last_error: None,
        }
    }

    /// Resets the consecutive counter. Does not clear the disabled flag.
    pub fn record_success(&mut self) {
        self.consecutive = 0;
    }

    /// Counts a fault.
    pub fn record_error(&mut self, error: GovernanceError) -> ErrorVerdict {
        self.last_error = Some(error);
        if self.disabled {
            return ErrorVerdict::AlreadyDisabled;
        }
        self.consecutive += 1;
        if self.consecutive >= self.ceiling {
            self.disabled = true;
            ErrorVerdict::Tripped
        } else {
            ErrorVerdict::Tolerated
        }
    }

    /// Whether the budget is exhausted.
    #[inline]
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Consecutive faults so far.
    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }

    /// Ceiling.
    pub fn ceiling(&self) -> u32 {
        self.ceiling
    }

    /// Last recorded fault.
    pub fn last_error(&self) -> Option<&GovernanceError> {
        self.last_error.as_ref()
    }

    /// Clears everything, including the disabled flag.
    pub fn reset(&mut self) {
        self.consecutive = 0;
        self.disabled = false;
        self.last_error = None;
    }
}

/// Engine-wide kill switch for intervention.
///
/// Checked by the orchestrator before any other component on every tick.
#[derive(Debug, Clone)]
pub struct FailsoftController {
    budget: ErrorBudget,
    total_errors: u64,
    last_error_tick: Option<u64>,
}

impl FailsoftController {
    /// Creates a controller tripping after `max_consecutive_errors`.
    pub fn new(max_consecutive_errors: u32) -> Self {
        Self {
            budget: ErrorBudget::new(max_consecutive_errors),
            total_errors: 0,
            last_error_tick: None,
        }
    }

    /// A tick completed without faults.
    pub fn record_success(&mut self) {
        self.budget.record_success();
    }

    /// Counts a fault raised on `tick`.
    pub fn record_error(&mut self, error: GovernanceError, tick: u64) -> ErrorVerdict {
        self.total_errors += 1;
        self.last_error_tick = Some(tick);
        let message = error.to_string();
        let verdict = self.budget.record_error(error);
        match verdict {
            ErrorVerdict::Tolerated => log::warn!(
                "Failsoft: error {}/{}: {}",
                self.budget.consecutive(),
                self.budget.ceiling(),
                message
            ),
            ErrorVerdict::Tripped => {
                log::error!("Failsoft: ============================================");
                log::error!(
                    "Failsoft: {} consecutive errors, intervention DISABLED",
                    self.budget.ceiling()
                );
                log::error!("Failsoft: last error: {}", message);
                log::error!("Failsoft: manual reset required");
                log::error!("Failsoft: ============================================");
            }
            ErrorVerdict::AlreadyDisabled => {
                log::debug!("Failsoft: error while disabled: {}", message)
            }
        }
        verdict
    }

    /// Whether all intervention is disabled.
    #[inline]
    pub fn is_intervention_disabled(&self) -> bool {
        self.budget.is_disabled()
    }

    /// Consecutive faults so far.
    pub fn consecutive_errors(&self) -> u32 {
        self.budget.consecutive()
    }

    /// Lifetime faults.
    pub fn total_errors(&self) -> u64 {
        self.total_errors
    }

    /// Last fault, if any.
    pub fn last_error(&self) -> Option<&GovernanceError> {
        self.budget.last_error()
    }

    /// Tick index of the last fault.
    pub fn last_error_tick(&self) -> Option<u64> {
        self.last_error_tick
    }

    /// Re-enables intervention. The only way to clear the disabled flag.
    pub fn manual_reset(&mut self) {
        let was_disabled = self.budget.is_disabled();
        self.budget.reset();
        self.last_error_tick = None;
        if was_disabled {
            log::info!("Failsoft: manual reset, intervention re-enabled");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fault() -> GovernanceError {
        GovernanceError::Injected("boom".into())
    }

    #[test]
    fn test_ceiling_consecutive_errors_disable() {
        let mut fs = FailsoftController::new(3);
        assert_eq!(fs.record_error(fault(), 1), ErrorVerdict::Tolerated);
        assert_eq!(fs.record_error(fault(), 2), ErrorVerdict::Tolerated);
        assert!(!fs.is_intervention_disabled());
        assert_eq!(fs.record_error(fault(), 3), ErrorVerdict::Tripped);
        assert!(fs.is_intervention_disabled());
        assert_eq!(fs.last_error_tick(), Some(3));
    }

    #[test]
    fn test_success_before_ceiling_resets_counter() {
        let mut fs = FailsoftController::new(3);
        fs.record_error(fault(), 1);
        fs.record_error(fault(), 2);
        fs.record_success();
        assert_eq!(fs.consecutive_errors(), 0);
        fs.record_error(fault(), 3);
        fs.record_error(fault(), 4);
        assert!(!fs.is_intervention_disabled());
        assert_eq!(fs.total_errors(), 4);
    }

    #[test]
    fn test_disabled_flag_survives_success() {
        let mut fs = FailsoftController::new(1);
        fs.record_error(fault(), 1);
        for _ in 0..100 {
            fs.record_success();
        }
        assert!(fs.is_intervention_disabled());
        assert_eq!(fs.record_error(fault(), 2), ErrorVerdict::AlreadyDisabled);
    }

    #[test]
    fn test_manual_reset_reenables() {
        let mut fs = FailsoftController::new(1);
        fs.record_error(fault(), 1);
        fs.manual_reset();
        assert!(!fs.is_intervention_disabled());
        assert_eq!(fs.consecutive_errors(), 0);
        assert!(fs.last_error().is_none());
    }

    #[test]
    fn test_error_budget_keeps_last_error() {
        let mut budget = ErrorBudget::new(5);
        budget.record_error(GovernanceError::Injected("first".into()));
        budget.record_error(GovernanceError::Injected("second".into()));
        assert_eq!(
            budget.last_error(),
            Some(&GovernanceError::Injected("second".into()))
        );
        assert_eq!(budget.consecutive(), 2);
    }
}
