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

//! Per-tick cache of guard outcomes.
//!
//! Guards are read once in [`GuardEvaluator::update_for_tick`]; every other
//! accessor is a field read so per-item code only tests bits.

use crate::guard::{Guard, GuardFlag, GUARD_GC, GUARD_IO, GUARD_STREAMING, GUARD_VEHICLE};
use tempo_core::{InterventionReason, ThrottleLevel};

/// Reason priority, highest first.
const PRIORITY: [GuardFlag; 4] = [GUARD_VEHICLE, GUARD_STREAMING, GUARD_IO, GUARD_GC];

/// Cached guard outcome for the current tick.
#[derive(Debug, Clone)]
pub struct GuardEvaluator {
    flags: GuardFlag,
    multiplier: f64,
    override_level: Option<ThrottleLevel>,
    last_reason: Option<InterventionReason>,
    evaluations: u64,
}

impl Default for GuardEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl GuardEvaluator {
    /// Creates an evaluator with no active guard.
    pub fn new() -> Self {
        Self {
            flags: 0,
            multiplier: 1.0,
            override_level: None,
            last_reason: None,
            evaluations: 0,
        }
    }

    /// Reads every guard and caches the outcome.
    ///
    /// Returns the flags of guards that became active on this tick.
    pub fn update_for_tick(&mut self, guards: &[&dyn Guard]) -> GuardFlag {
        let previous = self.flags;
        let mut flags = 0;
        let mut multiplier = 1.0_f64;
        let mut forced: Option<ThrottleLevel> = None;
        let mut reasons: [Option<InterventionReason>; PRIORITY.len()] = [None; PRIORITY.len()];

        for guard in guards {
            if !guard.is_active() {
                continue;
            }
            flags |= guard.flag();
            multiplier = multiplier.min(guard.multiplier());
            if let Some(level) = guard.override_level() {
                forced = Some(forced.map_or(level, |f| f.most_conservative(level)));
            }
            if let Some(slot) = PRIORITY.iter().position(|f| *f == guard.flag()) {
                reasons[slot] = guard.last_reason();
            }
        }

        self.flags = flags;
        self.multiplier = multiplier.clamp(0.0, 1.0);
        self.override_level = match (forced, ThrottleLevel::from_multiplier(self.multiplier)) {
            (Some(a), Some(b)) => Some(a.most_conservative(b)),
            (a, b) => a.or(b),
        };
        self.last_reason = reasons.into_iter().flatten().next();
        self.evaluations += 1;
        flags & !previous
    }

    /// Whether any guard is active.
    #[inline]
    pub fn is_blocked(&self) -> bool {
        self.flags != 0
    }

    /// Whether the guard with `flag` is active.
    #[inline]
    pub fn has(&self, flag: GuardFlag) -> bool {
        self.flags & flag != 0
    }

    /// Raw flags.
    #[inline]
    pub fn flags(&self) -> GuardFlag {
        self.flags
    }

    /// Level forced by the guards, if any.
    #[inline]
    pub fn override_level(&self) -> Option<ThrottleLevel> {
        self.override_level
    }

    /// Minimum multiplier across active guards; 1.0 when none is.
    #[inline]
    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    /// Reason of the highest-priority active guard.
    #[inline]
    pub fn last_reason(&self) -> Option<InterventionReason> {
        self.last_reason
    }

    /// Number of `update_for_tick` calls.
    pub fn evaluations(&self) -> u64 {
        self.evaluations
    }

    /// Clears the cache.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed {
        flag: GuardFlag,
        active: bool,
        multiplier: f64,
        reason: InterventionReason,
        forced: Option<ThrottleLevel>,
    }

    impl Guard for Fixed {
        fn name(&self) -> &'static str {
            "Fixed"
        }
        fn flag(&self) -> GuardFlag {
            self.flag
        }
        fn is_active(&self) -> bool {
            self.active
        }
        fn multiplier(&self) -> f64 {
            self.multiplier
        }
        fn last_reason(&self) -> Option<InterventionReason> {
            Some(self.reason)
        }
        fn override_level(&self) -> Option<ThrottleLevel> {
            self.forced
        }
    }

    fn io(active: bool, multiplier: f64) -> Fixed {
        Fixed {
            flag: GUARD_IO,
            active,
            multiplier,
            reason: InterventionReason::IoGuardActive,
            forced: None,
        }
    }

    fn gc(active: bool, multiplier: f64) -> Fixed {
        Fixed {
            flag: GUARD_GC,
            active,
            multiplier,
            reason: InterventionReason::GcPressureDiet,
            forced: None,
        }
    }

    #[test]
    fn test_idle_guards_leave_no_trace() {
        let mut eval = GuardEvaluator::new();
        let (a, b) = (io(false, 0.3), gc(false, 0.65));
        assert_eq!(eval.update_for_tick(&[&a, &b]), 0);
        assert!(!eval.is_blocked());
        assert_eq!(eval.multiplier(), 1.0);
        assert_eq!(eval.override_level(), None);
        assert_eq!(eval.last_reason(), None);
    }

    #[test]
    fn test_minimum_multiplier_and_override() {
        let mut eval = GuardEvaluator::new();
        let (a, b) = (io(true, 0.3), gc(true, 0.65));
        let rising = eval.update_for_tick(&[&a, &b]);
        assert_eq!(rising, GUARD_IO | GUARD_GC);
        assert!(eval.has(GUARD_IO) && eval.has(GUARD_GC));
        assert!(!eval.has(GUARD_STREAMING));
        assert_eq!(eval.multiplier(), 0.3);
        assert_eq!(eval.override_level(), Some(ThrottleLevel::Low));
        // IO outranks GC.
        assert_eq!(eval.last_reason(), Some(InterventionReason::IoGuardActive));

        // Still active: not a rising edge.
        assert_eq!(eval.update_for_tick(&[&a, &b]), 0);
    }

    #[test]
    fn test_streaming_override_wins() {
        let mut eval = GuardEvaluator::new();
        let streaming = Fixed {
            flag: GUARD_STREAMING,
            active: true,
            multiplier: 1.0,
            reason: InterventionReason::GuardStreaming,
            forced: Some(ThrottleLevel::Minimal),
        };
        let b = gc(true, 0.65);
        eval.update_for_tick(&[&b, &streaming]);
        assert_eq!(eval.override_level(), Some(ThrottleLevel::Minimal));
        assert_eq!(eval.last_reason(), Some(InterventionReason::GuardStreaming));
        assert_eq!(eval.multiplier(), 0.65);
    }

    #[test]
    fn test_mild_multiplier_forces_nothing() {
        let mut eval = GuardEvaluator::new();
        let b = gc(true, 0.65);
        eval.update_for_tick(&[&b]);
        assert!(eval.is_blocked());
        assert_eq!(eval.override_level(), None);
    }
}
