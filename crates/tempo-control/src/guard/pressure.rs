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

//! Memory pressure score derived from a [`PressureSample`].

use crate::error::{check_non_negative, GovernanceError, GovernanceResult};
use tempo_core::PressureSample;

const W_HEAP: f64 = 0.40;
const W_GC_TIME: f64 = 0.30;
const W_GC_FREQ: f64 = 0.20;
const W_JITTER: f64 = 0.10;

/// Collection time that scores 1.0.
const GC_TIME_NORM_MS: f64 = 8.0;
/// Collections per sample that score 1.0.
const GC_FREQ_NORM: f64 = 1.0;
/// Tick jitter that scores 1.0.
const JITTER_NORM_MS: f64 = 20.0;

const CRITICAL_THRESHOLD: f64 = 0.80;
const HIGH_THRESHOLD: f64 = 0.60;
const ELEVATED_THRESHOLD: f64 = 0.35;
/// Absorbs rounding in the weighted sum so boundary scores land on the upper level.
const LEVEL_EPSILON: f64 = 1e-9;

/// Coarse pressure level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PressureLevel {
    /// Below 0.35.
    Normal,
    /// 0.35 to 0.60.
    Elevated,
    /// 0.60 to 0.80.
    High,
    /// 0.80 and above.
    Critical,
}

/// Weighted pressure score in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GcPressureSignal {
    pressure: f64,
    level: PressureLevel,
    gc_occurred: bool,
}

impl GcPressureSignal {
    /// No pressure.
    pub fn normal() -> Self {
        Self {
            pressure: 0.0,
            level: PressureLevel::Normal,
            gc_occurred: false,
        }
    }

    /// Scores `sample`, with `tick_jitter_ms` taken from rolling tick stats.
    ///
    /// Rejects non-finite values, negative deltas, and heap ratios outside `[0, 1]`.
    pub fn from_sample(sample: &PressureSample, tick_jitter_ms: f64) -> GovernanceResult<Self> {
        let heap = check_non_negative("heap_ratio", sample.heap_ratio)?;
        if heap > 1.0 {
            return Err(GovernanceError::InvalidSample {
                what: "heap_ratio",
                value: heap,
            });
        }
        let gc_time = check_non_negative("gc_time_delta_ms", sample.gc_time_delta_ms)?;
        let jitter = check_non_negative("tick_jitter_ms", tick_jitter_ms)?;

        let pressure = W_HEAP * heap
            + W_GC_TIME * normalize(gc_time, GC_TIME_NORM_MS)
            + W_GC_FREQ * normalize(sample.gc_count_delta as f64, GC_FREQ_NORM)
            + W_JITTER * normalize(jitter, JITTER_NORM_MS);
        let pressure = pressure.clamp(0.0, 1.0);

        Ok(Self {
            pressure,
            level: level_of(pressure),
            gc_occurred: sample.gc_occurred(),
        })
    }

    /// Score in `[0, 1]`.
    pub fn pressure(&self) -> f64 {
        self.pressure
    }

    /// Coarse level.
    pub fn level(&self) -> PressureLevel {
        self.level
    }

    /// Whether the sample observed a collection.
    pub fn gc_occurred(&self) -> bool {
        self.gc_occurred
    }

    /// Whether the level is `Critical`.
    pub fn is_critical(&self) -> bool {
        self.level == PressureLevel::Critical
    }
}

fn normalize(value: f64, base: f64) -> f64 {
    (value / base).clamp(0.0, 1.0)
}

fn level_of(pressure: f64) -> PressureLevel {
    let p = pressure + LEVEL_EPSILON;
    if p >= CRITICAL_THRESHOLD {
        PressureLevel::Critical
    } else if p >= HIGH_THRESHOLD {
        PressureLevel::High
    } else if p >= ELEVATED_THRESHOLD {
        PressureLevel::Elevated
    } else {
        PressureLevel::Normal
    }
}
