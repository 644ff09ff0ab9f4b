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

//! Tunables for the governance engine.
//!
//! [`GovernanceConfig`] is a flat struct supplied once at construction time.
//! Every field has a default, so a JSON document only needs to name the
//! values it overrides. Thresholds of the different state machines overlap
//! without being identical; each one is an independent knob.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An error raised while loading or validating a [`GovernanceConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The document is not valid JSON or does not match the schema.
    #[error("failed to parse governance config: {0}")]
    Parse(#[from] serde_json::Error),
    /// A field holds a value the engine cannot run with.
    #[error("invalid value for `{field}`: {reason}")]
    InvalidValue {
        /// Name of the offending field.
        field: &'static str,
        /// Human-readable explanation.
        reason: String,
    },
}

/// Flat configuration of every governance component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernanceConfig {
    // ── Master switches ──────────────────────────────────────────────
    /// When false, every throttle query answers `Full`.
    pub throttling_enabled: bool,
    /// When false, the step policy never skips work.
    pub step_throttling_enabled: bool,

    // ── Rolling statistics ───────────────────────────────────────────
    /// Samples in the short ("1 second") window.
    pub window_short_ticks: usize,
    /// Samples in the long ("5 seconds") window. Also the history capacity.
    pub window_long_ticks: usize,

    // ── Tick budget governor ─────────────────────────────────────────
    /// Nominal tick budget, in milliseconds.
    pub tick_budget_ms: f64,
    /// Elapsed time at which elastic work is cut for the rest of the tick.
    pub force_cutoff_ms: f64,
    /// Number of `should_continue` calls between two clock reads.
    pub batch_check_size: u32,
    /// Governance overhead per tick that raises a soft-limit notice.
    pub overhead_soft_limit_ms: f64,
    /// Governance overhead per tick after which interventions are refused.
    pub overhead_hard_limit_ms: f64,

    // ── Spike panic protocol ─────────────────────────────────────────
    /// A tick at least this long counts as a spike.
    pub spike_threshold_ms: f64,
    /// Trailing window over which spikes are counted.
    pub spike_window_ms: f64,
    /// Spikes inside the window that trigger a panic.
    pub spike_count_threshold: usize,
    /// Consecutive non-spike ticks per recovery phase.
    pub panic_recovery_ticks: u32,
    /// Budget multiplier while in panic.
    pub panic_multiplier: f64,

    // ── Adaptive gate ────────────────────────────────────────────────
    /// Short-window max above which the gate activates.
    pub gate_entry_max_short_ms: f64,
    /// Long-window average above which the gate activates.
    pub gate_entry_avg_long_ms: f64,
    /// Long-window average below which the gate counts a stable tick.
    pub gate_exit_avg_long_ms: f64,
    /// Consecutive stable ticks needed to return to passthrough.
    pub gate_exit_stability_ticks: u32,

    // ── Throttle hysteresis ──────────────────────────────────────────
    /// Short-window max above which hysteresis escalates.
    pub throttle_entry_max_short_ms: f64,
    /// Long-window average above which hysteresis escalates.
    pub throttle_entry_avg_long_ms: f64,
    /// Long-window average below which hysteresis counts a stable tick.
    pub throttle_exit_avg_long_ms: f64,
    /// Consecutive stable ticks needed to release hysteresis.
    pub throttle_exit_stability_ticks: u32,
    /// Squared distance under which objects run at `Full`.
    pub distance_full_sq: f64,
    /// Squared distance under which objects run at `Reduced`.
    pub distance_reduced_sq: f64,
    /// Squared distance under which objects run at `Low`. Beyond: `Minimal`.
    pub distance_low_sq: f64,
    /// Floor applied to the combined budget multiplier.
    pub min_budget_multiplier: f64,

    // ── Fail-soft ────────────────────────────────────────────────────
    /// Consecutive internal faults that disable all intervention.
    pub max_consecutive_errors: u32,

    // ── I/O guard ────────────────────────────────────────────────────
    /// Enables the save-aware guard.
    pub io_guard_enabled: bool,
    /// Only world saves trigger the guard.
    pub io_world_save_only: bool,
    /// Multiplier while a save is announced.
    pub io_enter_multiplier: f64,
    /// Multiplier while a save runs.
    pub io_active_multiplier: f64,
    /// Multiplier during the re-entry cooldown.
    pub io_cooldown_multiplier: f64,
    /// Ticks spent in the announce state.
    pub io_enter_ticks: u32,
    /// Ticks spent ramping back after a save.
    pub io_recovery_ticks: u32,
    /// Ticks spent in cooldown.
    pub io_cooldown_ticks: u32,
    /// Deadman: maximum ticks a save may stay active.
    pub io_active_timeout_ticks: u32,
    /// Internal faults before the guard disables itself.
    pub io_max_errors: u32,

    // ── GC pressure guard ────────────────────────────────────────────
    /// Enables the memory pressure guard.
    pub gc_guard_enabled: bool,
    /// Pressure at or above which the guard diets.
    pub gc_diet_threshold: f64,
    /// Pressure below which the guard counts a recovery sample.
    pub gc_recovery_threshold: f64,
    /// Multiplier while dieting.
    pub gc_diet_multiplier: f64,
    /// Multiplier while dieting under critical pressure.
    pub gc_critical_multiplier: f64,
    /// Ticks spent ramping back from a diet.
    pub gc_recovery_ticks: u32,
    /// Consecutive low-pressure samples needed to leave a diet.
    pub gc_hysteresis_window: u32,
    /// Ticks spent ramping back after an observed collection.
    pub gc_post_gc_recovery_ticks: u32,
    /// Deadman: maximum ticks in DIET before recovery is forced.
    pub gc_max_diet_ticks: u32,
    /// Internal faults before the guard disables itself.
    pub gc_max_errors: u32,

    // ── Streaming guard ──────────────────────────────────────────────
    /// Enables the world streaming guard.
    pub streaming_guard_enabled: bool,
    /// A tick at least this long counts as a frame drop.
    pub streaming_drop_threshold_ms: f64,
    /// Ticks over which frame drops are counted.
    pub streaming_drop_window_ticks: u32,
    /// Frame drops inside the window needed to yield.
    pub streaming_min_drops: u32,
    /// Observer speed above which streaming is assumed.
    pub streaming_speed_threshold: f64,
    /// Internal faults before the guard disables itself.
    pub streaming_max_errors: u32,

    // ── Vehicle guard ────────────────────────────────────────────────
    /// Enables the fast-vehicle passive mode.
    pub vehicle_guard_enabled: bool,
    /// Vehicle speed in km/h above which the engine goes passive.
    pub vehicle_speed_entry_kmh: f64,
    /// Vehicle speed in km/h below which the engine resumes.
    pub vehicle_speed_exit_kmh: f64,
    /// Internal faults before the guard disables itself.
    pub vehicle_max_errors: u32,

    // ── Telemetry ────────────────────────────────────────────────────
    /// Ticks between two summary log lines. Zero disables the summary.
    pub telemetry_summary_interval_ticks: u64,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            throttling_enabled: true,
            step_throttling_enabled: true,

            window_short_ticks: 60,
            window_long_ticks: 300,

            tick_budget_ms: 16.67,
            force_cutoff_ms: 33.33,
            batch_check_size: 20,
            overhead_soft_limit_ms: 0.5,
            overhead_hard_limit_ms: 2.0,

            spike_threshold_ms: 100.0,
            spike_window_ms: 5000.0,
            spike_count_threshold: 2,
            panic_recovery_ticks: 30,
            panic_multiplier: 0.1,

            gate_entry_max_short_ms: 25.0,
            gate_entry_avg_long_ms: 18.0,
            gate_exit_avg_long_ms: 12.0,
            gate_exit_stability_ticks: 180,

            throttle_entry_max_short_ms: 33.33,
            throttle_entry_avg_long_ms: 20.0,
            throttle_exit_avg_long_ms: 12.0,
            throttle_exit_stability_ticks: 300,
            distance_full_sq: 400.0,
            distance_reduced_sq: 1600.0,
            distance_low_sq: 6400.0,
            min_budget_multiplier: 0.1,

            max_consecutive_errors: 3,

            io_guard_enabled: true,
            io_world_save_only: false,
            io_enter_multiplier: 0.7,
            io_active_multiplier: 0.3,
            io_cooldown_multiplier: 0.9,
            io_enter_ticks: 5,
            io_recovery_ticks: 30,
            io_cooldown_ticks: 10,
            io_active_timeout_ticks: 300,
            io_max_errors: 3,

            gc_guard_enabled: true,
            gc_diet_threshold: 0.60,
            gc_recovery_threshold: 0.35,
            gc_diet_multiplier: 0.65,
            gc_critical_multiplier: 0.45,
            gc_recovery_ticks: 60,
            gc_hysteresis_window: 30,
            gc_post_gc_recovery_ticks: 45,
            gc_max_diet_ticks: 600,
            gc_max_errors: 5,

            streaming_guard_enabled: true,
            streaming_drop_threshold_ms: 50.0,
            streaming_drop_window_ticks: 30,
            streaming_min_drops: 2,
            streaming_speed_threshold: 20.0,
            streaming_max_errors: 3,

            vehicle_guard_enabled: true,
            vehicle_speed_entry_kmh: 30.0,
            vehicle_speed_exit_kmh: 20.0,
            vehicle_max_errors: 3,

            telemetry_summary_interval_ticks: 1200,
        }
    }
}

impl GovernanceConfig {
    /// Parses a JSON document and validates the result.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: GovernanceConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serializes the configuration as pretty-printed JSON.
    pub fn to_json_pretty(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Checks every field for values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_short_ticks == 0 {
            return Err(invalid("window_short_ticks", "must be at least 1"));
        }
        if self.window_long_ticks < self.window_short_ticks {
            return Err(invalid(
                "window_long_ticks",
                format!(
                    "must be >= window_short_ticks ({})",
                    self.window_short_ticks
                ),
            ));
        }
        if self.batch_check_size == 0 {
            return Err(invalid("batch_check_size", "must be at least 1"));
        }
        if self.max_consecutive_errors == 0 {
            return Err(invalid("max_consecutive_errors", "must be at least 1"));
        }
        if self.io_max_errors == 0
            || self.gc_max_errors == 0
            || self.streaming_max_errors == 0
            || self.vehicle_max_errors == 0
        {
            return Err(invalid("*_max_errors", "guard error ceilings must be at least 1"));
        }
        if self.spike_count_threshold == 0 {
            return Err(invalid("spike_count_threshold", "must be at least 1"));
        }
        if self.panic_recovery_ticks == 0 {
            return Err(invalid("panic_recovery_ticks", "must be at least 1"));
        }
        if self.gc_max_diet_ticks == 0 {
            return Err(invalid("gc_max_diet_ticks", "must be at least 1"));
        }

        positive("tick_budget_ms", self.tick_budget_ms)?;
        positive("force_cutoff_ms", self.force_cutoff_ms)?;
        positive("overhead_soft_limit_ms", self.overhead_soft_limit_ms)?;
        positive("overhead_hard_limit_ms", self.overhead_hard_limit_ms)?;
        positive("spike_threshold_ms", self.spike_threshold_ms)?;
        positive("spike_window_ms", self.spike_window_ms)?;
        positive("streaming_drop_threshold_ms", self.streaming_drop_threshold_ms)?;
        positive("vehicle_speed_entry_kmh", self.vehicle_speed_entry_kmh)?;
        positive("vehicle_speed_exit_kmh", self.vehicle_speed_exit_kmh)?;

        if self.overhead_soft_limit_ms > self.overhead_hard_limit_ms {
            return Err(invalid(
                "overhead_soft_limit_ms",
                "must not exceed overhead_hard_limit_ms",
            ));
        }

        exit_below_entry(
            "gate_exit_avg_long_ms",
            self.gate_exit_avg_long_ms,
            self.gate_entry_avg_long_ms,
        )?;
        exit_below_entry(
            "throttle_exit_avg_long_ms",
            self.throttle_exit_avg_long_ms,
            self.throttle_entry_avg_long_ms,
        )?;
        exit_below_entry(
            "vehicle_speed_exit_kmh",
            self.vehicle_speed_exit_kmh,
            self.vehicle_speed_entry_kmh,
        )?;
        exit_below_entry(
            "gc_recovery_threshold",
            self.gc_recovery_threshold,
            self.gc_diet_threshold,
        )?;

        if !(self.distance_full_sq > 0.0
            && self.distance_full_sq < self.distance_reduced_sq
            && self.distance_reduced_sq < self.distance_low_sq)
        {
            return Err(invalid(
                "distance_*_sq",
                "distance bands must be positive and strictly increasing",
            ));
        }

        for (field, value) in [
            ("panic_multiplier", self.panic_multiplier),
            ("min_budget_multiplier", self.min_budget_multiplier),
            ("io_enter_multiplier", self.io_enter_multiplier),
            ("io_active_multiplier", self.io_active_multiplier),
            ("io_cooldown_multiplier", self.io_cooldown_multiplier),
            ("gc_diet_multiplier", self.gc_diet_multiplier),
            ("gc_critical_multiplier", self.gc_critical_multiplier),
            ("gc_diet_threshold", self.gc_diet_threshold),
            ("gc_recovery_threshold", self.gc_recovery_threshold),
        ] {
            unit_interval(field, value)?;
        }

        Ok(())
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        reason: reason.into(),
    }
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(invalid(field, format!("must be a positive number, got {value}")))
    }
}

fn unit_interval(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(invalid(field, format!("must lie in [0, 1], got {value}")))
    }
}

fn exit_below_entry(field: &'static str, exit: f64, entry: f64) -> Result<(), ConfigError> {
    if exit.is_finite() && exit < entry {
        Ok(())
    } else {
        Err(invalid(
            field,
            format!("exit threshold {exit} must be below entry threshold {entry}"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(GovernanceConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config =
            GovernanceConfig::from_json_str(r#"{ "batch_check_size": 8, "io_guard_enabled": false }"#)
                .unwrap();
        assert_eq!(config.batch_check_size, 8);
        assert!(!config.io_guard_enabled);
        assert_eq!(config.gate_exit_stability_ticks, 180);
        assert!((config.force_cutoff_ms - 33.33).abs() < 0.001);
    }

    #[test]
    fn test_zero_batch_size_is_rejected() {
        let err = GovernanceConfig::from_json_str(r#"{ "batch_check_size": 0 }"#).unwrap_err();
        match err {
            ConfigError::InvalidValue { field, .. } => assert_eq!(field, "batch_check_size"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_inverted_gate_thresholds_are_rejected() {
        let config = GovernanceConfig {
            gate_exit_avg_long_ms: 20.0,
            ..GovernanceConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_non_monotonic_distance_bands_are_rejected() {
        let config = GovernanceConfig {
            distance_reduced_sq: 100.0,
            ..GovernanceConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_multiplier_out_of_range_is_rejected() {
        let config = GovernanceConfig {
            io_active_multiplier: 1.5,
            ..GovernanceConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_diet_deadman_is_rejected() {
        let err = GovernanceConfig::from_json_str(r#"{ "gc_max_diet_ticks": 0 }"#).unwrap_err();
        match err {
            ConfigError::InvalidValue { field, .. } => assert_eq!(field, "gc_max_diet_ticks"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_vehicle_exit_must_sit_below_entry() {
        let config = GovernanceConfig {
            vehicle_speed_exit_kmh: 30.0,
            ..GovernanceConfig::default()
        };
        match config.validate() {
            Err(ConfigError::InvalidValue { field, .. }) => {
                assert_eq!(field, "vehicle_speed_exit_kmh")
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_malformed_json_is_a_parse_error() {
        let err = GovernanceConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_pretty_json_names_every_section() {
        let json = GovernanceConfig::default().to_json_pretty().unwrap();
        for key in [
            "window_long_ticks",
            "gate_exit_stability_ticks",
            "io_active_timeout_ticks",
            "gc_post_gc_recovery_ticks",
            "streaming_min_drops",
            "gc_max_diet_ticks",
            "vehicle_speed_entry_kmh",
        ] {
            assert!(json.contains(key), "missing key {key}");
        }
    }
}
