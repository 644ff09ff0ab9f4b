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

// Drives the governance engine through a synthetic workload on a manual
// clock and prints the final telemetry snapshot.
// Run with: cargo run -p soak -- --scenario mixed --ticks 7200

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tempo_control::GovernanceEngine;
use tempo_core::telemetry::TelemetryEvent;
use tempo_core::{
    Engagement, GovernanceConfig, ManualClock, ObjectId, PressureSample, QueryError, SaveKind,
    StepCategory, WorldQuery,
};

/// Non-elastic cost of every tick.
const BASE_TICK_MS: f64 = 4.0;
/// Cost of one object's elastic work at FULL.
const OBJECT_COST_MS: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Scenario {
    /// Light, steady load.
    Healthy,
    /// Pairs of 150ms stalls.
    Spikes,
    /// Periodic long saves.
    Saves,
    /// Rising heap pressure with periodic collections.
    Pressure,
    /// Everything at once.
    Mixed,
}

#[derive(Debug, Parser)]
#[command(about = "Synthetic soak run of the tempo governance engine")]
struct Args {
    /// JSON configuration file. Defaults apply when absent.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of ticks to simulate.
    #[arg(long, default_value_t = 3600)]
    ticks: u64,

    /// Number of simulated objects.
    #[arg(long, default_value_t = 400)]
    objects: u64,

    /// Workload shape.
    #[arg(long, value_enum, default_value_t = Scenario::Mixed)]
    scenario: Scenario,

    /// Print the snapshot as exported metrics instead of JSON.
    #[arg(long)]
    metrics: bool,
}

/// Objects on a spiral around a single actor; every tenth one is fighting.
struct SpiralWorld {
    objects: u64,
}

impl WorldQuery for SpiralWorld {
    fn distance_squared_to_nearest_actor(&self, object: ObjectId) -> Result<f64, QueryError> {
        if object.0 >= self.objects {
            return Err(QueryError::new("distance", format!("object {} despawned", object.0)));
        }
        let radius = 2.0 + object.0 as f64 * 0.25;
        Ok(radius * radius)
    }

    fn engagement(&self, object: ObjectId) -> Result<Engagement, QueryError> {
        Ok(Engagement {
            attacking: object.0 % 10 == 0,
            ..Engagement::IDLE
        })
    }

    fn observer_speed(&self) -> Result<f64, QueryError> {
        Ok(8.0)
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<GovernanceConfig> {
    let Some(path) = path else {
        return Ok(GovernanceConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config '{}'", path.display()))?;
    GovernanceConfig::from_json_str(&text)
        .with_context(|| format!("Invalid config '{}'", path.display()))
}

/// Extra non-elastic cost injected by the scenario on `tick`.
fn stall_ms(scenario: Scenario, tick: u64) -> f64 {
    let spikes = matches!(scenario, Scenario::Spikes | Scenario::Mixed);
    let saves = matches!(scenario, Scenario::Saves | Scenario::Mixed);
    let mut extra = 0.0;
    if spikes && tick > 0 && (tick % 900 == 0 || tick % 900 == 45) {
        extra += 150.0;
    }
    if saves && tick % 1200 >= 600 && tick % 1200 < 640 {
        extra += 12.0;
    }
    extra
}

fn main() -> Result<()> {
    tempo_telemetry::init_logging("info");
    let args = Args::parse();
    let config = load_config(args.config.as_ref())?;

    let clock = ManualClock::new();
    let (tx, rx) = crossbeam_channel::bounded(4096);
    let mut engine = GovernanceEngine::with_clock(config, Arc::new(clock.clone()))
        .with_world(Box::new(SpiralWorld {
            objects: args.objects,
        }))
        .with_observer(tx);

    log::info!(
        "Soak: {:?} scenario, {} ticks, {} objects",
        args.scenario,
        args.ticks,
        args.objects
    );

    let saves = matches!(args.scenario, Scenario::Saves | Scenario::Mixed);
    let pressure = matches!(args.scenario, Scenario::Pressure | Scenario::Mixed);

    for tick in 0..args.ticks {
        // ── 1. External events ───────────────────────────────────────
        if saves && tick % 1200 == 600 {
            engine.on_save_begin(SaveKind::World, "overworld");
        }
        if saves && tick % 1200 == 640 {
            engine.on_save_end(true);
        }
        if pressure && tick % 60 == 0 {
            let phase = (tick % 1800) as f64 / 1800.0;
            let collected = tick % 1800 == 1740;
            engine.on_pressure_sample(PressureSample::new(
                0.3 + 0.65 * phase,
                if collected { 12.0 } else { 1.0 },
                u64::from(collected),
            ));
        }

        // ── 2. The tick itself ───────────────────────────────────────
        engine.begin_tick();
        clock.advance_ms(BASE_TICK_MS + stall_ms(args.scenario, tick));
        for id in 0..args.objects {
            if !engine.should_continue() {
                break;
            }
            let level = engine.throttle_level_for(ObjectId(id));
            let mut cost = OBJECT_COST_MS * f64::from(level.budget_weight()) / 100.0;
            if engine.should_skip_step(StepCategory::Perception, id, tick) {
                cost *= 0.5;
            }
            clock.advance_ms(cost);
        }
        engine.end_tick();
    }

    // ── 3. Report ────────────────────────────────────────────────────
    let mut transitions = 0usize;
    let mut trips = 0usize;
    for event in rx.try_iter() {
        match event {
            TelemetryEvent::FailsoftTripped { .. } => trips += 1,
            TelemetryEvent::FailsoftReset => {}
            _ => transitions += 1,
        }
    }
    log::info!(
        "Soak: done, {} transitions observed, {} fail-soft trips",
        transitions,
        trips
    );

    let snapshot = engine.snapshot();
    if args.metrics {
        for metric in snapshot.to_metrics() {
            println!("{} = {:?}", metric.id, metric.value);
        }
    } else {
        let json = snapshot
            .to_json()
            .context("Failed to serialize the telemetry snapshot")?;
        println!("{json}");
    }
    Ok(())
}
