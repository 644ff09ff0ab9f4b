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

//! Spike panic protocol.
//!
//! Counts spike ticks inside a trailing time window and drives a
//! NORMAL → PANIC → RECOVERING state machine. Recovery is graduated: the
//! budget multiplier ramps 0.5 → 0.75 → 1.0 over three phases, and any spike
//! while recovering goes straight back to PANIC.
//!
//! Spikes are sparse and irregular in real time, so the window is a queue of
//! timestamps pruned on every read rather than a per-tick ring.

use std::collections::VecDeque;
use std::time::Duration;
use tempo_core::{GovernanceConfig, InterventionReason, PanicState, Transition};

/// Number of recovery phases before returning to NORMAL.
const RECOVERY_PHASES: u8 = 3;

/// Event timestamps inside a trailing time window.
#[derive(Debug, Clone)]
pub struct SlidingWindowCounter {
    window: Duration,
    timestamps: VecDeque<Duration>,
}

impl SlidingWindowCounter {
    /// Creates an empty counter over `window`.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            timestamps: VecDeque::new(),
        }
    }

    /// Records an event at `now`.
    pub fn record(&mut self, now: Duration) {
        self.timestamps.push_back(now);
        self.prune(now);
    }

    /// Events no older than the window, as seen from `now`.
    pub fn count(&mut self, now: Duration) -> usize {
        self.prune(now);
        self.timestamps.len()
    }

    fn prune(&mut self, now: Duration) {
        let Some(cutoff) = now.checked_sub(self.window) else {
            return;
        };
        while self.timestamps.front().is_some_and(|&t| t < cutoff) {
            self.timestamps.pop_front();
        }
    }

    /// Forgets every event.
    pub fn clear(&mut self) {
        self.timestamps.clear();
    }
}

/// The spike panic state machine.
#[derive(Debug, Clone)]
pub struct SpikePanicProtocol {
    spike_threshold_ms: f64,
    spike_count_threshold: usize,
    recovery_phase_ticks: u32,
    panic_multiplier: f64,
    spikes: SlidingWindowCounter,

    state: PanicState,
    recovery_phase: u8,
    recovery_tick_counter: u32,
    normal_tick_counter: u32,
    last_reason: Option<InterventionReason>,
}

impl SpikePanicProtocol {
    /// Creates a protocol in NORMAL.
    pub fn new(config: &GovernanceConfig) -> Self {
        let window = Duration::from_secs_f64(config.spike_window_ms.max(0.0) / 1000.0);
        log::info!(
            "SpikePanic: initialized (window: {}ms, threshold: {} spikes >= {}ms)",
            config.spike_window_ms,
            config.spike_count_threshold,
            config.spike_threshold_ms
        );
        Self {
            spike_threshold_ms: config.spike_threshold_ms,
            spike_count_threshold: config.spike_count_threshold.max(1),
            recovery_phase_ticks: config.panic_recovery_ticks.max(1),
            panic_multiplier: config.panic_multiplier,
            spikes: SlidingWindowCounter::new(window),
            state: PanicState::Normal,
            recovery_phase: 0,
            recovery_tick_counter: 0,
            normal_tick_counter: 0,
            last_reason: None,
        }
    }

    /// Feeds one completed tick that ended at `now`.
    ///
    /// Returns the state change caused by this tick, if any.
    pub fn record_tick(&mut self, duration_ms: f64, now: Duration) -> Option<Transition<PanicState>> {
        let before = self.state;
        let is_spike = duration_ms >= self.spike_threshold_ms;
        if is_spike {
            self.spikes.record(now);
        }

        match self.state {
            PanicState::Normal => {
                let count = self.spikes.count(now);
                if count >= self.spike_count_threshold {
                    self.enter_panic(count);
                }
            }
            PanicState::Panic => {
                if is_spike {
                    self.normal_tick_counter = 0;
                } else {
                    self.normal_tick_counter += 1;
                    if self.normal_tick_counter >= self.recovery_phase_ticks {
                        self.enter_recovering();
                    }
                }
            }
            PanicState::Recovering => {
                if is_spike {
                    let count = self.spikes.count(now);
                    self.enter_panic(count);
                } else {
                    self.recovery_tick_counter += 1;
                    if self.recovery_tick_counter >= self.recovery_phase_ticks {
                        self.recovery_tick_counter = 0;
                        self.recovery_phase += 1;
                        if self.recovery_phase >= RECOVERY_PHASES {
                            self.enter_normal();
                        } else {
                            log::info!(
                                "SpikePanic: recovery phase {}/{} (multiplier: {:.2})",
                                self.recovery_phase,
                                RECOVERY_PHASES,
                                self.multiplier()
                            );
                        }
                    }
                }
            }
        }

        Transition::between(before, self.state)
    }

    fn enter_panic(&mut self, spikes_in_window: usize) {
        self.state = PanicState::Panic;
        self.recovery_phase = 0;
        self.recovery_tick_counter = 0;
        self.normal_tick_counter = 0;
        self.last_reason = Some(InterventionReason::PanicWindowSpikes);
        log::warn!(
            "SpikePanic: PANIC entered ({} spikes in {}ms window)",
            spikes_in_window,
            self.spikes.window.as_millis()
        );
    }

    fn enter_recovering(&mut self) {
        self.state = PanicState::Recovering;
        self.recovery_phase = 0;
        self.recovery_tick_counter = 0;
        self.last_reason = Some(InterventionReason::RecoveringGradual);
        log::info!("SpikePanic: PANIC → RECOVERING");
    }

    fn enter_normal(&mut self) {
        self.state = PanicState::Normal;
        self.recovery_phase = 0;
        self.recovery_tick_counter = 0;
        self.normal_tick_counter = 0;
        self.last_reason = None;
        log::info!("SpikePanic: RECOVERING → NORMAL");
    }

    /// Current state.
    pub fn state(&self) -> PanicState {
        self.state
    }

    /// Current recovery phase, 0 outside RECOVERING.
    pub fn recovery_phase(&self) -> u8 {
        self.recovery_phase
    }

    /// Budget multiplier implied by the current state.
    pub fn multiplier(&self) -> f64 {
        match self.state {
            PanicState::Panic => self.panic_multiplier,
            PanicState::Recovering => 0.5 + 0.25 * f64::from(self.recovery_phase),
            PanicState::Normal => 1.0,
        }
    }

    /// Why the protocol is intervening, if it is.
    pub fn last_reason(&self) -> Option<InterventionReason> {
        self.last_reason
    }

    /// Returns to NORMAL and forgets every spike.
    pub fn reset(&mut self) {
        self.state = PanicState::Normal;
        self.recovery_phase = 0;
        self.recovery_tick_counter = 0;
        self.normal_tick_counter = 0;
        self.last_reason = None;
        self.spikes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn protocol() -> SpikePanicProtocol {
        SpikePanicProtocol::new(&GovernanceConfig::default())
    }

    #[test]
    fn test_sliding_window_prunes_old_events() {
        let mut window = SlidingWindowCounter::new(ms(5000));
        window.record(ms(0));
        window.record(ms(1000));
        assert_eq!(window.count(ms(1000)), 2);
        assert_eq!(window.count(ms(5500)), 1);
        assert_eq!(window.count(ms(7000)), 0);
    }

    #[test]
    fn test_two_spikes_inside_window_enter_panic() {
        let mut p = protocol();
        assert_eq!(p.record_tick(150.0, ms(0)), None);
        let change = p.record_tick(150.0, ms(1000));
        assert_eq!(
            change,
            Some(Transition {
                from: PanicState::Normal,
                to: PanicState::Panic
            })
        );
        assert_eq!(p.multiplier(), 0.1);
        assert_eq!(p.last_reason(), Some(InterventionReason::PanicWindowSpikes));
    }

    #[test]
    fn test_spikes_outside_window_do_not_panic() {
        let mut p = protocol();
        p.record_tick(150.0, ms(0));
        p.record_tick(150.0, ms(6000));
        assert_eq!(p.state(), PanicState::Normal);
    }

    #[test]
    fn test_spike_threshold_is_inclusive() {
        let mut p = protocol();
        p.record_tick(100.0, ms(0));
        p.record_tick(100.0, ms(10));
        assert_eq!(p.state(), PanicState::Panic);
    }

    #[test]
    fn test_panic_recovers_after_quiet_ticks() {
        let mut p = protocol();
        p.record_tick(150.0, ms(0));
        p.record_tick(150.0, ms(100));
        for i in 0..29 {
            p.record_tick(5.0, ms(200 + i));
        }
        assert_eq!(p.state(), PanicState::Panic);
        p.record_tick(5.0, ms(300));
        assert_eq!(p.state(), PanicState::Recovering);
        assert_eq!(p.multiplier(), 0.5);
    }

    #[test]
    fn test_spike_in_panic_resets_quiet_counter() {
        let mut p = protocol();
        p.record_tick(150.0, ms(0));
        p.record_tick(150.0, ms(100));
        for _ in 0..20 {
            p.record_tick(5.0, ms(200));
        }
        p.record_tick(150.0, ms(300));
        for _ in 0..29 {
            p.record_tick(5.0, ms(400));
        }
        assert_eq!(p.state(), PanicState::Panic);
    }

    #[test]
    fn test_graduated_recovery_ramps_to_normal() {
        let mut p = protocol();
        p.record_tick(150.0, ms(0));
        p.record_tick(150.0, ms(100));
        // Quiet ticks far enough in the future that the window is empty.
        let mut t = 10_000;
        let mut tick = |p: &mut SpikePanicProtocol| {
            t += 16;
            p.record_tick(5.0, ms(t))
        };
        for _ in 0..30 {
            tick(&mut p);
        }
        assert_eq!(p.state(), PanicState::Recovering);

        for _ in 0..30 {
            tick(&mut p);
        }
        assert_eq!(p.recovery_phase(), 1);
        assert_eq!(p.multiplier(), 0.75);

        for _ in 0..30 {
            tick(&mut p);
        }
        assert_eq!(p.recovery_phase(), 2);
        assert_eq!(p.multiplier(), 1.0);

        for _ in 0..29 {
            tick(&mut p);
        }
        assert_eq!(p.state(), PanicState::Recovering);
        let change = tick(&mut p);
        assert_eq!(change.map(|c| c.to), Some(PanicState::Normal));
        assert_eq!(p.multiplier(), 1.0);
        assert_eq!(p.last_reason(), None);
    }

    #[test]
    fn test_spike_while_recovering_reenters_panic() {
        let mut p = protocol();
        p.record_tick(150.0, ms(0));
        p.record_tick(150.0, ms(100));
        for _ in 0..30 {
            p.record_tick(5.0, ms(200));
        }
        assert_eq!(p.state(), PanicState::Recovering);
        let change = p.record_tick(150.0, ms(300));
        assert_eq!(change.map(|c| c.to), Some(PanicState::Panic));
        assert_eq!(p.recovery_phase(), 0);
    }

    #[test]
    fn test_reset_returns_to_normal() {
        let mut p = protocol();
        p.record_tick(150.0, ms(0));
        p.record_tick(150.0, ms(1));
        p.reset();
        assert_eq!(p.state(), PanicState::Normal);
        // The window was cleared: one spike is not enough.
        p.record_tick(150.0, ms(2));
        assert_eq!(p.state(), PanicState::Normal);
    }
}
