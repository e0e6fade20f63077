use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub const BATTERY_MIN: f32 = 0.0;
pub const BATTERY_MAX: f32 = 100.0;

/// Tunable constants for the battery simulation. Rates are points per
/// second on the 0-100 scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatteryConfig {
    pub drain_rate_per_sec: f32,
    /// Silence shorter than this drains nothing.
    pub grace_period_secs: f32,
    pub recharge_rate_per_sec: f32,
    /// Penalty rate while the filler rate sits in the mild band.
    pub filler_mild_penalty: f32,
    /// Penalty rate at or above the high filler threshold.
    pub filler_high_penalty: f32,
    /// Fillers per minute where the mild band starts.
    pub filler_mild_threshold: f32,
    /// Fillers per minute where the high band starts.
    pub filler_high_threshold: f32,
    pub critical_threshold: f32,
    /// EMA coefficient folding the raw accumulator into the displayed
    /// value each tick.
    pub smoothing_alpha: f32,
}

impl Default for BatteryConfig {
    fn default() -> Self {
        Self {
            drain_rate_per_sec: 4.0,
            grace_period_secs: 1.5,
            recharge_rate_per_sec: 6.0,
            filler_mild_penalty: 1.0,
            filler_high_penalty: 2.0,
            filler_mild_threshold: 6.0,
            filler_high_threshold: 10.0,
            critical_threshold: 25.0,
            smoothing_alpha: 0.3,
        }
    }
}

/// Idle holds, Draining and Recharging move the score. One slot, so the
/// two active modes are mutually exclusive by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatteryMode {
    Idle,
    Draining,
    Recharging,
}

/// Serialized view of the battery internals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatteryState {
    pub value: f32,
    pub raw_value: f32,
    pub mode: BatteryMode,
}

/// Engagement battery: drains through silence, recharges through speech,
/// takes tiered penalties for filler-dense speech.
///
/// `raw` is the accumulator every rate writes into; `value` is its
/// EMA-smoothed projection and the number every threshold check reads.
/// Both clamp to [0, 100] after every mutation.
#[derive(Debug)]
pub struct SocialBattery {
    config: BatteryConfig,
    raw: f32,
    value: f32,
    mode: BatteryMode,
    /// Set when draining starts; the grace period measures from here.
    silence_started: Option<Instant>,
    last_update: Option<Instant>,
    was_critical: bool,
}

impl SocialBattery {
    pub fn new(config: BatteryConfig) -> Self {
        Self {
            config,
            raw: BATTERY_MAX,
            value: BATTERY_MAX,
            mode: BatteryMode::Idle,
            silence_started: None,
            last_update: None,
            was_critical: false,
        }
    }

    /// Swap tuning mid-session. Score and mode carry over untouched.
    pub fn set_config(&mut self, config: BatteryConfig) {
        self.config = config;
    }

    pub fn config(&self) -> &BatteryConfig {
        &self.config
    }

    /// Enter the draining mode. No-op while already draining, so callers
    /// can re-assert the mode every tick; from recharging this cancels
    /// the recharge first.
    pub fn start_draining(&mut self, now: Instant) {
        if self.mode == BatteryMode::Draining {
            return;
        }
        self.mode = BatteryMode::Draining;
        self.silence_started = Some(now);
        debug!("battery draining, grace window open");
    }

    /// Cancel draining. Does not itself start recharging; from the
    /// recharging mode this is a no-op.
    pub fn stop_draining(&mut self) {
        if self.mode == BatteryMode::Draining {
            self.mode = BatteryMode::Idle;
            self.silence_started = None;
        }
    }

    /// Speech signal from the caller. Cancels draining, clears the grace
    /// tracking, and keeps the battery recharging for as long as the
    /// caller keeps signaling.
    pub fn record_speech(&mut self) {
        self.silence_started = None;
        if self.mode != BatteryMode::Recharging {
            self.mode = BatteryMode::Recharging;
            debug!("battery recharging");
        }
    }

    /// Tiered penalty for filler-dense speech. Applies in any mode;
    /// below the mild threshold it is a no-op.
    pub fn apply_filler_penalty(&mut self, rate_per_min: f32, dt: Duration) {
        let penalty = if rate_per_min >= self.config.filler_high_threshold {
            self.config.filler_high_penalty
        } else if rate_per_min >= self.config.filler_mild_threshold {
            self.config.filler_mild_penalty
        } else {
            return;
        };
        self.raw = clamp(self.raw - penalty * dt.as_secs_f32());
    }

    /// Advance the simulation to `now`: integrate drain or recharge over
    /// the elapsed time, then fold the raw accumulator into the smoothed
    /// value. Returns the smoothed value once per downward critical
    /// crossing.
    pub fn tick(&mut self, now: Instant) -> Option<f32> {
        let dt = match self.last_update {
            Some(prev) => now.duration_since(prev),
            None => Duration::ZERO,
        };
        self.last_update = Some(now);

        match self.mode {
            BatteryMode::Draining => {
                // Drain integrates only over time past the grace window,
                // so a tick straddling the expiry never charges for the
                // quiet part.
                if let Some(started) = self.silence_started {
                    let grace_end = started + self.grace_period();
                    if now > grace_end {
                        let drainable = now.duration_since(grace_end).min(dt);
                        self.raw = clamp(
                            self.raw - self.config.drain_rate_per_sec * drainable.as_secs_f32(),
                        );
                    }
                }
            }
            BatteryMode::Recharging => {
                self.raw = clamp(self.raw + self.config.recharge_rate_per_sec * dt.as_secs_f32());
            }
            BatteryMode::Idle => {}
        }

        let alpha = self.config.smoothing_alpha.clamp(0.0, 1.0);
        self.value = clamp(self.value + alpha * (self.raw - self.value));

        if self.value < self.config.critical_threshold {
            if !self.was_critical {
                self.was_critical = true;
                info!(value = self.value, "battery critical");
                return Some(self.value);
            }
        } else {
            self.was_critical = false;
        }
        None
    }

    /// Smoothed score, the one every external check reads.
    pub fn value(&self) -> f32 {
        self.value
    }

    /// Pre-smoothing accumulator.
    pub fn raw_value(&self) -> f32 {
        self.raw
    }

    pub fn mode(&self) -> BatteryMode {
        self.mode
    }

    pub fn is_critical(&self) -> bool {
        self.value < self.config.critical_threshold
    }

    /// True while draining but still inside the grace window: silence
    /// has been detected, no point has been lost yet.
    pub fn in_grace_period(&self, now: Instant) -> bool {
        match (self.mode, self.silence_started) {
            (BatteryMode::Draining, Some(started)) => {
                now.duration_since(started) < self.grace_period()
            }
            _ => false,
        }
    }

    pub fn state(&self) -> BatteryState {
        BatteryState {
            value: self.value,
            raw_value: self.raw,
            mode: self.mode,
        }
    }

    /// Rebase the clock after a pause. The gap since the last tick is
    /// not integrated, and any mode held across the pause is dropped so
    /// silence detection re-arms from scratch.
    pub fn resume(&mut self, now: Instant) {
        self.last_update = Some(now);
        self.mode = BatteryMode::Idle;
        self.silence_started = None;
        debug!("battery clock rebased");
    }

    /// Back to a full, idle battery with no smoothing history.
    pub fn reset(&mut self) {
        self.raw = BATTERY_MAX;
        self.value = BATTERY_MAX;
        self.mode = BatteryMode::Idle;
        self.silence_started = None;
        self.last_update = None;
        self.was_critical = false;
    }

    fn grace_period(&self) -> Duration {
        Duration::from_secs_f32(self.config.grace_period_secs.max(0.0))
    }
}

fn clamp(v: f32) -> f32 {
    v.clamp(BATTERY_MIN, BATTERY_MAX)
}
