use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::info;

/// Rate-limit and decision constants, fixed per engine instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerConfig {
    pub cooldown_secs: f32,
    /// Battery value below which silence escalates quickly.
    pub low_battery_threshold: f32,
    /// Silence needed together with a low battery.
    pub short_silence_secs: f32,
    /// Silence that fires on its own.
    pub long_silence_secs: f32,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: 30.0,
            low_battery_threshold: 50.0,
            short_silence_secs: 2.0,
            long_silence_secs: 5.0,
        }
    }
}

/// Why a suggestion was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerReason {
    LowBattery,
    LongSilence,
    Incoherent,
}

/// Caller-built snapshot of everything the decision reads. Built once
/// per poll from state captured in the same tick, never from live
/// component fields, so the decision cannot see a half-updated view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriggerCheck {
    pub battery_value: f32,
    pub silence_secs: f32,
    pub user_speaking: bool,
    pub partner_speaking: bool,
    pub in_grace_period: bool,
}

/// One fired decision, handed to the caller and discarded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriggerEvent {
    pub reason: TriggerReason,
    pub at: Instant,
    pub battery_value: f32,
    pub silence_secs: f32,
}

/// Cooldown and guard state for display surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerStatus {
    pub in_cooldown: bool,
    pub cooldown_remaining_secs: f32,
    pub suggestion_count: u32,
    pub generating: bool,
}

/// Rate-limited decision engine for coach interventions.
///
/// The generation busy guard is first-class state here: while a
/// suggestion request is outstanding nothing fires, regardless of the
/// cooldown, so at most one request is ever in flight.
#[derive(Debug)]
pub struct TriggerEngine {
    config: TriggerConfig,
    cooldown_until: Option<Instant>,
    suggestion_count: u32,
    generating: bool,
}

impl TriggerEngine {
    pub fn new(config: TriggerConfig) -> Self {
        Self {
            config,
            cooldown_until: None,
            suggestion_count: 0,
            generating: false,
        }
    }

    pub fn config(&self) -> &TriggerConfig {
        &self.config
    }

    /// Poll entry point. Low battery outranks long silence when both
    /// hold; anything else stays quiet.
    pub fn should_trigger(&mut self, check: &TriggerCheck, now: Instant) -> Option<TriggerEvent> {
        if !self.guards_pass(check, now) {
            return None;
        }
        let reason = if check.battery_value < self.config.low_battery_threshold
            && check.silence_secs > self.config.short_silence_secs
        {
            TriggerReason::LowBattery
        } else if check.silence_secs > self.config.long_silence_secs {
            TriggerReason::LongSilence
        } else {
            return None;
        };
        Some(self.fire(reason, check, now))
    }

    /// Out-of-band entry point for the coherence path: same guards and
    /// the same cooldown, reason `incoherent`.
    pub fn should_trigger_incoherent(
        &mut self,
        check: &TriggerCheck,
        now: Instant,
    ) -> Option<TriggerEvent> {
        if !self.guards_pass(check, now) {
            return None;
        }
        Some(self.fire(TriggerReason::Incoherent, check, now))
    }

    /// Mark the generation guard. While set, nothing fires.
    pub fn begin_generation(&mut self) {
        self.generating = true;
    }

    /// Clear the generation guard. The cooldown from the originating
    /// fire stays in place, so a failed generation still spends it.
    pub fn finish_generation(&mut self) {
        self.generating = false;
    }

    pub fn is_generating(&self) -> bool {
        self.generating
    }

    pub fn in_cooldown(&self, now: Instant) -> bool {
        match self.cooldown_until {
            Some(until) => now < until,
            None => false,
        }
    }

    pub fn cooldown_remaining_secs(&self, now: Instant) -> f32 {
        match self.cooldown_until {
            Some(until) => until.saturating_duration_since(now).as_secs_f32(),
            None => 0.0,
        }
    }

    pub fn suggestion_count(&self) -> u32 {
        self.suggestion_count
    }

    pub fn status(&self, now: Instant) -> TriggerStatus {
        TriggerStatus {
            in_cooldown: self.in_cooldown(now),
            cooldown_remaining_secs: self.cooldown_remaining_secs(now),
            suggestion_count: self.suggestion_count,
            generating: self.generating,
        }
    }

    /// Clear cooldown, counter and guard for a fresh session.
    pub fn reset(&mut self) {
        self.cooldown_until = None;
        self.suggestion_count = 0;
        self.generating = false;
    }

    /// Guard clauses shared by every reason. All must pass.
    fn guards_pass(&self, check: &TriggerCheck, now: Instant) -> bool {
        if self.generating || self.in_cooldown(now) {
            return false;
        }
        if check.user_speaking || check.partner_speaking {
            return false;
        }
        if check.in_grace_period {
            return false;
        }
        true
    }

    fn fire(&mut self, reason: TriggerReason, check: &TriggerCheck, now: Instant) -> TriggerEvent {
        // Fires only happen at now >= the previous deadline, so each new
        // deadline strictly advances.
        self.cooldown_until = Some(now + Duration::from_secs_f32(self.config.cooldown_secs.max(0.0)));
        self.suggestion_count += 1;
        info!(
            ?reason,
            battery = check.battery_value,
            silence = check.silence_secs,
            "trigger fired"
        );
        TriggerEvent {
            reason,
            at: now,
            battery_value: check.battery_value,
            silence_secs: check.silence_secs,
        }
    }
}
