use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::battery::{BatteryConfig, BatteryMode, SocialBattery};
use super::event::{SessionEvent, SideEffect, SuggestionRequest};
use super::transcript::RollingTranscript;
use super::trigger::{TriggerCheck, TriggerConfig, TriggerEngine, TriggerEvent};
use super::vad::{VadConfig, VoiceActivityDetector};

/// Coherence scores below this are merely weak and earn the mild filler
/// penalty; sub-floor scores (see `SessionConfig::coherence_floor`) earn
/// the high one and arm an incoherence trigger attempt.
const COHERENCE_WEAK: f32 = 0.6;

/// Everything one session is parameterized by.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub vad: VadConfig,
    pub battery: BatteryConfig,
    pub trigger: TriggerConfig,
    /// Passed through to the suggestion payload.
    pub event_type: String,
    pub user_role: String,
    /// Battery integration cadence.
    pub tick_ms: u64,
    /// Trigger polling cadence, a slower multiple of the tick.
    pub trigger_poll_ms: u64,
    /// Coherence scores below this count as incoherent speech.
    pub coherence_floor: f32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            vad: VadConfig::default(),
            battery: BatteryConfig::default(),
            trigger: TriggerConfig::default(),
            event_type: "networking".to_string(),
            user_role: "professional".to_string(),
            tick_ms: 100,
            trigger_poll_ms: 500,
            coherence_floor: 0.35,
        }
    }
}

/// Point-in-time read surface for dashboards and the end-of-session
/// collector. Aggregation happens outside this crate.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub listening: bool,
    pub session_secs: f64,
    pub battery_value: f32,
    pub battery_raw: f32,
    pub battery_mode: BatteryMode,
    pub battery_critical: bool,
    pub user_speaking: bool,
    pub partner_speaking: bool,
    pub silence_secs: f32,
    pub filler_rate_per_min: f32,
    pub filler_count: u32,
    pub filler_breakdown: HashMap<String, u32>,
    pub suggestion_count: u32,
    pub in_cooldown: bool,
    pub cooldown_remaining_secs: f32,
}

/// The fusion loop: one struct owning all four conversation components,
/// advanced by a synchronous [`CoachSession::tick_step`] so drivers and
/// tests control time explicitly. [`CoachSession::run`] wraps it in the
/// production cadence.
pub struct CoachSession {
    config: SessionConfig,
    vad: VoiceActivityDetector,
    battery: SocialBattery,
    transcript: RollingTranscript,
    trigger: TriggerEngine,
    partner_speaking: bool,
    listening: bool,
    /// Timeline origin for the transcript clock. Survives stop() so a
    /// final stats pass still reads a consistent timeline.
    started_at: Option<Instant>,
    last_tick: Option<Instant>,
    next_trigger_poll: Option<Instant>,
    /// A sub-floor coherence score arrived since the last trigger poll.
    pending_incoherence: bool,
}

impl CoachSession {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            vad: VoiceActivityDetector::new(config.vad.clone()),
            battery: SocialBattery::new(config.battery.clone()),
            transcript: RollingTranscript::new(),
            trigger: TriggerEngine::new(config.trigger.clone()),
            config,
            partner_speaking: false,
            listening: false,
            started_at: None,
            last_tick: None,
            next_trigger_poll: None,
            pending_incoherence: false,
        }
    }

    /// Arm the session. Idempotent while already listening; a restart
    /// after `stop` keeps the original timeline origin and rebases the
    /// battery clock so the stopped gap is never integrated.
    pub fn start(&mut self, now: Instant) {
        if self.listening {
            return;
        }
        self.listening = true;
        if self.started_at.is_none() {
            self.started_at = Some(now);
        }
        self.battery.resume(now);
        self.last_tick = Some(now);
        self.next_trigger_poll = Some(now + Duration::from_millis(self.config.trigger_poll_ms));
        self.vad.begin(now);
        info!("session listening");
    }

    /// Stop listening. The detector returns to neutral immediately;
    /// battery, transcript and trigger state stay readable for a final
    /// stats pass. `reset` clears everything.
    pub fn stop(&mut self) {
        if !self.listening {
            return;
        }
        self.listening = false;
        self.vad.reset();
        self.partner_speaking = false;
        self.pending_incoherence = false;
        self.last_tick = None;
        self.next_trigger_poll = None;
        info!("session stopped");
    }

    /// Fresh session: every component back to its initial state.
    pub fn reset(&mut self) {
        self.stop();
        self.started_at = None;
        self.battery.reset();
        self.transcript.clear();
        self.trigger.reset();
        info!("session reset");
    }

    pub fn is_listening(&self) -> bool {
        self.listening
    }

    pub fn battery(&self) -> &SocialBattery {
        &self.battery
    }

    pub fn trigger(&self) -> &TriggerEngine {
        &self.trigger
    }

    /// Swap battery tuning mid-session.
    pub fn set_battery_config(&mut self, config: BatteryConfig) {
        self.battery.set_config(config);
    }

    /// Advance one tick: ingest events, capture the activity snapshot,
    /// drive the battery, and poll the trigger engine on its cadence.
    /// Synchronous and deterministic; the caller owns the clock.
    pub fn tick_step(&mut self, events: Vec<SessionEvent>, now: Instant) -> Vec<SideEffect> {
        let mut effects = Vec::new();

        // Guard release stays valid while stopped; a generation attempt
        // can outlive the session that requested it.
        if !self.listening {
            for event in events {
                if matches!(event, SessionEvent::SuggestionResolved) {
                    self.trigger.finish_generation();
                }
            }
            return effects;
        }

        let dt = match self.last_tick {
            Some(prev) => now.duration_since(prev),
            None => Duration::ZERO,
        };
        self.last_tick = Some(now);
        let clock = self.clock_secs(now);

        // === 1. INGEST ===
        for event in events {
            match event {
                SessionEvent::Level(level) => {
                    if let Some(transition) = self.vad.sample(level, now) {
                        debug!(?transition, level, "vad transition");
                    }
                }
                SessionEvent::Segment(segment) => {
                    self.transcript.add_segment(segment, clock);
                }
                SessionEvent::PartnerSpeaking(active) => {
                    self.partner_speaking = active;
                }
                SessionEvent::Coherence(score) => {
                    // Applied per event: every score in a batch counts.
                    self.apply_coherence(score.clamp(0.0, 1.0));
                }
                SessionEvent::SuggestionResolved => {
                    self.trigger.finish_generation();
                }
            }
        }

        // === 2. SNAPSHOT ===
        // Everything below reads this captured view, never the live VAD.
        let activity = self.vad.snapshot();

        // === 3. BATTERY MODE ===
        if activity.is_speaking {
            self.battery.record_speech();
        } else if !self.partner_speaking {
            self.battery.start_draining(now);
        } else {
            self.battery.stop_draining();
        }

        // === 4. PENALTIES ===
        let filler_rate = self.transcript.user_filler_rate(clock);
        if filler_rate > 0.0 {
            self.battery.apply_filler_penalty(filler_rate, dt);
        }

        // === 5. INTEGRATE ===
        if let Some(value) = self.battery.tick(now) {
            effects.push(SideEffect::BatteryCritical(value));
        }

        // === 6. TRIGGER POLL ===
        if self.trigger_poll_due(now) {
            let check = TriggerCheck {
                battery_value: self.battery.value(),
                silence_secs: activity.silence_secs,
                user_speaking: activity.is_speaking,
                partner_speaking: self.partner_speaking,
                in_grace_period: self.battery.in_grace_period(now),
            };
            let fired = match self.trigger.should_trigger(&check, now) {
                Some(event) => Some(event),
                None if self.pending_incoherence => {
                    self.trigger.should_trigger_incoherent(&check, now)
                }
                None => None,
            };
            self.pending_incoherence = false;
            if let Some(event) = fired {
                self.trigger.begin_generation();
                effects.push(SideEffect::RequestSuggestion(self.build_request(event, clock)));
            }
        }

        effects
    }

    /// Owned async driver: a fixed cadence around `tick_step`, draining
    /// the inbox each tick and forwarding side effects. No component
    /// holds a timer of its own, so cancelling the token stops the whole
    /// session at once.
    pub async fn run(
        &mut self,
        mut events: mpsc::Receiver<SessionEvent>,
        effects: mpsc::Sender<SideEffect>,
        cancel: CancellationToken,
    ) {
        self.start(Instant::now());
        let mut cadence = interval(Duration::from_millis(self.config.tick_ms));
        cadence.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(tick_ms = self.config.tick_ms, "session loop started");

        let mut ticks: u64 = 0;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = cadence.tick() => {}
            }

            let mut batch = Vec::new();
            while let Ok(event) = events.try_recv() {
                batch.push(event);
            }

            let now = Instant::now();
            for effect in self.tick_step(batch, now) {
                if effects.send(effect).await.is_err() {
                    warn!("effect consumer dropped, stopping session loop");
                    cancel.cancel();
                    break;
                }
            }

            ticks += 1;
            if ticks % 100 == 0 {
                let snap = self.stats(now);
                debug!(
                    battery = snap.battery_value,
                    silence = snap.silence_secs,
                    filler_rate = snap.filler_rate_per_min,
                    "session heartbeat"
                );
            }
        }

        self.stop();
        info!("session loop stopped");
    }

    /// Snapshot every dashboard-facing number. Pure read apart from the
    /// lazy window prune.
    pub fn stats(&mut self, now: Instant) -> SessionStats {
        let clock = self.clock_secs(now);
        let activity = self.vad.snapshot();
        let status = self.trigger.status(now);
        SessionStats {
            listening: self.listening,
            session_secs: clock,
            battery_value: self.battery.value(),
            battery_raw: self.battery.raw_value(),
            battery_mode: self.battery.mode(),
            battery_critical: self.battery.is_critical(),
            user_speaking: activity.is_speaking,
            partner_speaking: self.partner_speaking,
            silence_secs: activity.silence_secs,
            filler_rate_per_min: self.transcript.user_filler_rate(clock),
            filler_count: self.transcript.user_filler_count(clock),
            filler_breakdown: self.transcript.filler_breakdown(clock),
            suggestion_count: status.suggestion_count,
            in_cooldown: status.in_cooldown,
            cooldown_remaining_secs: status.cooldown_remaining_secs,
        }
    }

    /// Map an external coherence score onto the battery: sub-floor
    /// scores count like high filler density, merely weak ones like
    /// mild. A sub-floor score also arms one incoherence trigger attempt
    /// for the next poll.
    fn apply_coherence(&mut self, score: f32) {
        let tick = Duration::from_millis(self.config.tick_ms);
        let mild = self.battery.config().filler_mild_threshold;
        let high = self.battery.config().filler_high_threshold;
        if score < self.config.coherence_floor {
            self.battery.apply_filler_penalty(high, tick);
            self.pending_incoherence = true;
            info!(score, "incoherent speech reported");
        } else if score < COHERENCE_WEAK {
            self.battery.apply_filler_penalty(mild, tick);
        }
    }

    fn build_request(&mut self, event: TriggerEvent, clock: f64) -> SuggestionRequest {
        let last_partner = self
            .transcript
            .last_partner_utterance(clock)
            .map(|s| s.text.clone())
            .unwrap_or_default();
        SuggestionRequest {
            recent_transcript: self.transcript.transcript_text(clock),
            last_partner_utterance: last_partner,
            event_type: self.config.event_type.clone(),
            user_role: self.config.user_role.clone(),
            trigger_reason: event.reason,
        }
    }

    fn trigger_poll_due(&mut self, now: Instant) -> bool {
        match self.next_trigger_poll {
            Some(due) if now >= due => {
                self.next_trigger_poll =
                    Some(now + Duration::from_millis(self.config.trigger_poll_ms));
                true
            }
            _ => false,
        }
    }

    fn clock_secs(&self, now: Instant) -> f64 {
        match self.started_at {
            Some(origin) => now.duration_since(origin).as_secs_f64(),
            None => 0.0,
        }
    }
}
