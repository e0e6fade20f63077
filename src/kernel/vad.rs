use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Hysteresis thresholds and debounce for the energy detector.
///
/// `speech_threshold` must sit above `silence_threshold`; levels between
/// the two hold the previous state, so the speaking flag cannot flicker
/// around a single boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VadConfig {
    /// RMS level above which a sample counts as speech.
    pub speech_threshold: f32,
    /// RMS level below which a sample counts as silence.
    pub silence_threshold: f32,
    /// Continuous quiet required before the speaking flag drops.
    pub silence_delay_ms: u64,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            speech_threshold: 0.02,
            silence_threshold: 0.01,
            silence_delay_ms: 500,
        }
    }
}

/// Read surface for the rest of the kernel. Consumers take a snapshot
/// once per tick instead of reaching into live detector fields.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechActivity {
    pub is_speaking: bool,
    pub audio_level: f32,
    pub silence_secs: f32,
}

/// Emitted when a sample flips the speaking flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadTransition {
    SpeechStarted,
    SpeechEnded,
}

/// Energy-based voice activity detector with asymmetric hysteresis.
///
/// Levels arrive pre-computed (RMS over one meter frame); this struct
/// only runs the state machine. Silence duration accrues from the last
/// speech-level sample onward, so it is already positive while the
/// debounce window still holds `is_speaking` up.
#[derive(Debug)]
pub struct VoiceActivityDetector {
    config: VadConfig,
    listening: bool,
    is_speaking: bool,
    audio_level: f32,
    last_speech_at: Option<Instant>,
    silence_started: Option<Instant>,
    silence_secs: f32,
}

impl VoiceActivityDetector {
    pub fn new(config: VadConfig) -> Self {
        Self {
            config,
            listening: false,
            is_speaking: false,
            audio_level: 0.0,
            last_speech_at: None,
            silence_started: None,
            silence_secs: 0.0,
        }
    }

    /// Arm the detector. The silence clock starts at `now`, so a session
    /// where nobody ever speaks still accrues silence from the first
    /// sample.
    pub fn begin(&mut self, now: Instant) {
        self.listening = true;
        self.is_speaking = false;
        self.audio_level = 0.0;
        self.last_speech_at = Some(now);
        self.silence_started = Some(now);
        self.silence_secs = 0.0;
    }

    /// Disarm and return every field to neutral.
    pub fn reset(&mut self) {
        self.listening = false;
        self.is_speaking = false;
        self.audio_level = 0.0;
        self.last_speech_at = None;
        self.silence_started = None;
        self.silence_secs = 0.0;
    }

    pub fn is_listening(&self) -> bool {
        self.listening
    }

    /// Feed one meter level. Returns a transition when the speaking flag
    /// flips. Disarmed detectors ignore samples entirely.
    ///
    /// Above the speech threshold: speaking, silence clock reset. Below
    /// the silence threshold: silence accrues continuously, and the flag
    /// only drops once `silence_delay_ms` passes without a speech-level
    /// sample. Inside the band: level recorded, everything else held.
    pub fn sample(&mut self, level: f32, now: Instant) -> Option<VadTransition> {
        if !self.listening {
            return None;
        }
        self.audio_level = level;

        if level > self.config.speech_threshold {
            self.last_speech_at = Some(now);
            self.silence_started = Some(now);
            self.silence_secs = 0.0;
            if !self.is_speaking {
                self.is_speaking = true;
                debug!(level, "speech started");
                return Some(VadTransition::SpeechStarted);
            }
            return None;
        }

        if level < self.config.silence_threshold {
            if let Some(started) = self.silence_started {
                self.silence_secs = now.duration_since(started).as_secs_f32();
            }
            if self.is_speaking {
                if let Some(last_speech) = self.last_speech_at {
                    if now.duration_since(last_speech) > self.silence_delay() {
                        self.is_speaking = false;
                        debug!(silence_secs = self.silence_secs, "speech ended");
                        return Some(VadTransition::SpeechEnded);
                    }
                }
            }
        }

        None
    }

    pub fn snapshot(&self) -> SpeechActivity {
        SpeechActivity {
            is_speaking: self.is_speaking,
            audio_level: self.audio_level,
            silence_secs: self.silence_secs,
        }
    }

    fn silence_delay(&self) -> Duration {
        Duration::from_millis(self.config.silence_delay_ms)
    }
}
