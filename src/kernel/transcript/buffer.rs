use std::collections::{HashMap, VecDeque};

use tracing::debug;

use super::segment::{Speaker, TranscriptSegment};

/// Seconds of transcript kept for rate math and suggestion context.
pub const WINDOW_SECS: f64 = 60.0;

/// Rolling transcript window on the recognizer timeline.
///
/// Readers take `&mut self` plus the caller's current timeline position:
/// every read and every write prunes segments whose end has fallen out
/// of the window, so stale speech can never leak into a rate even when
/// writes stop arriving.
#[derive(Debug, Default)]
pub struct RollingTranscript {
    segments: VecDeque<TranscriptSegment>,
}

impl RollingTranscript {
    pub fn new() -> Self {
        Self {
            segments: VecDeque::new(),
        }
    }

    /// Append a finalized segment and evict expired ones.
    pub fn add_segment(&mut self, segment: TranscriptSegment, now_sec: f64) {
        debug!(
            speaker = ?segment.speaker,
            fillers = segment.filler_count,
            valid = segment.is_valid,
            "segment added"
        );
        self.segments.push_back(segment);
        self.prune(now_sec);
    }

    /// Chronological join of every in-window segment text, valid or not.
    pub fn transcript_text(&mut self, now_sec: f64) -> String {
        self.prune(now_sec);
        self.segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Fillers per minute across valid near-end speech in the window.
    /// The denominator is the window length, so the rate steps down as
    /// old segments expire instead of averaging over the whole session.
    pub fn user_filler_rate(&mut self, now_sec: f64) -> f32 {
        let count = self.user_filler_count(now_sec);
        (count as f64 * 60.0 / WINDOW_SECS) as f32
    }

    pub fn user_filler_count(&mut self, now_sec: f64) -> u32 {
        self.prune(now_sec);
        self.segments
            .iter()
            .filter(|s| s.speaker == Speaker::User && s.is_valid)
            .map(|s| s.filler_count)
            .sum()
    }

    /// Canonical filler token -> occurrence count over valid near-end
    /// speech in the window.
    pub fn filler_breakdown(&mut self, now_sec: f64) -> HashMap<String, u32> {
        self.prune(now_sec);
        let mut breakdown = HashMap::new();
        for segment in self
            .segments
            .iter()
            .filter(|s| s.speaker == Speaker::User && s.is_valid)
        {
            for token in &segment.filler_tokens {
                *breakdown.entry(token.clone()).or_insert(0) += 1;
            }
        }
        breakdown
    }

    /// Most recent far-end utterance still inside the window.
    pub fn last_partner_utterance(&mut self, now_sec: f64) -> Option<&TranscriptSegment> {
        self.prune(now_sec);
        self.segments
            .iter()
            .rev()
            .find(|s| s.speaker == Speaker::Partner)
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn clear(&mut self) {
        self.segments.clear();
    }

    fn prune(&mut self, now_sec: f64) {
        let cutoff = now_sec - WINDOW_SECS;
        // A segment straddling the cutoff stays until its end expires.
        self.segments.retain(|s| s.end_sec >= cutoff);
    }
}
