use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Utterances shorter than this never count as a real contribution.
pub const MIN_SPEECH_DURATION_SECS: f64 = 0.35;
/// Recognizer confidence floor for a segment to count.
pub const MIN_CONFIDENCE: f32 = 0.6;

/// Single-token filler vocabulary, matched after normalization.
pub const FILLER_WORDS: &[&str] = &[
    "um", "uh", "uhh", "umm", "ah", "ahh", "er", "err", "like", "basically", "actually",
    "literally", "so", "right", "yeah", "okay",
];

/// Two-word filler phrases, checked against consecutive word pairs
/// before the single-token pass so "you know" counts once, not twice.
pub const FILLER_PHRASES: &[(&str, &str)] = &[("you", "know"), ("i", "mean")];

/// Which side of the conversation a segment belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Partner,
}

/// One recognized word with recognizer timing. Immutable once its
/// segment is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptWord {
    pub text: String,
    pub start_sec: f64,
    pub end_sec: f64,
    pub confidence: f32,
    pub is_filler: bool,
}

/// One recognized utterance on the recognizer timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptSegment {
    pub id: String,
    pub speaker: Speaker,
    pub text: String,
    pub words: Vec<TranscriptWord>,
    pub start_sec: f64,
    pub end_sec: f64,
    pub confidence: f32,
    /// Meets the duration and confidence gates. Invalid segments still
    /// appear in the transcript text but never in filler statistics.
    pub is_valid: bool,
    pub filler_count: u32,
    /// Canonical lexicon tokens matched in this segment; a phrase match
    /// contributes one entry ("you know").
    pub filler_tokens: Vec<String>,
}

impl TranscriptSegment {
    /// Build a near-end segment: classifies fillers in the word list and
    /// applies the validity gates.
    pub fn user(
        text: impl Into<String>,
        mut words: Vec<TranscriptWord>,
        start_sec: f64,
        end_sec: f64,
        confidence: f32,
    ) -> Self {
        let (filler_count, filler_tokens) = classify_fillers(&mut words);
        Self {
            id: Uuid::new_v4().to_string(),
            speaker: Speaker::User,
            text: text.into(),
            words,
            start_sec,
            end_sec,
            confidence,
            is_valid: (end_sec - start_sec) >= MIN_SPEECH_DURATION_SECS
                && confidence >= MIN_CONFIDENCE,
            filler_count,
            filler_tokens,
        }
    }

    /// Build a far-end segment. Partner speech is never filler-scored.
    pub fn partner(text: impl Into<String>, start_sec: f64, end_sec: f64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            speaker: Speaker::Partner,
            text: text.into(),
            words: Vec::new(),
            start_sec,
            end_sec,
            confidence: 1.0,
            is_valid: true,
            filler_count: 0,
            filler_tokens: Vec::new(),
        }
    }

    pub fn duration_secs(&self) -> f64 {
        (self.end_sec - self.start_sec).max(0.0)
    }
}

/// Flag filler words in place and return `(count, canonical tokens)`.
///
/// A phrase match flags only its first word, keeping the count equal to
/// the number of flagged words; the returned token keeps the full phrase
/// for breakdown reporting.
pub fn classify_fillers(words: &mut [TranscriptWord]) -> (u32, Vec<String>) {
    let normalized: Vec<String> = words.iter().map(|w| normalize(&w.text)).collect();
    let mut tokens = Vec::new();
    let mut count = 0u32;

    let mut i = 0;
    while i < normalized.len() {
        if i + 1 < normalized.len() {
            let pair = (normalized[i].as_str(), normalized[i + 1].as_str());
            if let Some((a, b)) = FILLER_PHRASES.iter().find(|(a, b)| (*a, *b) == pair) {
                words[i].is_filler = true;
                tokens.push(format!("{} {}", a, b));
                count += 1;
                i += 2;
                continue;
            }
        }
        if FILLER_WORDS.contains(&normalized[i].as_str()) {
            words[i].is_filler = true;
            tokens.push(normalized[i].clone());
            count += 1;
        }
        i += 1;
    }

    (count, tokens)
}

/// Evenly spaced word timings for text that arrives without recognizer
/// word data (harnesses, tests).
pub fn words_from_text(text: &str, start_sec: f64, end_sec: f64, confidence: f32) -> Vec<TranscriptWord> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    if tokens.is_empty() {
        return Vec::new();
    }
    let step = (end_sec - start_sec).max(0.0) / tokens.len() as f64;
    tokens
        .iter()
        .enumerate()
        .map(|(i, tok)| TranscriptWord {
            text: (*tok).to_string(),
            start_sec: start_sec + step * i as f64,
            end_sec: start_sec + step * (i + 1) as f64,
            confidence,
            is_filler: false,
        })
        .collect()
}

fn normalize(token: &str) -> String {
    token
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '\'')
        .collect()
}
