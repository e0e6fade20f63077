//! Rolling conversation transcript: word-level filler classification
//! plus the 60 second analysis window behind filler statistics and
//! suggestion context.

pub mod buffer;
pub mod segment;

pub use buffer::{RollingTranscript, WINDOW_SECS};
pub use segment::{
    classify_fillers, words_from_text, Speaker, TranscriptSegment, TranscriptWord, FILLER_PHRASES,
    FILLER_WORDS, MIN_CONFIDENCE, MIN_SPEECH_DURATION_SECS,
};
