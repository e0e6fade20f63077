use serde::{Deserialize, Serialize};

use super::transcript::TranscriptSegment;
use super::trigger::TriggerReason;

/// Everything that can enter the session loop from outside.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Normalized RMS level from the audio meter, [0, 1].
    Level(f32),
    /// A finalized utterance from the speech-to-text boundary.
    Segment(TranscriptSegment),
    /// Far-end speaking state from the room boundary.
    PartnerSpeaking(bool),
    /// Score from the external coherence scorer, [0, 1].
    Coherence(f32),
    /// The driver finished a suggestion generation attempt, success or
    /// not. Releases the engine's busy guard.
    SuggestionResolved,
}

/// Everything the session loop asks its driver to do.
#[derive(Debug, Clone, PartialEq)]
pub enum SideEffect {
    /// Hand off to the external suggestion generator. The engine stays
    /// busy until the driver answers with
    /// [`SessionEvent::SuggestionResolved`].
    RequestSuggestion(SuggestionRequest),
    /// The smoothed battery value crossed the critical threshold on the
    /// way down. Emitted once per crossing.
    BatteryCritical(f32),
}

/// Payload for the external suggestion generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionRequest {
    pub recent_transcript: String,
    pub last_partner_utterance: String,
    pub event_type: String,
    pub user_role: String,
    pub trigger_reason: TriggerReason,
}
