use std::time::Duration;

use anyhow::{anyhow, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::kernel::event::SuggestionRequest;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Transcripts shorter than this skip the coherence call entirely.
const MIN_COHERENCE_CHARS: usize = 10;

/// HTTP client for the suggestion generator and coherence scorer.
#[derive(Clone)]
pub struct SuggestClient {
    client: Client,
    base_url: String,
}

#[derive(Deserialize)]
struct SuggestionResponse {
    suggestion: String,
}

#[derive(Serialize)]
struct CoherenceRequest<'a> {
    transcript: &'a str,
}

#[derive(Deserialize)]
struct CoherenceResponse {
    score: f32,
    #[serde(default)]
    issue: Option<String>,
}

impl SuggestClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            base_url: base_url.into(),
        }
    }

    /// One-shot suggestion generation. The session's busy guard brackets
    /// this call; the caller reports back whatever happens.
    pub async fn generate_suggestion(&self, request: &SuggestionRequest) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/suggest", self.base_url))
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("suggestion service error: {}", response.status()));
        }

        let body: SuggestionResponse = response.json().await?;
        Ok(body.suggestion.trim().to_string())
    }

    /// Score recent speech for coherence, clamped to [0, 1]. Transcripts
    /// too short to judge report fully coherent without a network call.
    pub async fn score_coherence(&self, transcript: &str) -> Result<f32> {
        if transcript.trim().len() < MIN_COHERENCE_CHARS {
            return Ok(1.0);
        }

        let response = self
            .client
            .post(format!("{}/coherence", self.base_url))
            .json(&CoherenceRequest { transcript })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("coherence service error: {}", response.status()));
        }

        let body: CoherenceResponse = response.json().await?;
        if let Some(issue) = &body.issue {
            debug!(issue = %issue, "coherence issue reported");
        }
        Ok(body.score.clamp(0.0, 1.0))
    }
}
