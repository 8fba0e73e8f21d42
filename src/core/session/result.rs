//! Result payloads delivered to the host.

use serde::Serialize;
use serde_json::json;

/// One recognition outcome.
///
/// `grammar`, `text` and `confidence` are always present in the rendered
/// form; `error` is set only for the no-input timeout outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultPayload {
    /// Echoed grammar label (opaque passthrough).
    pub grammar: String,
    /// Transcript text, empty for timeout outcomes.
    pub text: String,
    /// Confidence score, 0.0–100.0.
    pub confidence: f64,
    /// Distinguishing marker for timeout outcomes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResultPayload {
    /// A transcript outcome.
    pub fn transcript(grammar: String, text: String, confidence: f64) -> Self {
        Self {
            grammar,
            text,
            confidence,
            error: None,
        }
    }

    /// The no-input timeout outcome: empty text, zero confidence.
    pub fn no_input(grammar: String) -> Self {
        Self {
            grammar,
            text: String::new(),
            confidence: 0.0,
            error: Some("no_input".to_string()),
        }
    }

    /// Render for delivery: a JSON object when `return_json` is set, the
    /// bare transcript text otherwise.
    pub fn render(&self, return_json: bool) -> String {
        if !return_json {
            return self.text.clone();
        }
        let mut value = json!({
            "grammar": self.grammar,
            "text": self.text,
            "confidence": self.confidence,
        });
        if let Some(error) = &self.error {
            value["error"] = json!(error);
        }
        value.to_string()
    }
}

/// Host-facing answer from `check_results`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultPoll {
    /// An outcome is pending; fetch it now.
    Ready,
    /// Nothing pending.
    NotReady,
    /// The speech timeout just fired; feed one more frame so the pending
    /// timeout can resolve into a final result, then poll again.
    Recheck,
}

/// Host-facing answer from `fetch_result`.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// A non-final transcript; more deliveries will follow.
    Partial(ResultPayload),
    /// The authoritative final outcome for this utterance.
    Final(ResultPayload),
    /// Interim start-of-speech notification, no payload yet; poll again.
    StartOfSpeech,
}
