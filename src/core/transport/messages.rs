//! Control messages exchanged with the transcription backend.
//!
//! The wire contract is small:
//! - at connect time the session presents `{"url": <destination>}` as the
//!   connection's negotiation payload (transport-level, not a data frame);
//! - an utterance ends with a `{"eof": "true"}` text frame, after which the
//!   backend answers with one frame whose payload is the transcript.
//!
//! Speech audio itself travels as raw binary frames and never goes through
//! this module.

use serde::{Deserialize, Serialize};
use serde_json::json;

/// Connection negotiation payload: the destination the session wants to
/// stream to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectRequest {
    /// Backend endpoint (`ws://` or `wss://`).
    pub url: String,
}

impl ConnectRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    /// Render as the JSON negotiation object.
    pub fn to_json(&self) -> String {
        json!({ "url": self.url }).to_string()
    }
}

/// End-of-speech marker closing out one utterance.
///
/// The backend contract carries the flag as the *string* `"true"`, not a
/// JSON boolean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EndOfSpeech;

impl EndOfSpeech {
    pub fn to_json(&self) -> String {
        json!({ "eof": "true" }).to_string()
    }
}
