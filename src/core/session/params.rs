//! Session tuning parameters.

/// Confidence reported with backend transcripts. The backend's response
/// frames carry bare transcript text with no score; the host can override
/// via the `confidence` parameter.
pub const DEFAULT_CONFIDENCE: f64 = 87.3;

/// Partial deliveries granted when the `partial` parameter is enabled.
pub const PARTIAL_RESULT_REPEATS: u32 = 3;

/// Per-session configuration, set at open and adjustable through
/// [`crate::core::session::RecognitionSession::set_param`] before or while
/// the session runs.
#[derive(Debug, Clone)]
pub struct SessionParams {
    /// Negotiated sample rate.
    pub sample_rate: u32,
    /// Maximum wait for first speech, in ms. Negative disables.
    pub no_input_timeout_ms: i64,
    /// Maximum utterance length from speech start, in ms. Zero disables.
    pub speech_timeout_ms: i64,
    /// Arm the no-input clock automatically on open/reset.
    pub start_input_timers: bool,
    /// Reset automatically when audio arrives after a delivered final.
    pub auto_resume: bool,
}

impl SessionParams {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            no_input_timeout_ms: 5000,
            speech_timeout_ms: 10000,
            start_input_timers: true,
            auto_resume: false,
        }
    }
}
