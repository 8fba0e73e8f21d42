//! Session state flags.
//!
//! The per-utterance state machine is a set of independently settable
//! booleans guarded entirely by the session lock, an explicit struct
//! rather than a raw bitset, so every site that flips a flag names it.

/// Per-utterance state flags. `Default` is the all-clear (paused) state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionFlags {
    /// Accepting audio; cleared once a final outcome is delivered.
    pub ready: bool,
    /// The no-input clock is armed.
    pub input_timers: bool,
    /// Speech detected this utterance.
    pub start_of_speech: bool,
    /// The start-of-speech notification was handed to the host.
    pub returned_start_of_speech: bool,
    /// The no-input timeout fired; a no-input outcome is pending.
    pub no_input_timeout: bool,
    /// A transcription result is pending delivery.
    pub result: bool,
    /// The final outcome for this utterance was consumed by the host.
    /// Monotone within an utterance; only a reset clears it.
    pub returned_result: bool,
    /// The speech timeout fired; the next feed call must force the
    /// end-of-speech handshake to resolve it into a result.
    pub speech_timeout_pending: bool,
}

impl SessionFlags {
    /// Flag state immediately after open or reset.
    pub fn initial(start_input_timers: bool) -> Self {
        Self {
            ready: true,
            input_timers: start_input_timers,
            ..Self::default()
        }
    }

    /// Drop every flag (pause).
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
