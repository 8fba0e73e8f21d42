//! Timeout policy.
//!
//! Pure view over session state and the clock; no I/O and no mutation.
//! Two independent clocks race the state machine: "no input" runs from
//! session reset/arm until speech is first detected, "speech" runs from
//! speech start until the utterance ends. Each fires at most once per
//! utterance.

use std::time::Instant;

use super::flags::SessionFlags;
use super::params::SessionParams;

/// Which clock fired, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerVerdict {
    /// The no-input timeout elapsed before any speech.
    NoInput,
    /// The speech timeout elapsed mid-utterance; the utterance must be
    /// force-ended on the next feed call.
    SpeechTimeout,
}

/// Evaluate both clocks against `now`.
///
/// Returns `None` while an outcome is already pending (`result` or
/// `no_input_timeout` set), when the relevant clock is disabled, or when
/// neither deadline has passed.
pub fn evaluate(
    flags: &SessionFlags,
    params: &SessionParams,
    no_input_since: Instant,
    speech_since: Option<Instant>,
    now: Instant,
) -> Option<TimerVerdict> {
    if flags.result || flags.no_input_timeout {
        return None;
    }

    if flags.input_timers
        && !flags.start_of_speech
        && params.no_input_timeout_ms >= 0
        && elapsed_ms(no_input_since, now) >= params.no_input_timeout_ms
    {
        return Some(TimerVerdict::NoInput);
    }

    if !flags.speech_timeout_pending && flags.start_of_speech && params.speech_timeout_ms > 0 {
        if let Some(since) = speech_since {
            if elapsed_ms(since, now) >= params.speech_timeout_ms {
                return Some(TimerVerdict::SpeechTimeout);
            }
        }
    }

    None
}

fn elapsed_ms(since: Instant, now: Instant) -> i64 {
    now.saturating_duration_since(since).as_millis() as i64
}
