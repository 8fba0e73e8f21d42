//! Recognition session: the per-call state machine.
//!
//! One [`RecognitionSession`] per call leg. The host's media thread pushes
//! PCM through [`RecognitionSession::feed`] while a control thread polls
//! [`RecognitionSession::check_results`] / [`RecognitionSession::fetch_result`]
//! and adjusts parameters; all mutable state (flags, framer, result fields,
//! transport) sits behind one session lock acquired scoped on every path.
//!
//! The utterance lifecycle: armed → speaking (gate opens, audio streams to
//! the backend in fixed blocks) → end-of-speech handshake (detected silence
//! edge or forced by the speech timeout) → result pending → delivered →
//! reset (explicit resume or auto-resume). Network waits are bounded (a
//! few milliseconds for the per-feed poll, tens of seconds only for the
//! end-of-speech handshake) and `close` cancels any wait in progress.

mod flags;
mod params;
mod policy;
mod result;

#[cfg(test)]
mod tests;

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{parse_bool, SharedConfig};
use crate::core::framer::AudioFramer;
use crate::core::transport::{EndOfSpeech, SpeechTransport, TransportFrame};
use crate::core::vad::{samples_from_pcm, VadConfig, VadEvent, VoiceGate};
use crate::errors::{AsrError, AsrResult};

pub use flags::SessionFlags;
pub use params::{SessionParams, DEFAULT_CONFIDENCE, PARTIAL_RESULT_REPEATS};
pub use result::{FetchOutcome, ResultPayload, ResultPoll};

/// Bound on the per-feed response poll. Keeps the media thread real-time.
const FEED_POLL_WAIT: Duration = Duration::from_millis(5);

/// Bound on the end-of-speech handshake wait for the final transcript.
const FINAL_RESPONSE_WAIT: Duration = Duration::from_secs(60);

/// One active recognition attempt bound to a single call leg.
///
/// Safe to share across the media and control threads; every operation
/// takes the internal session lock.
pub struct RecognitionSession {
    closed: AtomicBool,
    cancel: CancellationToken,
    inner: Mutex<SessionInner>,
    config: SharedConfig,
}

struct SessionInner {
    channel_id: String,
    grammar: String,
    params: SessionParams,
    flags: SessionFlags,
    gate: VoiceGate,
    framer: AudioFramer,
    transport: Box<dyn SpeechTransport>,
    result_text: String,
    confidence: f64,
    no_input_since: Instant,
    speech_since: Option<Instant>,
    partial_remaining: u32,
}

impl SessionInner {
    /// Rearm for a fresh utterance: flags back to the initial-open state,
    /// pending result dropped, no-input clock restarted, gate back to
    /// quiet. The transport connection and framer are kept.
    fn reset(&mut self) {
        self.gate.reset();
        self.flags = SessionFlags::initial(self.params.start_input_timers);
        self.result_text.clear();
        self.confidence = DEFAULT_CONFIDENCE;
        self.no_input_since = Instant::now();
        self.speech_since = None;
    }
}

impl RecognitionSession {
    pub(crate) fn new(
        channel_id: String,
        sample_rate: u32,
        transport: Box<dyn SpeechTransport>,
        config: SharedConfig,
    ) -> Self {
        let params = SessionParams::new(sample_rate);
        let gate = VoiceGate::new(sample_rate, VadConfig::default());

        let mut inner = SessionInner {
            channel_id,
            grammar: String::new(),
            params,
            flags: SessionFlags::default(),
            gate,
            framer: AudioFramer::new(),
            transport,
            result_text: String::new(),
            confidence: DEFAULT_CONFIDENCE,
            no_input_since: Instant::now(),
            speech_since: None,
            partial_remaining: 0,
        };
        inner.reset();

        Self {
            closed: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            inner: Mutex::new(inner),
            config,
        }
    }

    /// Feed one frame of 16-bit little-endian PCM from the media thread.
    ///
    /// Runs the frame through the voice gate and, while the caller is
    /// talking, streams fixed-size blocks to the backend with a bounded
    /// poll for interim responses. Detected or forced end of speech
    /// performs the end-of-speech handshake and leaves a result pending.
    ///
    /// # Errors
    /// [`AsrError::SessionClosed`] after close, [`AsrError::UtteranceComplete`]
    /// when a final was already delivered and auto-resume is off, and any
    /// transport failure, which aborts the current utterance.
    pub async fn feed(&self, pcm: &[u8]) -> AsrResult<()> {
        self.ensure_open()?;
        let mut inner = self.inner.lock().await;
        self.ensure_open()?;

        if inner.flags.returned_result {
            if inner.params.auto_resume {
                debug!(channel = %inner.channel_id, "auto-resuming after delivered result");
                inner.reset();
            } else {
                return Err(AsrError::UtteranceComplete);
            }
        }

        if inner.flags.speech_timeout_pending {
            // the timeout fired between feeds; force the utterance closed now
            finish_utterance(&self.cancel, &mut inner).await?;
            inner.flags.result = true;
            inner.flags.speech_timeout_pending = false;
            inner.gate.reset();
        }

        if !inner.flags.ready {
            return Ok(());
        }

        let samples = samples_from_pcm(pcm);
        match inner.gate.process(&samples) {
            VadEvent::Talking => {
                inner.framer.append(pcm);
                if let Some(block) = inner.framer.flush_block() {
                    debug!(channel = %inner.channel_id, len = block.len(), "sending audio block");
                    inner.transport.send_binary(block).await?;
                }

                match poll_with_cancel(&self.cancel, &mut inner.transport, FEED_POLL_WAIT).await? {
                    None => {}
                    Some(TransportFrame::Ping(payload)) => {
                        debug!(channel = %inner.channel_id, "answering backend ping");
                        inner.transport.send_pong(payload).await?;
                    }
                    Some(TransportFrame::Pong(_)) => {}
                    Some(TransportFrame::Text(text)) => {
                        debug!(channel = %inner.channel_id, "interim transcript: {text}");
                        inner.result_text = text;
                    }
                    Some(TransportFrame::Binary(data)) => {
                        inner.result_text = String::from_utf8_lossy(&data).into_owned();
                    }
                }
            }
            VadEvent::StopTalking => {
                finish_utterance(&self.cancel, &mut inner).await?;
                inner.flags.result = true;
                inner.flags.ready = false;
                inner.gate.reset();
            }
            VadEvent::StartTalking => {
                inner.flags.start_of_speech = true;
                inner.speech_since = Some(Instant::now());
            }
            VadEvent::Silence => {}
        }

        Ok(())
    }

    /// Poll whether an outcome is ready. Non-mutating except for arming
    /// the timeout flags when a clock fires.
    pub async fn check_results(&self) -> ResultPoll {
        if self.closed.load(Ordering::SeqCst) {
            return ResultPoll::NotReady;
        }
        let mut inner = self.inner.lock().await;

        if inner.flags.returned_result {
            return ResultPoll::NotReady;
        }
        if inner.flags.start_of_speech && !inner.flags.returned_start_of_speech {
            return ResultPoll::Ready;
        }

        match policy::evaluate(
            &inner.flags,
            &inner.params,
            inner.no_input_since,
            inner.speech_since,
            Instant::now(),
        ) {
            Some(policy::TimerVerdict::NoInput) => {
                debug!(
                    channel = %inner.channel_id,
                    elapsed_ms = inner.no_input_since.elapsed().as_millis() as u64,
                    "no-input timeout"
                );
                inner.flags.no_input_timeout = true;
            }
            Some(policy::TimerVerdict::SpeechTimeout) => {
                debug!(channel = %inner.channel_id, "speech timeout, forcing end of utterance");
                inner.flags.speech_timeout_pending = true;
                // one more feed call resolves the pending timeout into a result
                return ResultPoll::Recheck;
            }
            None => {}
        }

        if inner.flags.result || inner.flags.no_input_timeout {
            ResultPoll::Ready
        } else {
            ResultPoll::NotReady
        }
    }

    /// Consume the pending outcome.
    ///
    /// Priority order: pending transcript (partial while the partial
    /// counter runs, then final), no-input timeout outcome, start-of-speech
    /// notification. Anything else is a protocol-order error.
    pub async fn fetch_result(&self) -> AsrResult<FetchOutcome> {
        self.ensure_open()?;
        let mut inner = self.inner.lock().await;

        if inner.flags.returned_result {
            return Err(AsrError::NoResultPending);
        }

        let return_json = self.config.read().return_json;

        if inner.flags.result {
            let payload = ResultPayload::transcript(
                inner.grammar.clone(),
                inner.result_text.clone(),
                inner.confidence,
            );
            if inner.partial_remaining > 0 {
                inner.partial_remaining -= 1;
                info!(
                    channel = %inner.channel_id,
                    remaining = inner.partial_remaining,
                    "partial result: {}",
                    payload.render(return_json)
                );
                return Ok(FetchOutcome::Partial(payload));
            }
            inner.flags.returned_result = true;
            inner.flags.ready = false;
            info!(channel = %inner.channel_id, "final result: {}", payload.render(return_json));
            Ok(FetchOutcome::Final(payload))
        } else if inner.flags.no_input_timeout {
            let payload = ResultPayload::no_input(inner.grammar.clone());
            inner.flags.returned_result = true;
            inner.flags.ready = false;
            info!(channel = %inner.channel_id, "final result: no input");
            Ok(FetchOutcome::Final(payload))
        } else if inner.flags.start_of_speech && !inner.flags.returned_start_of_speech {
            inner.flags.returned_start_of_speech = true;
            debug!(channel = %inner.channel_id, "start of speech");
            Ok(FetchOutcome::StartOfSpeech)
        } else {
            error!(channel = %inner.channel_id, "fetch_result called with nothing pending");
            Err(AsrError::NoResultPending)
        }
    }

    /// Stop accepting audio and drop every flag. Resume rearms.
    pub async fn pause(&self) -> AsrResult<()> {
        self.ensure_open()?;
        let mut inner = self.inner.lock().await;
        debug!(channel = %inner.channel_id, "pausing");
        inner.flags.clear();
        Ok(())
    }

    /// Full reset: back to the initial-open state on the same connection.
    pub async fn resume(&self) -> AsrResult<()> {
        self.ensure_open()?;
        let mut inner = self.inner.lock().await;
        debug!(channel = %inner.channel_id, "resuming");
        inner.reset();
        Ok(())
    }

    /// Arm the no-input clock if it is not already running.
    pub async fn start_input_timers(&self) -> AsrResult<()> {
        self.ensure_open()?;
        let mut inner = self.inner.lock().await;
        if inner.flags.input_timers {
            info!(channel = %inner.channel_id, "input timers already started");
        } else {
            debug!(channel = %inner.channel_id, "starting input timers");
            inner.flags.input_timers = true;
            inner.no_input_since = Instant::now();
        }
        Ok(())
    }

    /// Attach a grammar label. Opaque passthrough, echoed in results.
    pub async fn load_grammar(&self, grammar: &str, name: &str) -> AsrResult<()> {
        self.ensure_open()?;
        let mut inner = self.inner.lock().await;
        debug!(channel = %inner.channel_id, name, "load grammar: {grammar}");
        inner.grammar = grammar.to_string();
        Ok(())
    }

    /// Grammars are not tracked per name; unloading is a no-op.
    pub async fn unload_grammar(&self, _name: &str) -> AsrResult<()> {
        Ok(())
    }

    /// Auto-resume mode: when enabled, audio arriving after a delivered
    /// final rearms the session instead of failing.
    pub async fn set_auto_resume(&self, enabled: bool) {
        let mut inner = self.inner.lock().await;
        inner.params.auto_resume = enabled;
    }

    /// Apply a named parameter. Unknown names and values that fail
    /// validation are ignored with a log line.
    pub async fn set_param(&self, name: &str, value: &str) {
        if name.is_empty() || value.is_empty() {
            return;
        }
        let mut inner = self.inner.lock().await;
        let inner = &mut *inner;

        if name.eq_ignore_ascii_case("no-input-timeout") {
            if let Ok(ms) = value.parse::<i64>() {
                inner.params.no_input_timeout_ms = ms;
                debug!(channel = %inner.channel_id, "no-input-timeout = {ms}");
            }
        } else if name.eq_ignore_ascii_case("speech-timeout") {
            if let Ok(ms) = value.parse::<i64>() {
                inner.params.speech_timeout_ms = ms;
                debug!(channel = %inner.channel_id, "speech-timeout = {ms}");
            }
        } else if name.eq_ignore_ascii_case("start-input-timers") {
            let enabled = parse_bool(value);
            inner.params.start_input_timers = enabled;
            inner.flags.input_timers = enabled;
            debug!(channel = %inner.channel_id, "start-input-timers = {enabled}");
        } else if name.eq_ignore_ascii_case("vad-mode") {
            if let Ok(mode) = value.parse::<i32>() {
                inner.gate.set_mode(mode);
                debug!(channel = %inner.channel_id, "vad-mode = {mode}");
            }
        } else if name.eq_ignore_ascii_case("vad-voice-ms") {
            if let Ok(ms) = value.parse::<u32>() {
                if ms > 0 {
                    inner.gate.set_voice_ms(ms);
                    debug!(channel = %inner.channel_id, "vad-voice-ms = {ms}");
                }
            }
        } else if name.eq_ignore_ascii_case("vad-silence-ms") {
            if let Ok(ms) = value.parse::<u32>() {
                if ms > 0 {
                    inner.gate.set_silence_ms(ms);
                    debug!(channel = %inner.channel_id, "vad-silence-ms = {ms}");
                }
            }
        } else if name.eq_ignore_ascii_case("vad-thresh") {
            if let Ok(thresh) = value.parse::<u32>() {
                if thresh > 0 {
                    inner.gate.set_thresh(thresh);
                    debug!(channel = %inner.channel_id, "vad-thresh = {thresh}");
                }
            }
        } else if name.eq_ignore_ascii_case("channel-uuid") {
            inner.channel_id = value.to_string();
            debug!(channel = %inner.channel_id, "channel-uuid updated");
        } else if name.eq_ignore_ascii_case("result") {
            inner.result_text = value.to_string();
            debug!(channel = %inner.channel_id, "result override = {value}");
        } else if name.eq_ignore_ascii_case("confidence") {
            if let Ok(confidence) = value.parse::<f64>() {
                if confidence >= 0.0 {
                    inner.confidence = confidence;
                    debug!(channel = %inner.channel_id, "confidence override = {confidence}");
                }
            }
        } else if name.eq_ignore_ascii_case("partial") {
            if parse_bool(value) {
                inner.partial_remaining = PARTIAL_RESULT_REPEATS;
                debug!(
                    channel = %inner.channel_id,
                    "partial results enabled, {} deliveries", PARTIAL_RESULT_REPEATS
                );
            }
        } else {
            debug!(channel = %inner.channel_id, "ignoring unknown parameter {name}");
        }
    }

    /// Close the session: cancel any in-progress wait, half-close the
    /// connection, release the audio buffer.
    ///
    /// # Errors
    /// [`AsrError::AlreadyClosed`] on a second call; released resources are
    /// never touched again.
    pub async fn close(&self) -> AsrResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            warn!("double close on recognition session");
            return Err(AsrError::AlreadyClosed);
        }

        self.cancel.cancel();
        let mut inner = self.inner.lock().await;
        if let Err(e) = inner.transport.close().await {
            warn!(channel = %inner.channel_id, "transport close failed: {e}");
        }
        inner.framer.clear();
        debug!(channel = %inner.channel_id, "session closed");
        Ok(())
    }

    fn ensure_open(&self) -> AsrResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(AsrError::SessionClosed);
        }
        Ok(())
    }
}

/// One bounded receive that a concurrent `close` can interrupt.
async fn poll_with_cancel(
    cancel: &CancellationToken,
    transport: &mut Box<dyn SpeechTransport>,
    wait: Duration,
) -> AsrResult<Option<TransportFrame>> {
    tokio::select! {
        _ = cancel.cancelled() => Err(AsrError::SessionClosed),
        frame = transport.poll_frame(wait) => frame,
    }
}

/// End-of-speech handshake: send the end marker, then wait (bounded) for
/// the backend's final payload, which becomes the transcript verbatim.
/// Pings arriving during the wait are answered and skipped.
async fn finish_utterance(
    cancel: &CancellationToken,
    inner: &mut SessionInner,
) -> AsrResult<()> {
    let marker = EndOfSpeech.to_json();
    debug!(channel = %inner.channel_id, "sending end-of-speech marker {marker}");
    inner.transport.send_text(marker).await?;

    loop {
        let frame = poll_with_cancel(cancel, &mut inner.transport, FINAL_RESPONSE_WAIT)
            .await?
            .ok_or_else(|| {
                AsrError::Transport(format!(
                    "no final transcript within {}s of end-of-speech",
                    FINAL_RESPONSE_WAIT.as_secs()
                ))
            })?;

        match frame {
            TransportFrame::Ping(payload) => {
                debug!(channel = %inner.channel_id, "answering backend ping during final wait");
                inner.transport.send_pong(payload).await?;
            }
            TransportFrame::Pong(_) => {}
            TransportFrame::Text(text) => {
                inner.result_text = text;
                break;
            }
            TransportFrame::Binary(data) => {
                inner.result_text = String::from_utf8_lossy(&data).into_owned();
                break;
            }
        }
    }

    info!(
        channel = %inner.channel_id,
        len = inner.result_text.len(),
        "final transcript: {}",
        inner.result_text
    );
    Ok(())
}
