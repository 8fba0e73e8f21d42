//! Session state-machine tests.
//!
//! The session is driven end to end against a scripted stub transport so
//! every scenario runs without a network: the stub records sends, hands
//! out queued frames on poll, and answers the end-of-speech marker with a
//! canned transcript.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use tokio::time::sleep;

use super::*;
use crate::config::EngineConfig;
use crate::core::framer::AUDIO_BLOCK_SIZE;
use crate::core::transport::{SpeechTransport, TransportFrame};

// =============================================================================
// Stub transport
// =============================================================================

#[derive(Default)]
struct StubState {
    /// Frames handed out by successive polls; empty means a clean timeout.
    incoming: VecDeque<TransportFrame>,
    sent_blocks: Vec<Bytes>,
    sent_texts: Vec<String>,
    pongs: Vec<Bytes>,
    /// Transcript queued as the answer to the end-of-speech marker.
    final_transcript: String,
}

#[derive(Clone)]
struct StubHandle {
    state: Arc<StdMutex<StubState>>,
    closed: Arc<AtomicBool>,
    fail_sends: Arc<AtomicBool>,
}

impl StubHandle {
    fn push_frame(&self, frame: TransportFrame) {
        self.state.lock().unwrap().incoming.push_back(frame);
    }

    fn set_final_transcript(&self, text: &str) {
        self.state.lock().unwrap().final_transcript = text.to_string();
    }

    fn sent_blocks(&self) -> Vec<Bytes> {
        self.state.lock().unwrap().sent_blocks.clone()
    }

    fn sent_texts(&self) -> Vec<String> {
        self.state.lock().unwrap().sent_texts.clone()
    }

    fn pongs(&self) -> Vec<Bytes> {
        self.state.lock().unwrap().pongs.clone()
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

struct StubTransport {
    state: Arc<StdMutex<StubState>>,
    closed: Arc<AtomicBool>,
    fail_sends: Arc<AtomicBool>,
}

impl StubTransport {
    fn new() -> (Self, StubHandle) {
        let state = Arc::new(StdMutex::new(StubState {
            final_transcript: "stub transcript".to_string(),
            ..StubState::default()
        }));
        let closed = Arc::new(AtomicBool::new(false));
        let fail_sends = Arc::new(AtomicBool::new(false));
        let handle = StubHandle {
            state: state.clone(),
            closed: closed.clone(),
            fail_sends: fail_sends.clone(),
        };
        (
            Self {
                state,
                closed,
                fail_sends,
            },
            handle,
        )
    }

    fn check_send(&self) -> AsrResult<()> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(AsrError::Transport("stub send failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl SpeechTransport for StubTransport {
    async fn send_binary(&mut self, payload: Bytes) -> AsrResult<()> {
        self.check_send()?;
        self.state.lock().unwrap().sent_blocks.push(payload);
        Ok(())
    }

    async fn send_text(&mut self, payload: String) -> AsrResult<()> {
        self.check_send()?;
        let mut state = self.state.lock().unwrap();
        // the end-of-speech marker is answered with the canned transcript
        if payload.contains("eof") {
            let transcript = state.final_transcript.clone();
            state.incoming.push_back(TransportFrame::Text(transcript));
        }
        state.sent_texts.push(payload);
        Ok(())
    }

    async fn poll_frame(&mut self, _wait: Duration) -> AsrResult<Option<TransportFrame>> {
        Ok(self.state.lock().unwrap().incoming.pop_front())
    }

    async fn send_pong(&mut self, payload: Bytes) -> AsrResult<()> {
        self.check_send()?;
        self.state.lock().unwrap().pongs.push(payload);
        Ok(())
    }

    async fn close(&mut self) -> AsrResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

// =============================================================================
// Helpers
// =============================================================================

const RATE: u32 = 16000;

fn stub_session() -> (RecognitionSession, StubHandle) {
    let (transport, handle) = StubTransport::new();
    let config: SharedConfig = Arc::new(RwLock::new(EngineConfig::default()));
    let session =
        RecognitionSession::new("test-channel".to_string(), RATE, Box::new(transport), config);
    (session, handle)
}

/// 10 ms of 16 kHz 16-bit PCM at the given amplitude.
fn pcm_frame(amplitude: i16) -> Vec<u8> {
    let mut pcm = Vec::with_capacity(320);
    for _ in 0..160 {
        pcm.extend_from_slice(&amplitude.to_le_bytes());
    }
    pcm
}

fn loud() -> Vec<u8> {
    pcm_frame(3000)
}

fn quiet() -> Vec<u8> {
    pcm_frame(0)
}

/// Shrink the gate hysteresis so scenarios run on a handful of 10 ms frames.
async fn fast_gate(session: &RecognitionSession) {
    session.set_param("vad-voice-ms", "20").await;
    session.set_param("vad-silence-ms", "30").await;
}

/// Feed loud frames until the gate opens (start-of-speech flag set).
async fn feed_until_speaking(session: &RecognitionSession) {
    for _ in 0..10 {
        session.feed(&loud()).await.expect("feed");
        if session.inner.lock().await.flags.start_of_speech {
            return;
        }
    }
    panic!("gate never opened");
}

/// Drive a full utterance: speech, then silence until the end-of-speech
/// handshake runs and a result is pending.
async fn run_utterance(session: &RecognitionSession) {
    feed_until_speaking(session).await;
    for _ in 0..3 {
        session.feed(&loud()).await.expect("feed");
    }
    for _ in 0..10 {
        session.feed(&quiet()).await.expect("feed");
        if session.inner.lock().await.flags.result {
            return;
        }
    }
    panic!("utterance never finished");
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn test_initial_flags_after_open() {
    let (session, _handle) = stub_session();
    let inner = session.inner.lock().await;
    assert_eq!(inner.flags, SessionFlags::initial(true));
    assert_eq!(inner.confidence, DEFAULT_CONFIDENCE);
    assert!(inner.result_text.is_empty());
}

#[tokio::test]
async fn test_silence_is_a_no_op() {
    let (session, handle) = stub_session();
    for _ in 0..20 {
        session.feed(&quiet()).await.expect("feed");
    }
    assert!(handle.sent_blocks().is_empty());
    assert!(handle.sent_texts().is_empty());
    assert_eq!(session.check_results().await, ResultPoll::NotReady);
}

#[tokio::test]
async fn test_no_input_timeout_outcome() {
    let (session, _handle) = stub_session();
    session.set_param("no-input-timeout", "40").await;
    session.load_grammar("digits", "g1").await.expect("grammar");

    session.feed(&quiet()).await.expect("feed");
    assert_eq!(session.check_results().await, ResultPoll::NotReady);

    sleep(Duration::from_millis(60)).await;
    session.feed(&quiet()).await.expect("feed");
    assert_eq!(session.check_results().await, ResultPoll::Ready);

    let outcome = session.fetch_result().await.expect("fetch");
    match outcome {
        FetchOutcome::Final(payload) => {
            assert_eq!(payload.grammar, "digits");
            assert_eq!(payload.text, "");
            assert_eq!(payload.confidence, 0.0);
            assert_eq!(payload.error.as_deref(), Some("no_input"));

            let value: serde_json::Value =
                serde_json::from_str(&payload.render(true)).expect("json");
            assert_eq!(value["error"], "no_input");
            assert_eq!(value["confidence"], 0.0);
        }
        other => panic!("expected final no-input outcome, got {other:?}"),
    }

    // the outcome is consumed exactly once
    assert_eq!(session.check_results().await, ResultPoll::NotReady);
    assert!(matches!(
        session.fetch_result().await,
        Err(AsrError::NoResultPending)
    ));
}

#[tokio::test]
async fn test_disabled_no_input_timer_never_fires() {
    let (session, _handle) = stub_session();
    session.set_param("no-input-timeout", "-1").await;

    sleep(Duration::from_millis(50)).await;
    session.feed(&quiet()).await.expect("feed");
    assert_eq!(session.check_results().await, ResultPoll::NotReady);
}

#[tokio::test]
async fn test_unarmed_timers_never_fire() {
    let (session, _handle) = stub_session();
    session.set_param("start-input-timers", "false").await;
    session.set_param("no-input-timeout", "20").await;

    sleep(Duration::from_millis(50)).await;
    assert_eq!(session.check_results().await, ResultPoll::NotReady);

    // arming restarts the clock from now
    session.start_input_timers().await.expect("start timers");
    assert_eq!(session.check_results().await, ResultPoll::NotReady);
    sleep(Duration::from_millis(40)).await;
    assert_eq!(session.check_results().await, ResultPoll::Ready);
}

#[tokio::test]
async fn test_start_of_speech_notification() {
    let (session, _handle) = stub_session();
    fast_gate(&session).await;

    feed_until_speaking(&session).await;
    assert_eq!(session.check_results().await, ResultPoll::Ready);

    let outcome = session.fetch_result().await.expect("fetch");
    assert_eq!(outcome, FetchOutcome::StartOfSpeech);

    // the notification is delivered once; with no result pending the next
    // fetch is out of protocol order
    assert_eq!(session.check_results().await, ResultPoll::NotReady);
    assert!(matches!(
        session.fetch_result().await,
        Err(AsrError::NoResultPending)
    ));
}

#[tokio::test]
async fn test_utterance_delivers_final_transcript() {
    let (session, handle) = stub_session();
    fast_gate(&session).await;
    handle.set_final_transcript("hello world");

    run_utterance(&session).await;

    // the end marker went out exactly once
    assert_eq!(handle.sent_texts(), vec![r#"{"eof":"true"}"#.to_string()]);

    assert_eq!(session.check_results().await, ResultPoll::Ready);
    let outcome = session.fetch_result().await.expect("fetch");
    match outcome {
        FetchOutcome::Final(payload) => {
            assert_eq!(payload.text, "hello world");
            assert_eq!(payload.confidence, DEFAULT_CONFIDENCE);
        }
        other => panic!("expected final transcript, got {other:?}"),
    }

    // monotone returned_result: never delivered twice
    assert!(matches!(
        session.fetch_result().await,
        Err(AsrError::NoResultPending)
    ));
    assert_eq!(session.check_results().await, ResultPoll::NotReady);
}

#[tokio::test]
async fn test_exactly_one_block_per_flush() {
    let (session, handle) = stub_session();
    fast_gate(&session).await;

    feed_until_speaking(&session).await;
    // each talking frame is 320 bytes; the first block goes out once the
    // framer holds strictly more than 3200 bytes
    let mut fed = 0usize;
    while handle.sent_blocks().is_empty() {
        session.feed(&loud()).await.expect("feed");
        fed += 320;
        assert!(fed <= AUDIO_BLOCK_SIZE + 640, "block never flushed");
    }

    let blocks = handle.sent_blocks();
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0].len(), AUDIO_BLOCK_SIZE);
}

#[tokio::test]
async fn test_ping_answered_with_identical_payload() {
    let (session, handle) = stub_session();
    fast_gate(&session).await;
    feed_until_speaking(&session).await;

    let flags_before = session.inner.lock().await.flags;
    handle.push_frame(TransportFrame::Ping(Bytes::from_static(b"keepalive")));
    session.feed(&loud()).await.expect("feed");

    assert_eq!(handle.pongs(), vec![Bytes::from_static(b"keepalive")]);
    assert_eq!(session.inner.lock().await.flags, flags_before);
}

#[tokio::test]
async fn test_interim_payload_updates_pending_result() {
    let (session, handle) = stub_session();
    fast_gate(&session).await;
    feed_until_speaking(&session).await;

    handle.push_frame(TransportFrame::Text("partial hypothesis".to_string()));
    session.feed(&loud()).await.expect("feed");
    assert_eq!(
        session.inner.lock().await.result_text,
        "partial hypothesis"
    );
}

#[tokio::test]
async fn test_partial_results_then_final() {
    let (session, handle) = stub_session();
    fast_gate(&session).await;
    session.set_param("partial", "true").await;
    handle.set_final_transcript("agent");

    run_utterance(&session).await;

    for expected_remaining in [2u32, 1, 0] {
        match session.fetch_result().await.expect("fetch") {
            FetchOutcome::Partial(payload) => assert_eq!(payload.text, "agent"),
            other => panic!("expected partial, got {other:?}"),
        }
        assert_eq!(
            session.inner.lock().await.partial_remaining,
            expected_remaining
        );
        // partial deliveries keep the utterance open
        assert_eq!(session.check_results().await, ResultPoll::Ready);
    }

    match session.fetch_result().await.expect("fetch") {
        FetchOutcome::Final(payload) => assert_eq!(payload.text, "agent"),
        other => panic!("expected final, got {other:?}"),
    }
    assert_eq!(session.check_results().await, ResultPoll::NotReady);
}

#[tokio::test]
async fn test_feed_after_final_is_protocol_misuse() {
    let (session, handle) = stub_session();
    fast_gate(&session).await;
    handle.set_final_transcript("done");

    run_utterance(&session).await;
    session.fetch_result().await.expect("fetch");

    assert!(matches!(
        session.feed(&quiet()).await,
        Err(AsrError::UtteranceComplete)
    ));
}

#[tokio::test]
async fn test_auto_resume_rearms_on_feed() {
    let (session, handle) = stub_session();
    fast_gate(&session).await;
    session.set_auto_resume(true).await;
    handle.set_final_transcript("first");

    run_utterance(&session).await;
    session.fetch_result().await.expect("fetch");
    assert!(session.inner.lock().await.flags.returned_result);

    session.feed(&quiet()).await.expect("feed");
    let inner = session.inner.lock().await;
    assert_eq!(inner.flags, SessionFlags::initial(true));
    assert!(inner.result_text.is_empty());
}

#[tokio::test]
async fn test_speech_timeout_resolved_by_next_feed() {
    let (session, handle) = stub_session();
    fast_gate(&session).await;
    session.set_param("speech-timeout", "30").await;
    handle.set_final_transcript("cut short");

    feed_until_speaking(&session).await;
    // consume the start-of-speech notification so the timer evaluation runs
    assert_eq!(session.check_results().await, ResultPoll::Ready);
    assert_eq!(
        session.fetch_result().await.expect("fetch"),
        FetchOutcome::StartOfSpeech
    );
    sleep(Duration::from_millis(50)).await;

    // the clock fired: the host is told to feed once more
    assert_eq!(session.check_results().await, ResultPoll::Recheck);
    assert!(session.inner.lock().await.flags.speech_timeout_pending);
    // the verdict is not repeated while pending
    assert_eq!(session.check_results().await, ResultPoll::NotReady);

    session.feed(&quiet()).await.expect("feed");
    assert_eq!(session.check_results().await, ResultPoll::Ready);
    match session.fetch_result().await.expect("fetch") {
        FetchOutcome::Final(payload) => assert_eq!(payload.text, "cut short"),
        other => panic!("expected final, got {other:?}"),
    }
}

#[tokio::test]
async fn test_reset_restores_initial_state() {
    let (session, _handle) = stub_session();
    fast_gate(&session).await;
    feed_until_speaking(&session).await;
    session.set_param("result", "injected").await;

    session.resume().await.expect("resume");

    let inner = session.inner.lock().await;
    assert_eq!(inner.flags, SessionFlags::initial(true));
    assert!(inner.result_text.is_empty());
    assert_eq!(inner.confidence, DEFAULT_CONFIDENCE);
    assert!(inner.speech_since.is_none());
}

#[tokio::test]
async fn test_pause_drops_all_flags() {
    let (session, handle) = stub_session();
    fast_gate(&session).await;
    feed_until_speaking(&session).await;

    session.pause().await.expect("pause");
    assert_eq!(session.inner.lock().await.flags, SessionFlags::default());

    // paused sessions ignore audio entirely
    let blocks_before = handle.sent_blocks().len();
    for _ in 0..10 {
        session.feed(&loud()).await.expect("feed");
    }
    assert_eq!(handle.sent_blocks().len(), blocks_before);
    assert_eq!(session.check_results().await, ResultPoll::NotReady);
}

#[tokio::test]
async fn test_result_and_confidence_overrides() {
    let (session, _handle) = stub_session();
    session.set_param("no-input-timeout", "10").await;
    session.set_param("result", "forced text").await;
    session.set_param("confidence", "55.5").await;

    let inner = session.inner.lock().await;
    assert_eq!(inner.result_text, "forced text");
    assert_eq!(inner.confidence, 55.5);
    // negative confidence is rejected
    drop(inner);
    session.set_param("confidence", "-3").await;
    assert_eq!(session.inner.lock().await.confidence, 55.5);
}

#[tokio::test]
async fn test_transport_failure_aborts_utterance() {
    let (session, handle) = stub_session();
    fast_gate(&session).await;
    feed_until_speaking(&session).await;

    handle.fail_sends.store(true, Ordering::SeqCst);
    let mut failed = false;
    for _ in 0..12 {
        if matches!(session.feed(&loud()).await, Err(AsrError::Transport(_))) {
            failed = true;
            break;
        }
    }
    assert!(failed, "send failure never surfaced");
}

#[tokio::test]
async fn test_double_close_detected() {
    let (session, handle) = stub_session();
    assert!(session.close().await.is_ok());
    assert!(handle.is_closed());

    assert!(matches!(
        session.close().await,
        Err(AsrError::AlreadyClosed)
    ));

    // every operation fails fast after close
    assert!(matches!(
        session.feed(&loud()).await,
        Err(AsrError::SessionClosed)
    ));
    assert!(matches!(
        session.fetch_result().await,
        Err(AsrError::SessionClosed)
    ));
    assert!(matches!(session.pause().await, Err(AsrError::SessionClosed)));
    assert!(matches!(
        session.resume().await,
        Err(AsrError::SessionClosed)
    ));
    assert_eq!(session.check_results().await, ResultPoll::NotReady);
}

#[tokio::test]
async fn test_unknown_param_ignored() {
    let (session, _handle) = stub_session();
    session.set_param("beam-width", "5").await;
    session.set_param("", "x").await;
    session.set_param("no-input-timeout", "").await;
    // defaults untouched
    let inner = session.inner.lock().await;
    assert_eq!(inner.params.no_input_timeout_ms, 5000);
}
