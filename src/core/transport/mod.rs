//! Streaming transport to the transcription backend.
//!
//! One connection per session. The session state machine talks to the
//! backend through the [`SpeechTransport`] trait so the wire implementation
//! can be swapped: [`WsTransport`] in production, a scripted stub in tests.
//!
//! Failure policy: fail fast. A failed send/poll/receive aborts the current
//! utterance and surfaces to the session; no retries are performed here.
//! Retry and backoff belong to the host media pipeline.

mod messages;
mod ws;

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::errors::AsrResult;

pub use messages::{ConnectRequest, EndOfSpeech};
pub use ws::{WsTransport, DEFAULT_CONNECT_TIMEOUT};

/// One framed message off the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportFrame {
    /// Text payload: a transcript or control response.
    Text(String),
    /// Binary payload.
    Binary(Bytes),
    /// Keep-alive probe; must be answered with a pong echoing the payload.
    Ping(Bytes),
    /// Keep-alive answer.
    Pong(Bytes),
}

/// Framed bidirectional stream to the backend.
///
/// All waits are bounded by the caller-supplied timeout; an implementation
/// must never block past it.
#[async_trait]
pub trait SpeechTransport: Send {
    /// Send one binary audio block.
    async fn send_binary(&mut self, payload: Bytes) -> AsrResult<()>;

    /// Send one text control message.
    async fn send_text(&mut self, payload: String) -> AsrResult<()>;

    /// Wait up to `wait` for a full frame. `Ok(None)` is a clean timeout;
    /// remote close and wire errors are `Err`.
    async fn poll_frame(&mut self, wait: Duration) -> AsrResult<Option<TransportFrame>>;

    /// Answer a ping, echoing its payload.
    async fn send_pong(&mut self, payload: Bytes) -> AsrResult<()>;

    /// Best-effort half-close followed by resource release. Call at most
    /// once; the session's closed-guard enforces that.
    async fn close(&mut self) -> AsrResult<()>;
}
