//! Error types for the recognition driver.
//!
//! One crate-level taxonomy, split along the failure boundaries the session
//! state machine cares about: protocol misuse by the host, transport
//! failures that abort the current utterance, and configuration problems
//! that fail session creation outright. Timeout outcomes (no-input, speech)
//! are *not* errors; they are delivered through the normal result channel.

/// Error type for all recognition driver operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AsrError {
    /// The WebSocket handshake failed or did not complete within the bound.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The backend closed the connection (close frame or stream end).
    #[error("connection closed by backend")]
    ConnectionClosed,

    /// A send, poll, or receive on the open connection failed. Aborts the
    /// current utterance; the session stays open and the host is expected
    /// to close it.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The backend sent a frame the driver cannot interpret.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// An operation was invoked on a closed session.
    #[error("session is closed")]
    SessionClosed,

    /// `close` was called a second time on the same session.
    #[error("session already closed")]
    AlreadyClosed,

    /// A final result was already delivered for this utterance and the
    /// session is not configured to auto-resume.
    #[error("utterance already delivered")]
    UtteranceComplete,

    /// `fetch_result` was called with nothing pending.
    #[error("no result pending")]
    NoResultPending,

    /// Invalid engine or session configuration.
    #[error("invalid configuration: {0}")]
    Configuration(String),
}

/// Result type alias for recognition driver operations.
pub type AsrResult<T> = Result<T, AsrError>;
