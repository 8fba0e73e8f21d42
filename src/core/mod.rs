//! Core recognition components.
//!
//! Leaves first: the [`vad`] gate and [`framer`] are independent signal
//! pieces, [`transport`] owns the backend connection, and [`session`]
//! composes all three into the per-call state machine.

pub mod framer;
pub mod session;
pub mod transport;
pub mod vad;

// Re-export commonly used items
pub use framer::{AudioFramer, AUDIO_BLOCK_SIZE};
pub use session::{
    FetchOutcome, RecognitionSession, ResultPayload, ResultPoll, SessionFlags, SessionParams,
};
pub use transport::{ConnectRequest, EndOfSpeech, SpeechTransport, TransportFrame, WsTransport};
pub use vad::{VadConfig, VadEvent, VoiceGate};
