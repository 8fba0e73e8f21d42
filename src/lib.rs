//! # speechwire
//!
//! Streaming speech-recognition session driver for telephony media
//! pipelines. Takes live PCM from a call leg, gates it through local
//! voice-activity detection, streams speech audio to a remote
//! transcription backend over a persistent WebSocket, and delivers
//! ordered partial/final results back to the host under a configurable
//! timeout policy.
//!
//! The host media engine drives the lifecycle:
//!
//! ```rust,no_run
//! use speechwire::{EngineConfig, FetchOutcome, RecognitionEngine, ResultPoll};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = RecognitionEngine::new(EngineConfig::default())?;
//!     let session = engine.open("L16", 16000, None).await?;
//!
//!     // media thread: push PCM as it arrives
//!     let pcm = vec![0u8; 320]; // 10ms of 16kHz 16-bit mono
//!     session.feed(&pcm).await?;
//!
//!     // control thread: poll for outcomes
//!     if session.check_results().await == ResultPoll::Ready {
//!         match session.fetch_result().await? {
//!             FetchOutcome::Final(payload) => println!("{}", payload.render(true)),
//!             FetchOutcome::Partial(payload) => println!("(more) {}", payload.text),
//!             FetchOutcome::StartOfSpeech => println!("caller started talking"),
//!         }
//!     }
//!
//!     session.close().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod engine;
pub mod errors;

// Re-export commonly used items for convenience
pub use config::{EngineConfig, SharedConfig};
pub use core::*;
pub use engine::{RecognitionEngine, NATIVE_SAMPLE_RATE};
pub use errors::{AsrError, AsrResult};
