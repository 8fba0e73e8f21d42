//! Recognition engine: owns the process-wide configuration and opens
//! sessions against the transcription backend.
//!
//! The engine is the host's entry point. It holds the shared
//! [`EngineConfig`] (backend endpoint, result formatting), supports an
//! explicit reload serialized against concurrent readers, and builds one
//! [`RecognitionSession`] per call leg: connecting the WebSocket with a
//! bounded handshake, allocating the audio framer, and initializing the
//! voice gate.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::{EngineConfig, SharedConfig};
use crate::core::session::RecognitionSession;
use crate::core::transport::{
    ConnectRequest, SpeechTransport, WsTransport, DEFAULT_CONNECT_TIMEOUT,
};
use crate::errors::AsrResult;

/// Sample rate the backend decodes at; higher host rates are clamped.
pub const NATIVE_SAMPLE_RATE: u32 = 16000;

/// Process-wide recognition engine.
pub struct RecognitionEngine {
    config: SharedConfig,
}

impl RecognitionEngine {
    /// Create an engine with a validated configuration.
    pub fn new(config: EngineConfig) -> AsrResult<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(RwLock::new(config)),
        })
    }

    /// Handle to the shared configuration (sessions hold clones).
    pub fn config(&self) -> SharedConfig {
        self.config.clone()
    }

    /// Swap in a new configuration. Serialized against concurrent readers;
    /// already-open sessions keep their connections.
    pub fn reload(&self, config: EngineConfig) -> AsrResult<()> {
        config.validate()?;
        *self.config.write() = config;
        info!("engine configuration reloaded");
        Ok(())
    }

    /// Open a recognition session.
    ///
    /// `destination` overrides the configured backend endpoint for this
    /// session. The codec hint is normalized to L16 and sample rates above
    /// 16 kHz are clamped, matching what the backend decodes.
    ///
    /// # Errors
    /// [`crate::AsrError::ConnectionFailed`] if the WebSocket handshake
    /// fails or exceeds the 30 s bound; [`crate::AsrError::Configuration`]
    /// for an invalid destination URL.
    pub async fn open(
        &self,
        codec_hint: &str,
        sample_rate: u32,
        destination: Option<&str>,
    ) -> AsrResult<RecognitionSession> {
        let url = match destination {
            Some(dest) => dest.to_string(),
            None => self.config.read().server_url.clone(),
        };
        let request = ConnectRequest::new(url);

        info!(
            codec = codec_hint,
            rate = sample_rate,
            dest = %request.url,
            "opening recognition session"
        );
        if !codec_hint.eq_ignore_ascii_case("L16") {
            debug!("codec hint {codec_hint} normalized to L16");
        }

        let transport = WsTransport::connect(&request, DEFAULT_CONNECT_TIMEOUT).await?;
        Ok(self.build_session(sample_rate, Box::new(transport)))
    }

    /// Open a session over a caller-supplied transport. Used for custom
    /// wire implementations and by tests.
    pub fn open_with_transport(
        &self,
        sample_rate: u32,
        transport: Box<dyn SpeechTransport>,
    ) -> RecognitionSession {
        self.build_session(sample_rate, transport)
    }

    fn build_session(
        &self,
        sample_rate: u32,
        transport: Box<dyn SpeechTransport>,
    ) -> RecognitionSession {
        let rate = sample_rate.min(NATIVE_SAMPLE_RATE);
        let channel_id = Uuid::new_v4().to_string();
        debug!(channel = %channel_id, rate, "recognition session opened");
        RecognitionSession::new(channel_id, rate, transport, self.config.clone())
    }
}
