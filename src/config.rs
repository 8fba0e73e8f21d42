//! Engine configuration.
//!
//! The recognition engine carries one process-wide configuration: the
//! transcription backend endpoint and the result formatting switch. The
//! host loads it however it likes (its own config files, an init hook) and
//! hands it to [`crate::engine::RecognitionEngine`]; environment variables
//! override the defaults when using [`EngineConfig::from_env`].
//!
//! The configuration is read-only after load except during an explicit
//! reload, which is serialized against concurrent readers by the shared
//! `RwLock` (see [`SharedConfig`]).

use std::env;
use std::sync::Arc;

use parking_lot::RwLock;
use url::Url;

use crate::errors::{AsrError, AsrResult};

/// Default backend endpoint when the host configures nothing else.
pub const DEFAULT_SERVER_URL: &str = "ws://127.0.0.1:2700";

/// Environment variable overriding the backend endpoint.
pub const ENV_SERVER_URL: &str = "SPEECHWIRE_SERVER_URL";

/// Environment variable overriding the result formatting switch.
pub const ENV_RETURN_JSON: &str = "SPEECHWIRE_RETURN_JSON";

/// Process-wide engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Transcription backend endpoint (`ws://` or `wss://`).
    pub server_url: String,

    /// When true, results render as a JSON object; when false, as the bare
    /// transcript text.
    pub return_json: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            return_json: false,
        }
    }
}

impl EngineConfig {
    /// Build a configuration from defaults with environment overrides.
    ///
    /// Reads `SPEECHWIRE_SERVER_URL` and `SPEECHWIRE_RETURN_JSON`, then
    /// validates the result.
    ///
    /// # Errors
    /// Returns [`AsrError::Configuration`] if the resulting endpoint is not
    /// a valid `ws://`/`wss://` URL.
    pub fn from_env() -> AsrResult<Self> {
        let mut config = Self::default();

        if let Ok(value) = env::var(ENV_SERVER_URL) {
            if !value.is_empty() {
                config.server_url = value;
            }
        }
        if let Ok(value) = env::var(ENV_RETURN_JSON) {
            config.return_json = parse_bool(&value);
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the endpoint URL.
    ///
    /// # Errors
    /// Returns [`AsrError::Configuration`] for unparseable URLs, schemes
    /// other than `ws`/`wss`, or a missing host.
    pub fn validate(&self) -> AsrResult<()> {
        let url = Url::parse(&self.server_url).map_err(|e| {
            AsrError::Configuration(format!("invalid backend url {}: {e}", self.server_url))
        })?;

        match url.scheme() {
            "ws" | "wss" => {}
            other => {
                return Err(AsrError::Configuration(format!(
                    "unsupported backend url scheme {other} (expected ws or wss)"
                )));
            }
        }
        if url.host_str().is_none() {
            return Err(AsrError::Configuration(format!(
                "backend url {} has no host",
                self.server_url
            )));
        }

        Ok(())
    }
}

/// Shared handle to the engine configuration.
///
/// Sessions hold a clone of this handle; a reload swaps the value under the
/// write lock while readers take short read locks.
pub type SharedConfig = Arc<RwLock<EngineConfig>>;

/// Truthiness parsing for configuration and parameter values.
pub(crate) fn parse_bool(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "true" | "t" | "yes" | "y" | "on" | "enabled" | "1"
    )
}
