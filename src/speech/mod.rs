//! Streaming text-to-speech: turns one text input into one WAV container.

pub mod assembler;
pub mod protocol;
#[cfg(not(target_arch = "wasm32"))]
mod socket;
pub mod wav;

use std::time::Duration;
use thiserror::Error;

pub use assembler::{ExchangeState, SpeechExchange, Step};
#[cfg(not(target_arch = "wasm32"))]
pub use socket::{speak, synthesize, SpokenAudio};
pub use wav::AudioContainer;

pub const DEFAULT_ENDPOINT: &str = "wss://us.api.gradium.ai/api/speech/tts";
pub const DEFAULT_VOICE_ID: &str = "YTpq7expH9539ERJ";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("TTS credential not set (GRADIUM_API_KEY)")]
    MissingCredential,
    #[error("Invalid TTS configuration: {0}")]
    InvalidConfig(String),
    #[error("TTS transport error: {0}")]
    Transport(String),
    #[error("TTS protocol error: {0}")]
    Protocol(String),
    #[error("TTS service error: {0}")]
    Server(String),
    #[error("TTS channel closed before any audio arrived")]
    ClosedEarly,
    #[error("TTS exchange already finished")]
    AlreadyFinished,
    #[error("TTS timed out after {0:?}")]
    Timeout(Duration),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Connection settings for the speech collaborator.
#[derive(Debug, Clone)]
pub struct SpeechConfig {
    pub api_key: Option<String>,
    pub endpoint: String,
    pub voice_id: String,
    /// Upper bound on one whole exchange.
    pub timeout: Duration,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        SpeechConfig {
            api_key: None,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            voice_id: DEFAULT_VOICE_ID.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl SpeechConfig {
    /// Reads `GRADIUM_API_KEY`, `GRADIUM_TTS_URL` and `GRADIUM_VOICE_ID`.
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        let defaults = SpeechConfig::default();
        SpeechConfig {
            api_key: var("GRADIUM_API_KEY"),
            endpoint: var("GRADIUM_TTS_URL").unwrap_or(defaults.endpoint),
            voice_id: var("GRADIUM_VOICE_ID").unwrap_or(defaults.voice_id),
            timeout: defaults.timeout,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.credential().is_some()
    }

    pub(crate) fn credential(&self) -> Option<&str> {
        self.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty())
    }
}
