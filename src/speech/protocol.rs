//! JSON control messages exchanged with the streaming TTS service.

use serde::{Deserialize, Serialize};

/// Messages the client sends, in order: `setup`, then `text` and `end_of_stream` once `ready` arrives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Setup {
        voice_id: String,
        model_name: String,
        output_format: String,
    },
    Text {
        text: String,
    },
    EndOfStream,
}

impl ClientMessage {
    /// Session setup asking for raw PCM from the given voice.
    pub fn setup(voice_id: &str) -> Self {
        ClientMessage::Setup {
            voice_id: voice_id.to_string(),
            model_name: "default".to_string(),
            output_format: "pcm".to_string(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Ready,
    /// One base64 chunk of 16-bit mono PCM.
    Audio {
        #[serde(default)]
        audio: Option<String>,
    },
    EndOfStream,
    Error {
        #[serde(default)]
        message: Option<String>,
    },
    /// Anything else the server sends is ignored.
    #[serde(other)]
    Other,
}
