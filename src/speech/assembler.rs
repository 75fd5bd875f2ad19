//! State machine for one streaming synthesis exchange.
//!
//! `setup → ready → text + end_of_stream → audio* → end_of_stream`. The machine
//! is transport-agnostic: the socket driver feeds it server payloads and close
//! notifications and forwards whatever it asks to send.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use super::protocol::{ClientMessage, ServerMessage};
use super::wav::AudioContainer;
use super::SpeechError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    /// Setup sent, waiting for the server's `ready`.
    AwaitingReady,
    /// Text submitted, collecting audio frames.
    Streaming,
    /// A container was produced or the exchange failed; later input is ignored.
    Finished,
}

/// What the driver should do after feeding a server message.
#[derive(Debug, PartialEq, Eq)]
pub enum Step {
    Send(Vec<ClientMessage>),
    Continue,
    Done(AudioContainer),
}

pub struct SpeechExchange {
    text: String,
    state: ExchangeState,
    frames: Vec<Vec<u8>>,
}

impl SpeechExchange {
    pub fn new(text: &str) -> Self {
        SpeechExchange {
            text: text.to_string(),
            state: ExchangeState::AwaitingReady,
            frames: Vec::new(),
        }
    }

    pub fn state(&self) -> ExchangeState {
        self.state
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Feeds one server payload. Non-JSON input is a protocol violation.
    pub fn on_text(&mut self, raw: &str) -> Result<Step, SpeechError> {
        if self.state == ExchangeState::Finished {
            return Ok(Step::Continue);
        }

        let message: ServerMessage = serde_json::from_str(raw).map_err(|e| {
            self.state = ExchangeState::Finished;
            SpeechError::Protocol(format!("malformed control message: {}", e))
        })?;

        match message {
            ServerMessage::Ready => {
                if self.state != ExchangeState::AwaitingReady {
                    return Ok(Step::Continue);
                }
                self.state = ExchangeState::Streaming;
                Ok(Step::Send(vec![
                    ClientMessage::Text {
                        text: self.text.clone(),
                    },
                    ClientMessage::EndOfStream,
                ]))
            }
            ServerMessage::Audio { audio } => {
                let Some(encoded) = audio.filter(|a| !a.is_empty()) else {
                    return Ok(Step::Continue);
                };
                let frame = STANDARD.decode(encoded.as_bytes()).map_err(|e| {
                    self.state = ExchangeState::Finished;
                    SpeechError::Protocol(format!("audio frame is not valid base64: {}", e))
                })?;
                self.frames.push(frame);
                Ok(Step::Continue)
            }
            ServerMessage::EndOfStream => Ok(Step::Done(self.finish())),
            ServerMessage::Error { message } => {
                self.state = ExchangeState::Finished;
                Err(SpeechError::Server(
                    message.unwrap_or_else(|| "TTS service error".to_string()),
                ))
            }
            ServerMessage::Other => Ok(Step::Continue),
        }
    }

    /// The channel closed. Emits a best-effort container if any audio arrived.
    pub fn on_close(&mut self) -> Result<AudioContainer, SpeechError> {
        match self.state {
            ExchangeState::Finished => Err(SpeechError::AlreadyFinished),
            _ if self.frames.is_empty() => {
                self.state = ExchangeState::Finished;
                Err(SpeechError::ClosedEarly)
            }
            _ => Ok(self.finish()),
        }
    }

    fn finish(&mut self) -> AudioContainer {
        self.state = ExchangeState::Finished;
        let pcm: Vec<u8> = std::mem::take(&mut self.frames).concat();
        AudioContainer::from_pcm(&pcm)
    }
}
