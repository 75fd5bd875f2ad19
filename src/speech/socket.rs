//! WebSocket driver for [`SpeechExchange`] (native targets only).

use std::io::ErrorKind;

use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use super::assembler::{SpeechExchange, Step};
use super::protocol::ClientMessage;
use super::wav::AudioContainer;
use super::{SpeechConfig, SpeechError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

impl From<tungstenite::Error> for SpeechError {
    fn from(e: tungstenite::Error) -> Self {
        SpeechError::Transport(e.to_string())
    }
}

/// Synthesizes `text` into one WAV container.
///
/// Fails with [`SpeechError::MissingCredential`] before any connection is made
/// when no API key is configured. A timeout after audio has started keeps the
/// frames received so far. The socket is closed on every exit path;
/// dropping the returned future also drops (and so closes) the socket.
pub async fn synthesize(text: &str, config: &SpeechConfig) -> Result<AudioContainer, SpeechError> {
    let api_key = config.credential().ok_or(SpeechError::MissingCredential)?;

    let mut request = config.endpoint.as_str().into_client_request()?;
    let key = HeaderValue::from_str(api_key)
        .map_err(|e| SpeechError::InvalidConfig(format!("API key is not a valid header value: {}", e)))?;
    request.headers_mut().insert("x-api-key", key);

    debug!("Opening TTS channel to {}", config.endpoint);
    let (mut socket, _) = tokio_tungstenite::connect_async(request).await?;

    let mut exchange = SpeechExchange::new(text);
    let bounded = tokio::time::timeout(
        config.timeout,
        run_exchange(&mut socket, &mut exchange, &config.voice_id),
    )
    .await;
    let outcome = match bounded {
        Ok(outcome) => outcome,
        Err(_) if exchange.frame_count() > 0 => {
            warn!(
                "TTS stalled after {} frames; keeping the audio received so far",
                exchange.frame_count()
            );
            exchange.on_close()
        }
        Err(_) => Err(SpeechError::Timeout(config.timeout)),
    };

    if let Err(e) = socket.close(None).await {
        debug!("TTS channel close: {}", e);
    }

    match &outcome {
        Ok(container) => debug!("TTS finished: {} data bytes", container.data_len()),
        Err(e) => warn!("TTS failed: {}", e),
    }
    outcome
}

/// `{audio}` reply for the extension: the WAV container as base64.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpokenAudio {
    pub audio: String,
}

/// Synthesizes `text` and encodes the container for a JSON reply.
pub async fn speak(text: &str, config: &SpeechConfig) -> Result<SpokenAudio, SpeechError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(SpeechError::InvalidConfig("no text to speak".to_string()));
    }
    let container = synthesize(text, config).await?;
    Ok(SpokenAudio {
        audio: container.to_base64(),
    })
}

async fn send(socket: &mut WsStream, message: &ClientMessage) -> Result<(), SpeechError> {
    socket.send(Message::Text(message.to_json()?.into())).await?;
    Ok(())
}

async fn run_exchange(
    socket: &mut WsStream,
    exchange: &mut SpeechExchange,
    voice_id: &str,
) -> Result<AudioContainer, SpeechError> {
    send(socket, &ClientMessage::setup(voice_id)).await?;

    while let Some(frame) = socket.next().await {
        let payload = match frame {
            Ok(Message::Text(text)) => text.as_str().to_string(),
            Ok(Message::Binary(bytes)) => String::from_utf8(bytes.to_vec())
                .map_err(|_| SpeechError::Protocol("binary message is not UTF-8 JSON".to_string()))?,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) if is_close_like(&e) => {
                debug!("TTS channel dropped: {}", e);
                break;
            }
            Err(e) => return Err(e.into()),
        };

        match exchange.on_text(&payload)? {
            Step::Send(messages) => {
                for message in &messages {
                    send(socket, message).await?;
                }
            }
            Step::Continue => {}
            Step::Done(container) => return Ok(container),
        }
    }

    exchange.on_close()
}

fn is_close_like(error: &tungstenite::Error) -> bool {
    match error {
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => true,
        tungstenite::Error::Protocol(ProtocolError::ResetWithoutClosingHandshake) => true,
        tungstenite::Error::Io(io) => matches!(
            io.kind(),
            ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted | ErrorKind::UnexpectedEof | ErrorKind::BrokenPipe
        ),
        _ => false,
    }
}
