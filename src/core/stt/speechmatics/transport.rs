//! Bidirectional channel to the transcription service.
//!
//! The session only sees two seams: [`TransportConnector`] opens a channel,
//! [`TranscriptionTransport`] sends on it. Inbound traffic arrives as parsed
//! [`ServerEvent`]s on an mpsc receiver, so tests can script both sides
//! without a socket.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite};
use tracing::{debug, error, info, warn};

use super::config::ConnectionConfig;
use super::messages::{EndOfStreamMessage, ServerEvent, StartRecognitionMessage};
use crate::core::stt::base::STTError;

/// Per-message idle timeout for WebSocket message reception.
/// Resets after each successful message. Catches stuck/dead connections.
const WS_MESSAGE_TIMEOUT: Duration = Duration::from_secs(60);

/// Capacity of the inbound event channel.
const EVENT_CHANNEL_CAPACITY: usize = 64;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// =============================================================================
// Seams
// =============================================================================

/// Messages the client sends to the service.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    StartRecognition(StartRecognitionMessage),
    /// Raw PCM frame, sent as a binary message
    Audio(Bytes),
    EndOfStream(EndOfStreamMessage),
}

impl OutboundMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::StartRecognition(_) => "StartRecognition",
            Self::Audio(_) => "Audio",
            Self::EndOfStream(_) => "EndOfStream",
        }
    }
}

/// Sending half of an open session channel.
#[async_trait]
pub trait TranscriptionTransport: Send {
    async fn send(&mut self, message: OutboundMessage) -> Result<(), STTError>;

    /// Close the channel. Safe to call more than once.
    async fn close(&mut self);
}

/// An open channel: the sending half plus the inbound event stream.
pub struct TransportChannel {
    pub transport: Box<dyn TranscriptionTransport>,
    pub events: mpsc::Receiver<ServerEvent>,
}

impl std::fmt::Debug for TransportChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportChannel").finish_non_exhaustive()
    }
}

/// Opens transport channels for sessions.
#[async_trait]
pub trait TransportConnector: Send + Sync {
    /// # Errors
    /// [`STTError::AuthenticationFailure`] when the service rejects the
    /// credential during the handshake, [`STTError::ConnectionFailure`] for
    /// every other failure.
    async fn connect(&self, config: &ConnectionConfig) -> Result<TransportChannel, STTError>;
}

// =============================================================================
// WebSocket Implementation
// =============================================================================

/// Connector for the real-time WebSocket API.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TransportConnector for WebSocketConnector {
    async fn connect(&self, config: &ConnectionConfig) -> Result<TransportChannel, STTError> {
        let mut request = config.endpoint().into_client_request().map_err(|e| {
            STTError::ConnectionFailure(format!("Failed to create WebSocket request: {e}"))
        })?;

        let auth = HeaderValue::from_str(&config.authorization_header()).map_err(|_| {
            STTError::InvalidConfig("API key contains invalid header characters".to_string())
        })?;
        request.headers_mut().insert("Authorization", auth);

        debug!("Connecting to Speechmatics: {}", config.endpoint());

        let (ws_stream, response) = connect_async(request).await.map_err(map_handshake_error)?;
        info!(
            "Connected to Speechmatics STT WebSocket (status: {})",
            response.status()
        );

        let (sink, stream) = ws_stream.split();
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let reader = tokio::spawn(read_events(stream, events_tx));

        Ok(TransportChannel {
            transport: Box::new(WebSocketTransport {
                sink: Some(sink),
                reader: Some(reader),
            }),
            events: events_rx,
        })
    }
}

fn map_handshake_error(e: tungstenite::Error) -> STTError {
    match e {
        tungstenite::Error::Http(response) => {
            let status = response.status();
            if status.as_u16() == 401 || status.as_u16() == 403 {
                STTError::AuthenticationFailure(format!(
                    "Speechmatics rejected the credential (HTTP {status})"
                ))
            } else {
                STTError::ConnectionFailure(format!(
                    "Speechmatics handshake failed (HTTP {status})"
                ))
            }
        }
        other => STTError::ConnectionFailure(format!("Failed to connect to Speechmatics: {other}")),
    }
}

/// Reader task: parses inbound frames until the socket ends.
///
/// Always finishes by emitting [`ServerEvent::ConnectionClosed`] unless the
/// receiving side is already gone.
async fn read_events(mut stream: SplitStream<WsStream>, events_tx: mpsc::Sender<ServerEvent>) {
    let close_reason = loop {
        match timeout(WS_MESSAGE_TIMEOUT, stream.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => {
                debug!("Received Speechmatics message: {}", text.as_str());
                match ServerEvent::parse(text.as_str()) {
                    Ok(event) => {
                        if events_tx.send(event).await.is_err() {
                            debug!("Event receiver dropped, stopping reader");
                            return;
                        }
                    }
                    Err(e) => warn!("Failed to parse Speechmatics message: {}", e),
                }
            }
            Ok(Some(Ok(Message::Close(frame)))) => {
                info!("Speechmatics WebSocket closed: {:?}", frame);
                break frame
                    .map(|f| f.reason.as_str().to_string())
                    .filter(|reason| !reason.is_empty());
            }
            Ok(Some(Ok(Message::Binary(_)))) => {
                debug!("Received unexpected binary message from Speechmatics");
            }
            Ok(Some(Ok(_))) => {}
            Ok(Some(Err(e))) => {
                error!("Speechmatics WebSocket error: {}", e);
                break Some(format!("WebSocket error: {e}"));
            }
            Ok(None) => {
                info!("Speechmatics WebSocket stream ended");
                break None;
            }
            Err(_elapsed) => {
                error!("Speechmatics STT idle timeout - no message for 60 seconds");
                break Some("WebSocket idle timeout".to_string());
            }
        }
    };

    let _ = events_tx.send(ServerEvent::ConnectionClosed(close_reason)).await;
}

/// Sending half of a WebSocket session.
pub struct WebSocketTransport {
    sink: Option<SplitSink<WsStream, Message>>,
    reader: Option<JoinHandle<()>>,
}

#[async_trait]
impl TranscriptionTransport for WebSocketTransport {
    async fn send(&mut self, message: OutboundMessage) -> Result<(), STTError> {
        let sink = self.sink.as_mut().ok_or_else(|| {
            STTError::StreamingFailure("WebSocket connection already closed".to_string())
        })?;

        let kind = message.kind();
        let frame = match message {
            OutboundMessage::Audio(data) => Message::Binary(data),
            OutboundMessage::StartRecognition(msg) => Message::Text(to_json(&msg)?.into()),
            OutboundMessage::EndOfStream(msg) => Message::Text(to_json(&msg)?.into()),
        };

        sink.send(frame)
            .await
            .map_err(|e| STTError::StreamingFailure(format!("Failed to send {kind}: {e}")))
    }

    async fn close(&mut self) {
        if let Some(mut sink) = self.sink.take() {
            if let Err(e) = sink.send(Message::Close(None)).await {
                debug!("Close frame not sent: {}", e);
            }
            let _ = sink.close().await;
            info!("Speechmatics STT WebSocket connection closed");
        }
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

fn to_json<T: serde::Serialize>(msg: &T) -> Result<String, STTError> {
    serde_json::to_string(msg)
        .map_err(|e| STTError::StreamingFailure(format!("Failed to serialize message: {e}")))
}
