//! WebSocket Mock Server for the Speechmatics real-time API

use super::{MockBehavior, MockStats};
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;

/// Running mock server; aborted on drop
pub struct MockSpeechmaticsServer {
    pub addr: SocketAddr,
    pub stats: Arc<MockStats>,
    handle: JoinHandle<()>,
}

impl MockSpeechmaticsServer {
    /// Loopback endpoint the client should connect to
    pub fn endpoint(&self) -> String {
        format!("ws://{}/v2", self.addr)
    }
}

impl Drop for MockSpeechmaticsServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Bind an ephemeral port and serve every connection with `behavior`
pub async fn start_speechmatics_mock(
    behavior: MockBehavior,
) -> Result<MockSpeechmaticsServer, Box<dyn std::error::Error>> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let stats = Arc::new(MockStats::default());

    let server_stats = stats.clone();
    let handle = tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            let stats = server_stats.clone();
            let behavior = behavior.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, behavior, stats).await {
                    eprintln!("Speechmatics mock connection error: {}", e);
                }
            });
        }
    });

    Ok(MockSpeechmaticsServer {
        addr,
        stats,
        handle,
    })
}

/// Handle a single WebSocket connection (Speechmatics RT v2 style)
async fn handle_connection(
    stream: TcpStream,
    behavior: MockBehavior,
    stats: Arc<MockStats>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    stats.connections.fetch_add(1, Ordering::SeqCst);

    let reject = matches!(behavior, MockBehavior::RejectHandshake);
    let header_stats = stats.clone();
    let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        if let Some(auth) = req
            .headers()
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
        {
            header_stats
                .authorization_headers
                .lock()
                .push(auth.to_string());
        }
        if reject {
            let mut error = ErrorResponse::new(Some("Unauthorized".to_string()));
            *error.status_mut() = StatusCode::UNAUTHORIZED;
            return Err(error);
        }
        Ok(resp)
    };

    let ws_stream = accept_hdr_async(stream, callback).await?;
    let (mut write, mut read) = ws_stream.split();

    while let Some(msg) = read.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                let Ok(msg) = serde_json::from_str::<Value>(text.as_str()) else {
                    continue;
                };
                match msg.get("message").and_then(|m| m.as_str()) {
                    Some("StartRecognition") => {
                        stats.start_messages.lock().push(msg.clone());

                        if matches!(behavior, MockBehavior::AuthError) {
                            let error = json!({
                                "message": "Error",
                                "type": "not_authorised",
                                "code": 4001,
                                "reason": "Invalid API key"
                            });
                            write.send(Message::Text(error.to_string().into())).await?;
                            write.send(Message::Close(None)).await?;
                            break;
                        }

                        let started = json!({
                            "message": "RecognitionStarted",
                            "id": format!("mock-session-{}", stats.connections.load(Ordering::SeqCst)),
                        });
                        write.send(Message::Text(started.to_string().into())).await?;
                    }
                    Some("EndOfStream") => {
                        *stats.last_seq_no.lock() = msg.get("last_seq_no").and_then(|n| n.as_u64());

                        if let MockBehavior::Transcribe(segments) = &behavior {
                            for segment in segments {
                                let transcript = json!({
                                    "message": "AddTranscript",
                                    "format": "2.9",
                                    "metadata": {
                                        "start_time": 0.0,
                                        "end_time": 1.0,
                                        "transcript": segment,
                                    },
                                    "results": [],
                                });
                                write.send(Message::Text(transcript.to_string().into())).await?;
                            }
                            let end = json!({ "message": "EndOfTranscript" });
                            write.send(Message::Text(end.to_string().into())).await?;
                        }
                    }
                    _ => {}
                }
            }
            Ok(Message::Binary(audio)) => {
                let seq_no = stats.audio_frames.fetch_add(1, Ordering::SeqCst) + 1;
                stats
                    .audio_bytes
                    .fetch_add(audio.len() as u64, Ordering::SeqCst);
                let added = json!({ "message": "AudioAdded", "seq_no": seq_no });
                write.send(Message::Text(added.to_string().into())).await?;
            }
            Ok(Message::Close(_)) => break,
            Ok(Message::Ping(data)) => {
                write.send(Message::Pong(data)).await?;
            }
            Err(e) => {
                eprintln!("WebSocket error: {}", e);
                break;
            }
            _ => {}
        }
    }

    Ok(())
}
