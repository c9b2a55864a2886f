//! Lifecycle of one transcription session.
//!
//! ```text
//! Idle -> Connecting -> Configuring -> Streaming -> AwaitingFinal -> Closed
//! ```
//!
//! A [`SessionController`] is consumed by [`SessionController::run`], so a
//! session can never be reused. Audio is sent from the calling task while a
//! spawned pump feeds inbound events through the [`EventRouter`]. The
//! transport is closed and the pump stopped before `run` returns, whatever
//! the outcome.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use super::config::ConnectionConfig;
use super::context::{Availability, PendingSignals, SessionContext, SessionResult};
use super::messages::{EndOfStreamMessage, ServerEvent};
use super::router::{EventRouter, ResolutionPolicy};
use super::transport::{OutboundMessage, TranscriptionTransport, TransportChannel, TransportConnector};
use crate::core::stt::base::STTError;

/// Default bound for opening the connection
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default bound for the start confirmation
pub const DEFAULT_SESSION_START_TIMEOUT: Duration = Duration::from_secs(10);

/// Default bound for the final result after the audio ends
pub const DEFAULT_FINAL_RESULT_TIMEOUT: Duration = Duration::from_secs(10);

// =============================================================================
// State
// =============================================================================

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    Success,
    Error,
    Timeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Configuring,
    Streaming,
    AwaitingFinal,
    Closed(CloseReason),
}

impl SessionState {
    #[inline]
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed(_))
    }
}

/// Timer bounds for one session. Each fires at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTimeouts {
    pub connect: Duration,
    pub session_start: Duration,
    pub final_result: Duration,
}

impl Default for SessionTimeouts {
    fn default() -> Self {
        Self {
            connect: DEFAULT_CONNECT_TIMEOUT,
            session_start: DEFAULT_SESSION_START_TIMEOUT,
            final_result: DEFAULT_FINAL_RESULT_TIMEOUT,
        }
    }
}

/// Terminal summary of a session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionReport {
    /// Always a `Closed` state
    pub state: SessionState,
    pub result: SessionResult,
    /// Server-assigned id, when the session got that far
    pub session_id: Option<String>,
    /// Number of audio frames sent
    pub chunks_sent: u64,
    pub last_error: Option<STTError>,
}

// =============================================================================
// Controller
// =============================================================================

/// Owns one connection from open to close.
pub struct SessionController {
    config: ConnectionConfig,
    connector: Arc<dyn TransportConnector>,
    availability: Availability,
    router: EventRouter,
    timeouts: SessionTimeouts,
    state: SessionState,
    session_id: Option<String>,
    chunks_sent: u64,
}

impl SessionController {
    pub fn new(
        config: ConnectionConfig,
        connector: Arc<dyn TransportConnector>,
        availability: Availability,
    ) -> Self {
        Self {
            config,
            connector,
            availability,
            router: EventRouter::default(),
            timeouts: SessionTimeouts::default(),
            state: SessionState::Idle,
            session_id: None,
            chunks_sent: 0,
        }
    }

    pub fn with_timeouts(mut self, timeouts: SessionTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_policy(mut self, policy: ResolutionPolicy) -> Self {
        self.router = EventRouter::new(policy);
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Run the session to completion over a finite audio stream.
    ///
    /// Never fails: every outcome, including timeouts, is carried in the
    /// returned [`SessionReport`].
    pub async fn run<S>(mut self, audio: S) -> SessionReport
    where
        S: Stream<Item = Bytes> + Send,
    {
        self.transition(SessionState::Connecting);

        let connect = timeout(self.timeouts.connect, self.connector.connect(&self.config)).await;
        let TransportChannel {
            mut transport,
            events,
        } = match connect {
            Ok(Ok(channel)) => channel,
            Ok(Err(e)) => {
                if e.is_authentication_failure() {
                    self.availability.mark_unavailable();
                }
                error!("Failed to connect to Speechmatics: {}", e);
                return self.finish(Err(e), None);
            }
            Err(_) => {
                let e = STTError::ConnectionFailure(format!(
                    "Connection timed out after {:?}",
                    self.timeouts.connect
                ));
                error!("{}", e);
                return self.finish(Err(e), None);
            }
        };

        let (ctx, pending) = SessionContext::new(self.router.policy(), self.availability.clone());
        let ctx = Arc::new(ctx);
        let pump = tokio::spawn(pump_events(self.router, events, ctx.clone()));

        let result = self.drive(transport.as_mut(), &ctx, pending, audio).await;

        transport.close().await;
        pump.abort();

        let last_error = ctx.last_error();
        self.finish(result, last_error)
    }

    async fn drive<S>(
        &mut self,
        transport: &mut dyn TranscriptionTransport,
        ctx: &SessionContext,
        pending: PendingSignals,
        audio: S,
    ) -> SessionResult
    where
        S: Stream<Item = Bytes> + Send,
    {
        let PendingSignals {
            mut result,
            mut started,
        } = pending;

        // Configuring
        self.transition(SessionState::Configuring);
        let start = OutboundMessage::StartRecognition(self.config.start_recognition_message());
        if let Err(e) = transport.send(start).await {
            ctx.record_error(e.clone());
            ctx.cancel();
            return Err(e);
        }

        let confirmation = timeout(self.timeouts.session_start, async {
            tokio::select! {
                id = &mut started => StartOutcome::Started(id.ok().flatten()),
                resolved = &mut result => StartOutcome::Resolved(flatten(resolved)),
            }
        })
        .await;

        match confirmation {
            Ok(StartOutcome::Started(id)) => self.session_id = id,
            Ok(StartOutcome::Resolved(outcome)) => {
                warn!("Session resolved before recognition started");
                return match outcome {
                    Err(e) => Err(e),
                    Ok(_) => {
                        let e = STTError::StreamingFailure(
                            "Transcript received before recognition started".to_string(),
                        );
                        ctx.record_error(e.clone());
                        Err(e)
                    }
                };
            }
            Err(_) => {
                warn!("Timed out waiting for RecognitionStarted");
                ctx.record_error(STTError::SessionStartTimeout);
                ctx.cancel();
                return Err(STTError::SessionStartTimeout);
            }
        }

        // Streaming
        self.transition(SessionState::Streaming);
        let chunk_size = self.config.chunk_size();
        let mut early: Option<SessionResult> = None;
        let mut audio = std::pin::pin!(audio);

        loop {
            if matches!(early, Some(Err(_))) {
                warn!("Session failed during streaming, stopping audio");
                break;
            }

            let next = if early.is_some() {
                audio.next().await
            } else {
                tokio::select! {
                    biased;
                    resolved = &mut result => {
                        early = Some(flatten(resolved));
                        continue;
                    }
                    next = audio.next() => next,
                }
            };

            let Some(chunk) = next else {
                break;
            };

            if chunk.is_empty() {
                debug!("Skipping empty audio chunk");
                continue;
            }

            for frame in split_frames(chunk, chunk_size) {
                let len = frame.len();
                if let Err(e) = transport.send(OutboundMessage::Audio(frame)).await {
                    error!("Failed to stream audio: {}", e);
                    ctx.record_error(e.clone());
                    if ctx.cancel() {
                        return Err(e);
                    }
                    // Already resolved; the fixed result stands
                    return match early {
                        Some(outcome) => outcome,
                        None => flatten(result.await),
                    };
                }
                self.chunks_sent += 1;
                debug!("Sent {} bytes of audio (seq {})", len, self.chunks_sent);
            }
        }

        if let Some(Err(e)) = early {
            return Err(e);
        }

        let end = OutboundMessage::EndOfStream(EndOfStreamMessage::new(self.chunks_sent));
        if let Err(e) = transport.send(end).await {
            if early.is_some() || ctx.is_resolved() {
                warn!("Failed to send EndOfStream after resolution: {}", e);
            } else {
                ctx.record_error(e.clone());
                ctx.cancel();
                return Err(e);
            }
        }

        // AwaitingFinal
        self.transition(SessionState::AwaitingFinal);
        if let Some(outcome) = early {
            return outcome;
        }

        match timeout(self.timeouts.final_result, &mut result).await {
            Ok(resolved) => flatten(resolved),
            Err(_) => {
                ctx.cancel();
                if self.chunks_sent == 0 {
                    warn!("No audio sent and no transcript received");
                    Err(STTError::EmptyResult)
                } else {
                    warn!("Timed out waiting for final transcript");
                    ctx.record_error(STTError::TranscriptionTimeout);
                    Err(STTError::TranscriptionTimeout)
                }
            }
        }
    }

    fn transition(&mut self, next: SessionState) {
        debug!("Session state {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    fn finish(mut self, result: SessionResult, last_error: Option<STTError>) -> SessionReport {
        let result = match result {
            Ok(text) if text.trim().is_empty() => Err(STTError::EmptyResult),
            other => other,
        };

        let reason = match &result {
            Ok(_) => CloseReason::Success,
            Err(STTError::TranscriptionTimeout) => CloseReason::Timeout,
            Err(_) => CloseReason::Error,
        };
        self.transition(SessionState::Closed(reason));

        match &result {
            Ok(text) => info!(
                "Speechmatics session closed with transcript ({} chars)",
                text.len()
            ),
            Err(e) => info!("Speechmatics session closed with error: {}", e),
        }

        let last_error = last_error.or_else(|| result.as_ref().err().cloned());
        SessionReport {
            state: self.state,
            result,
            session_id: self.session_id.take(),
            chunks_sent: self.chunks_sent,
            last_error,
        }
    }
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("config", &self.config)
            .field("router", &self.router)
            .field("timeouts", &self.timeouts)
            .field("state", &self.state)
            .field("chunks_sent", &self.chunks_sent)
            .finish_non_exhaustive()
    }
}

enum StartOutcome {
    Started(Option<String>),
    Resolved(SessionResult),
}

/// Drain inbound events into the router until the channel ends.
async fn pump_events(
    router: EventRouter,
    mut events: mpsc::Receiver<ServerEvent>,
    ctx: Arc<SessionContext>,
) {
    while let Some(event) = events.recv().await {
        debug!("Dispatching {} event", event.kind());
        router.dispatch(event, &ctx);
    }
    // Sender gone without a close event
    router.dispatch(ServerEvent::ConnectionClosed(None), &ctx);
}

fn flatten(resolved: Result<SessionResult, oneshot::error::RecvError>) -> SessionResult {
    resolved.unwrap_or_else(|_| {
        Err(STTError::StreamingFailure(
            "Session result was cancelled".to_string(),
        ))
    })
}

/// Split one producer chunk into frames of at most `max` bytes.
///
/// Frames share the chunk's buffer; chunks are never merged.
fn split_frames(chunk: Bytes, max: usize) -> impl Iterator<Item = Bytes> {
    let len = chunk.len();
    (0..len)
        .step_by(max.max(1))
        .map(move |start| chunk.slice(start..(start + max).min(len)))
}
