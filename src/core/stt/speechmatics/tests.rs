//! Tests for the Speechmatics session core.
//!
//! Sessions run against an in-memory scripted transport that records every
//! outbound message and replies with canned server events.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::*;
use crate::core::stt::base::{
    AudioChannels, AudioCodec, STTError, SpeechMetadata, SpeechResultState, SpeechToTextEntity,
};

// =============================================================================
// Test Doubles
// =============================================================================

/// Canned server behaviour for one connection.
#[derive(Clone, Default)]
struct Script {
    connect_error: Option<STTError>,
    on_start: Vec<ServerEvent>,
    on_first_audio: Vec<ServerEvent>,
    on_end: Vec<ServerEvent>,
    /// 1-based audio frame whose send fails
    fail_audio_at: Option<usize>,
}

impl Script {
    /// Server that confirms the start and answers EndOfStream with `events`.
    fn answering(events: Vec<ServerEvent>) -> Self {
        Self {
            on_start: vec![started()],
            on_end: events,
            ..Default::default()
        }
    }
}

#[derive(Default)]
struct Recorder {
    sent: Mutex<Vec<OutboundMessage>>,
    connects: AtomicUsize,
    closes: AtomicUsize,
}

impl Recorder {
    fn audio_frames(&self) -> Vec<Bytes> {
        self.sent
            .lock()
            .iter()
            .filter_map(|m| match m {
                OutboundMessage::Audio(data) => Some(data.clone()),
                _ => None,
            })
            .collect()
    }

    fn start_message(&self) -> Option<StartRecognitionMessage> {
        self.sent.lock().iter().find_map(|m| match m {
            OutboundMessage::StartRecognition(msg) => Some(msg.clone()),
            _ => None,
        })
    }

    fn last_seq_no(&self) -> Option<u64> {
        self.sent.lock().iter().find_map(|m| match m {
            OutboundMessage::EndOfStream(msg) => Some(msg.last_seq_no),
            _ => None,
        })
    }

    fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

struct ScriptedConnector {
    script: Script,
    recorder: Arc<Recorder>,
}

impl ScriptedConnector {
    fn new(script: Script) -> (Arc<Self>, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        (
            Arc::new(Self {
                script,
                recorder: recorder.clone(),
            }),
            recorder,
        )
    }
}

#[async_trait]
impl TransportConnector for ScriptedConnector {
    async fn connect(&self, _config: &ConnectionConfig) -> Result<TransportChannel, STTError> {
        self.recorder.connects.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = &self.script.connect_error {
            return Err(e.clone());
        }

        let (events_tx, events_rx) = mpsc::channel(64);
        Ok(TransportChannel {
            transport: Box::new(ScriptedTransport {
                events: Some(events_tx),
                script: self.script.clone(),
                recorder: self.recorder.clone(),
                audio_frames: 0,
            }),
            events: events_rx,
        })
    }
}

struct ScriptedTransport {
    events: Option<mpsc::Sender<ServerEvent>>,
    script: Script,
    recorder: Arc<Recorder>,
    audio_frames: usize,
}

impl ScriptedTransport {
    async fn emit(&self, events: Vec<ServerEvent>) {
        if let Some(tx) = &self.events {
            for event in events {
                let _ = tx.send(event).await;
            }
        }
    }
}

#[async_trait]
impl TranscriptionTransport for ScriptedTransport {
    async fn send(&mut self, message: OutboundMessage) -> Result<(), STTError> {
        if self.events.is_none() {
            return Err(STTError::StreamingFailure("closed".to_string()));
        }

        match &message {
            OutboundMessage::StartRecognition(_) => {
                self.recorder.sent.lock().push(message.clone());
                self.emit(self.script.on_start.clone()).await;
            }
            OutboundMessage::Audio(_) => {
                self.audio_frames += 1;
                if self.script.fail_audio_at == Some(self.audio_frames) {
                    return Err(STTError::StreamingFailure("broken pipe".to_string()));
                }
                self.recorder.sent.lock().push(message.clone());
                if self.audio_frames == 1 {
                    self.emit(self.script.on_first_audio.clone()).await;
                }
            }
            OutboundMessage::EndOfStream(_) => {
                self.recorder.sent.lock().push(message.clone());
                self.emit(self.script.on_end.clone()).await;
            }
        }
        Ok(())
    }

    async fn close(&mut self) {
        if self.events.take().is_some() {
            self.recorder.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Connector whose handshake never completes.
struct HangingConnector;

#[async_trait]
impl TransportConnector for HangingConnector {
    async fn connect(&self, _config: &ConnectionConfig) -> Result<TransportChannel, STTError> {
        std::future::pending().await
    }
}

// =============================================================================
// Helpers
// =============================================================================

const API_KEY: &str = "sm-test-key-0123456789";

fn settings() -> ConnectionSettings {
    ConnectionSettings {
        api_key: API_KEY.to_string(),
        ..Default::default()
    }
}

fn fast_timeouts() -> SessionTimeouts {
    SessionTimeouts {
        connect: Duration::from_millis(200),
        session_start: Duration::from_millis(200),
        final_result: Duration::from_millis(200),
    }
}

fn started() -> ServerEvent {
    ServerEvent::RecognitionStarted(messages::RecognitionStartedMessage {
        id: Some("session-123".to_string()),
    })
}

fn audio(chunks: &[&'static [u8]]) -> BoxStream<'static, Bytes> {
    stream::iter(chunks.iter().copied().map(Bytes::from_static).collect::<Vec<_>>()).boxed()
}

/// Audio stream that yields to the scheduler before every chunk, like a
/// live microphone.
fn live_audio(chunks: &[&'static [u8]]) -> BoxStream<'static, Bytes> {
    stream::iter(chunks.iter().copied().map(Bytes::from_static).collect::<Vec<_>>())
        .then(|chunk| async move {
            tokio::task::yield_now().await;
            chunk
        })
        .boxed()
}

fn controller(script: Script) -> (SessionController, Arc<Recorder>, Availability) {
    let (connector, recorder) = ScriptedConnector::new(script);
    let availability = Availability::default();
    let config = ConnectionConfig::new(&settings()).unwrap();
    let controller = SessionController::new(config, connector, availability.clone())
        .with_timeouts(fast_timeouts());
    (controller, recorder, availability)
}

fn entity(script: Script) -> (SpeechmaticsSTT, Arc<Recorder>) {
    let (connector, recorder) = ScriptedConnector::new(script);
    let stt = SpeechmaticsSTT::with_connector(settings(), connector).with_timeouts(fast_timeouts());
    (stt, recorder)
}

// =============================================================================
// Session Controller Tests
// =============================================================================

mod session_tests {
    use super::*;

    #[tokio::test]
    async fn test_final_transcript_resolves_success() {
        let (controller, recorder, _) = controller(Script::answering(vec![
            ServerEvent::final_transcript("turn on the lights"),
        ]));

        let report = controller.run(audio(&[b"\x01\x02", b"\x03\x04"])).await;

        assert_eq!(report.result, Ok("turn on the lights".to_string()));
        assert_eq!(report.state, SessionState::Closed(CloseReason::Success));
        assert_eq!(report.session_id.as_deref(), Some("session-123"));
        assert_eq!(report.chunks_sent, 2);
        assert!(report.last_error.is_none());
        assert_eq!(recorder.closes(), 1);
    }

    #[tokio::test]
    async fn test_no_events_times_out() {
        let (controller, recorder, _) = controller(Script::answering(Vec::new()));

        let report = controller.run(audio(&[b"\x01\x02"])).await;

        assert_eq!(report.result, Err(STTError::TranscriptionTimeout));
        assert_eq!(report.state, SessionState::Closed(CloseReason::Timeout));
        assert!(
            report
                .result
                .unwrap_err()
                .to_string()
                .contains("Timeout waiting for transcription")
        );
        assert_eq!(recorder.closes(), 1);
    }

    #[tokio::test]
    async fn test_malformed_transcript_fails_without_waiting_for_timeout() {
        let malformed =
            ServerEvent::parse(r#"{"message":"AddTranscript","metadata":{"start_time":0.1}}"#)
                .unwrap();
        let (controller, recorder, availability) = controller(Script::answering(vec![malformed]));

        let report = controller.run(audio(&[b"\x01\x02"])).await;

        assert!(matches!(report.result, Err(STTError::EventHandling(_))));
        assert_eq!(report.state, SessionState::Closed(CloseReason::Error));
        assert!(availability.is_available());
        assert_eq!(recorder.closes(), 1);
    }

    #[tokio::test]
    async fn test_auth_error_with_type_and_code_disables_availability() {
        let error = ServerEvent::parse(
            r#"{"message":"Error","type":"not_authorised","code":4001,"reason":"bad key"}"#,
        )
        .unwrap();
        let (controller, _, availability) = controller(Script {
            on_start: vec![error],
            ..Default::default()
        });

        let report = controller.run(audio(&[b"\x01"])).await;

        assert_eq!(
            report.result,
            Err(STTError::AuthenticationFailure("bad key".to_string()))
        );
        assert!(!availability.is_available());
    }

    #[tokio::test]
    async fn test_second_final_does_not_change_result() {
        let (controller, _, _) = controller(Script::answering(vec![
            ServerEvent::final_transcript("turn on the lights"),
            ServerEvent::final_transcript("turn off the lights"),
        ]));

        let report = controller.run(audio(&[b"\x01\x02"])).await;

        assert_eq!(report.result, Ok("turn on the lights".to_string()));
        assert!(report.last_error.is_none());
    }

    #[tokio::test]
    async fn test_audio_order_preserved() {
        let (controller, recorder, _) =
            controller(Script::answering(vec![ServerEvent::final_transcript("ok")]));

        controller.run(audio(&[b"A", b"B", b"C"])).await;

        assert_eq!(
            recorder.audio_frames(),
            vec![
                Bytes::from_static(b"A"),
                Bytes::from_static(b"B"),
                Bytes::from_static(b"C"),
            ]
        );
        assert_eq!(recorder.last_seq_no(), Some(3));
    }

    #[tokio::test]
    async fn test_oversized_chunks_split_and_empty_chunks_skipped() {
        let (connector, recorder) =
            ScriptedConnector::new(Script::answering(vec![ServerEvent::final_transcript("ok")]));
        let config = ConnectionConfig::new(&ConnectionSettings {
            chunk_size: 4,
            ..settings()
        })
        .unwrap();

        let report = SessionController::new(config, connector, Availability::default())
            .with_timeouts(fast_timeouts())
            .run(audio(&[b"0123456789", b"", b"ab"]))
            .await;

        let frames = recorder.audio_frames();
        assert_eq!(
            frames,
            vec![
                Bytes::from_static(b"0123"),
                Bytes::from_static(b"4567"),
                Bytes::from_static(b"89"),
                Bytes::from_static(b"ab"),
            ]
        );
        assert_eq!(report.chunks_sent, 4);
        assert_eq!(recorder.last_seq_no(), Some(4));
    }

    #[tokio::test]
    async fn test_start_message_disables_partials() {
        let (controller, recorder, _) =
            controller(Script::answering(vec![ServerEvent::final_transcript("ok")]));

        controller.run(audio(&[b"\x00\x00"])).await;

        let start = recorder.start_message().unwrap();
        assert_eq!(start.transcription_config.language, "en");
        assert_eq!(start.transcription_config.operating_point, "enhanced");
        assert!(!start.transcription_config.enable_partials);
        assert_eq!(start.audio_format.sample_rate, 16000);
    }

    #[tokio::test]
    async fn test_session_start_timeout() {
        let (controller, recorder, _) = controller(Script::default());

        let report = controller.run(audio(&[b"\x01"])).await;

        assert_eq!(report.result, Err(STTError::SessionStartTimeout));
        assert_eq!(report.state, SessionState::Closed(CloseReason::Error));
        assert_eq!(report.chunks_sent, 0);
        assert!(recorder.audio_frames().is_empty());
        assert_eq!(recorder.closes(), 1);
    }

    #[tokio::test]
    async fn test_transcript_before_start_is_streaming_failure() {
        let (controller, recorder, availability) = controller(Script {
            on_start: vec![ServerEvent::final_transcript("too early")],
            ..Default::default()
        });

        let report = controller.run(audio(&[b"\x01"])).await;

        assert_eq!(
            report.result,
            Err(STTError::StreamingFailure(
                "Transcript received before recognition started".to_string()
            ))
        );
        assert_eq!(report.state, SessionState::Closed(CloseReason::Error));
        assert_eq!(report.last_error, report.result.clone().err());
        assert!(availability.is_available());
        assert!(recorder.audio_frames().is_empty());
    }

    #[tokio::test]
    async fn test_error_before_start_ends_session() {
        let (controller, recorder, availability) = controller(Script {
            on_start: vec![ServerEvent::error("quota_exceeded", "Concurrent session limit")],
            ..Default::default()
        });

        let report = controller.run(audio(&[b"\x01"])).await;

        assert_eq!(
            report.result,
            Err(STTError::ProviderError {
                code: "quota_exceeded".to_string(),
                message: "Concurrent session limit".to_string(),
            })
        );
        assert!(availability.is_available());
        assert!(recorder.audio_frames().is_empty());
        assert_eq!(recorder.closes(), 1);
    }

    #[tokio::test]
    async fn test_connection_failure() {
        let (controller, recorder, availability) = controller(Script {
            connect_error: Some(STTError::ConnectionFailure("refused".to_string())),
            ..Default::default()
        });

        let report = controller.run(audio(&[b"\x01"])).await;

        assert!(matches!(report.result, Err(STTError::ConnectionFailure(_))));
        assert_eq!(report.state, SessionState::Closed(CloseReason::Error));
        assert!(availability.is_available());
        assert_eq!(recorder.closes(), 0);
    }

    #[tokio::test]
    async fn test_handshake_auth_rejection_disables_availability() {
        let (controller, _, availability) = controller(Script {
            connect_error: Some(STTError::AuthenticationFailure("HTTP 401".to_string())),
            ..Default::default()
        });

        let report = controller.run(audio(&[b"\x01"])).await;

        assert!(matches!(report.result, Err(STTError::AuthenticationFailure(_))));
        assert!(!availability.is_available());
    }

    #[tokio::test]
    async fn test_connect_timeout() {
        let config = ConnectionConfig::new(&settings()).unwrap();
        let report = SessionController::new(config, Arc::new(HangingConnector), Availability::default())
            .with_timeouts(SessionTimeouts {
                connect: Duration::from_millis(50),
                ..fast_timeouts()
            })
            .run(audio(&[b"\x01"]))
            .await;

        assert!(matches!(report.result, Err(STTError::ConnectionFailure(_))));
        assert_eq!(report.state, SessionState::Closed(CloseReason::Error));
    }

    #[tokio::test]
    async fn test_streaming_failure_cancels_pending_result() {
        let (controller, recorder, _) = controller(Script {
            fail_audio_at: Some(2),
            ..Script::answering(vec![ServerEvent::final_transcript("never sent")])
        });

        let report = controller.run(audio(&[b"A", b"B", b"C"])).await;

        assert_eq!(
            report.result,
            Err(STTError::StreamingFailure("broken pipe".to_string()))
        );
        assert_eq!(report.chunks_sent, 1);
        assert_eq!(recorder.last_seq_no(), None);
        assert_eq!(recorder.closes(), 1);
    }

    #[tokio::test]
    async fn test_error_during_streaming_stops_audio() {
        let (controller, recorder, _) = controller(Script {
            on_first_audio: vec![ServerEvent::error("internal_error", "Recognition crashed")],
            ..Script::answering(Vec::new())
        });

        let report = controller
            .run(live_audio(&[b"A", b"B", b"C", b"D", b"E", b"F"]))
            .await;

        assert!(matches!(report.result, Err(STTError::ProviderError { .. })));
        assert!(recorder.audio_frames().len() < 6);
        assert_eq!(recorder.last_seq_no(), None);
    }

    #[tokio::test]
    async fn test_empty_audio_reports_empty_result() {
        let (controller, recorder, _) = controller(Script::answering(Vec::new()));

        let report = controller.run(audio(&[])).await;

        assert_eq!(report.result, Err(STTError::EmptyResult));
        assert_eq!(
            report.result.unwrap_err().to_string(),
            "No transcription received"
        );
        assert_eq!(recorder.last_seq_no(), Some(0));
    }

    #[tokio::test]
    async fn test_end_of_transcript_without_finals_is_empty_result() {
        let (controller, _, _) = controller(Script::answering(vec![ServerEvent::EndOfTranscript]));

        let report = controller.run(audio(&[b"\x01"])).await;

        assert_eq!(report.result, Err(STTError::EmptyResult));
        assert_eq!(report.state, SessionState::Closed(CloseReason::Error));
    }

    #[tokio::test]
    async fn test_end_of_transcript_policy_joins_segments() {
        let (controller, _, _) = controller(Script::answering(vec![
            ServerEvent::final_transcript("turn on"),
            ServerEvent::final_transcript("the kitchen lights"),
            ServerEvent::EndOfTranscript,
        ]));

        let report = controller
            .with_policy(ResolutionPolicy::EndOfTranscript)
            .run(audio(&[b"\x01"]))
            .await;

        assert_eq!(report.result, Ok("turn on the kitchen lights".to_string()));
    }

    #[tokio::test]
    async fn test_connection_closed_before_final() {
        let (controller, _, _) = controller(Script::answering(vec![ServerEvent::ConnectionClosed(
            Some("server shutting down".to_string()),
        )]));

        let report = controller.run(audio(&[b"\x01"])).await;

        assert_eq!(
            report.result,
            Err(STTError::StreamingFailure("server shutting down".to_string()))
        );
    }

    #[tokio::test]
    async fn test_final_during_streaming_lets_audio_finish() {
        let (controller, recorder, _) = controller(Script {
            on_first_audio: vec![ServerEvent::final_transcript("early result")],
            ..Script::answering(Vec::new())
        });

        let report = controller.run(live_audio(&[b"A", b"B", b"C"])).await;

        assert_eq!(report.result, Ok("early result".to_string()));
        assert_eq!(recorder.audio_frames().len(), 3);
        assert_eq!(recorder.last_seq_no(), Some(3));
    }
}

// =============================================================================
// Entity Tests
// =============================================================================

mod entity_tests {
    use super::*;

    #[tokio::test]
    async fn test_process_audio_stream_success() {
        let (stt, _) = entity(Script::answering(vec![ServerEvent::final_transcript(
            "turn on the lights",
        )]));

        let result = stt
            .process_audio_stream(SpeechMetadata::default(), audio(&[b"\x01\x02"]))
            .await;

        assert!(result.is_success());
        assert_eq!(result.text, "turn on the lights");
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn test_timeout_maps_to_error_result() {
        let (stt, _) = entity(Script::answering(Vec::new()));

        let result = stt
            .process_audio_stream(SpeechMetadata::default(), audio(&[b"\x01\x02"]))
            .await;

        assert_eq!(result.result, SpeechResultState::Error);
        assert!(result.error.unwrap().to_lowercase().contains("timeout"));
    }

    #[tokio::test]
    async fn test_auth_failure_disables_entity() {
        let (stt, recorder) = entity(Script {
            on_first_audio: vec![ServerEvent::error("not_authorised", "Invalid API key")],
            ..Script::answering(Vec::new())
        });

        let first = stt
            .process_audio_stream(SpeechMetadata::default(), audio(&[b"\x01\x02"]))
            .await;
        assert!(!first.is_success());
        assert!(!stt.is_available());
        assert_eq!(recorder.connects(), 1);

        let second = stt
            .process_audio_stream(SpeechMetadata::default(), audio(&[b"\x01\x02"]))
            .await;
        assert!(!second.is_success());
        assert_eq!(second.error.as_deref(), Some(UNAVAILABLE_MESSAGE));
        assert_eq!(recorder.connects(), 1);
    }

    #[tokio::test]
    async fn test_reconfigure_restores_availability() {
        let (stt, recorder) = entity(Script {
            on_start: vec![started(), ServerEvent::error("invalid_api_key", "Bad key")],
            ..Default::default()
        });

        stt.process_audio_stream(SpeechMetadata::default(), audio(&[b"\x01"]))
            .await;
        assert!(!stt.is_available());

        stt.reconfigure(ConnectionSettings {
            api_key: "sm-fresh-key-9876543210".to_string(),
            ..settings()
        });
        assert!(stt.is_available());

        stt.reconfigure(ConnectionSettings {
            api_key: "short".to_string(),
            ..settings()
        });
        assert!(!stt.is_available());
        assert_eq!(recorder.connects(), 1);
    }

    #[tokio::test]
    async fn test_short_key_unavailable_from_start() {
        let (connector, recorder) = ScriptedConnector::new(Script::default());
        let stt = SpeechmaticsSTT::with_connector(
            ConnectionSettings {
                api_key: "abc".to_string(),
                ..settings()
            },
            connector,
        );

        assert!(!stt.is_available());
        let result = stt
            .process_audio_stream(SpeechMetadata::default(), audio(&[b"\x01"]))
            .await;
        assert_eq!(result.error.as_deref(), Some(UNAVAILABLE_MESSAGE));
        assert_eq!(recorder.connects(), 0);
    }

    #[tokio::test]
    async fn test_unsupported_metadata_rejected_without_connecting() {
        let (stt, recorder) = entity(Script::default());

        let cases = [
            SpeechMetadata {
                codec: AudioCodec::Opus,
                ..Default::default()
            },
            SpeechMetadata {
                channels: AudioChannels::Stereo,
                ..Default::default()
            },
            SpeechMetadata {
                sample_rate: 8000,
                ..Default::default()
            },
            SpeechMetadata {
                bit_rate: 24,
                ..Default::default()
            },
            SpeechMetadata {
                language: Some("xx".to_string()),
                ..Default::default()
            },
        ];

        for metadata in cases {
            let result = stt.process_audio_stream(metadata, audio(&[b"\x01"])).await;
            assert!(!result.is_success());
            assert!(
                result.error.as_deref().unwrap().starts_with("Invalid configuration"),
                "{:?}",
                result.error
            );
        }
        assert_eq!(recorder.connects(), 0);
        assert!(stt.is_available());
    }

    #[tokio::test]
    async fn test_metadata_language_and_sample_rate_override() {
        let (stt, recorder) = entity(Script::answering(vec![ServerEvent::final_transcript(
            "guten morgen",
        )]));

        let result = stt
            .process_audio_stream(
                SpeechMetadata {
                    language: Some("de".to_string()),
                    sample_rate: 44100,
                    ..Default::default()
                },
                audio(&[b"\x01\x02"]),
            )
            .await;

        assert!(result.is_success());
        let start = recorder.start_message().unwrap();
        assert_eq!(start.transcription_config.language, "de");
        assert_eq!(start.audio_format.sample_rate, 44100);
        // Stored language untouched
        assert_eq!(stt.language(), "en");
    }

    #[test]
    fn test_entity_identity_and_capabilities() {
        let (stt, _) = entity(Script::default());

        assert_eq!(stt.name(), "Speechmatics STT");
        assert_eq!(stt.unique_id(), "speechmatics_stt_en");
        assert_eq!(stt.supported_languages().len(), 18);
        assert_eq!(stt.supported_sample_rates(), &[16000, 44100]);
        assert_eq!(stt.supported_channels(), &[AudioChannels::Mono]);
        assert_eq!(stt.supported_codecs(), &[AudioCodec::Pcm]);
        assert_eq!(stt.supported_bit_rates(), &[16]);
        assert_eq!(stt.supported_formats().len(), 2);
        assert!(stt.is_available());
    }
}
