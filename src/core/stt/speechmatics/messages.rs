//! WebSocket message types for the Speechmatics real-time API v2.
//!
//! - **Outgoing messages** (client to server)
//!   - [`StartRecognitionMessage`]: opens the recognition session
//!   - Binary audio frames (sent directly, no JSON wrapper)
//!   - [`EndOfStreamMessage`]: marks the end of the audio
//!
//! - **Incoming messages** (server to client), parsed into [`ServerEvent`]
//!   - `RecognitionStarted`, `AudioAdded`, `AddTranscript`,
//!     `AddPartialTranscript`, `EndOfTranscript`, `Info`, `Warning`, `Error`

use serde::{Deserialize, Serialize};

// =============================================================================
// Outgoing Messages (Client to Server)
// =============================================================================

/// Audio description sent with `StartRecognition`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AudioFormatPayload {
    /// Always "raw" for PCM streaming
    #[serde(rename = "type")]
    pub format_type: &'static str,
    pub encoding: &'static str,
    pub sample_rate: u32,
}

impl AudioFormatPayload {
    pub fn raw(encoding: &'static str, sample_rate: u32) -> Self {
        Self {
            format_type: "raw",
            encoding,
            sample_rate,
        }
    }
}

/// Transcription options sent with `StartRecognition`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranscriptionConfigPayload {
    pub language: String,
    pub operating_point: &'static str,
    pub max_delay: f32,
    pub enable_partials: bool,
}

/// Session-start message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StartRecognitionMessage {
    /// Message type identifier (always "StartRecognition")
    pub message: &'static str,
    pub audio_format: AudioFormatPayload,
    pub transcription_config: TranscriptionConfigPayload,
}

impl StartRecognitionMessage {
    pub fn new(
        audio_format: AudioFormatPayload,
        transcription_config: TranscriptionConfigPayload,
    ) -> Self {
        Self {
            message: "StartRecognition",
            audio_format,
            transcription_config,
        }
    }
}

/// End-of-audio marker carrying the sequence number of the last audio frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndOfStreamMessage {
    /// Message type identifier (always "EndOfStream")
    pub message: &'static str,
    pub last_seq_no: u64,
}

impl EndOfStreamMessage {
    pub fn new(last_seq_no: u64) -> Self {
        Self {
            message: "EndOfStream",
            last_seq_no,
        }
    }
}

// =============================================================================
// Incoming Messages (Server to Client)
// =============================================================================

/// Confirmation that the session was configured and audio may flow.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RecognitionStartedMessage {
    /// Session identifier assigned by the server
    #[serde(default)]
    pub id: Option<String>,
}

/// Acknowledgement of one audio frame.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AudioAddedMessage {
    pub seq_no: u64,
}

/// Segment-level summary of a transcript message.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TranscriptMetadata {
    #[serde(default)]
    pub start_time: f64,
    #[serde(default)]
    pub end_time: f64,
    pub transcript: String,
}

/// One hypothesis for a recognised word or punctuation mark.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Alternative {
    pub content: String,
    #[serde(default)]
    pub confidence: f64,
}

/// Word or punctuation result inside a transcript message.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RecognitionResult {
    /// "word" or "punctuation"
    #[serde(rename = "type", default)]
    pub result_type: String,
    #[serde(default)]
    pub start_time: f64,
    #[serde(default)]
    pub end_time: f64,
    #[serde(default)]
    pub alternatives: Vec<Alternative>,
}

/// `AddTranscript` / `AddPartialTranscript` payload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TranscriptMessage {
    #[serde(default)]
    pub metadata: Option<TranscriptMetadata>,
    #[serde(default)]
    pub results: Vec<RecognitionResult>,
}

impl TranscriptMessage {
    /// Extract the transcript text.
    ///
    /// Prefers `metadata.transcript`; otherwise rebuilds the text from the
    /// best alternative of each result, attaching punctuation to the previous
    /// word. Returns `None` when the message carries neither.
    pub fn transcript(&self) -> Option<String> {
        if let Some(metadata) = &self.metadata {
            return Some(metadata.transcript.trim().to_string());
        }
        if self.results.is_empty() {
            return None;
        }

        let mut text = String::new();
        for result in &self.results {
            let Some(best) = result.alternatives.first() else {
                continue;
            };
            if !text.is_empty() && result.result_type != "punctuation" {
                text.push(' ');
            }
            text.push_str(&best.content);
        }
        Some(text)
    }

    /// Average confidence over the best alternatives, 1.0 when unknown.
    pub fn confidence(&self) -> f32 {
        let confidences: Vec<f64> = self
            .results
            .iter()
            .filter_map(|r| r.alternatives.first().map(|a| a.confidence))
            .collect();
        if confidences.is_empty() {
            return 1.0;
        }
        let sum: f64 = confidences.iter().sum();
        ((sum / confidences.len() as f64) as f32).clamp(0.0, 1.0)
    }
}

/// `Info` / `Warning` payload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NoticeMessage {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub reason: String,
}

/// Error codes that mean the credential was rejected.
pub const AUTHENTICATION_ERROR_CODES: &[&str] = &[
    "not_authorised",
    "not_authorized",
    "authentication_failed",
    "invalid_api_key",
    "unauthorized",
];

/// `Error` payload.
///
/// The server names the error kind in `type`; some frames also carry a
/// `code`, either a string kind or a numeric status. Both are kept.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ErrorMessage {
    /// Error kind (e.g. "not_authorised", "quota_exceeded")
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub code: Option<serde_json::Value>,
    /// Human-readable error description
    #[serde(default = "unknown_error")]
    pub reason: String,
}

fn unknown_error() -> String {
    "Unknown error".to_string()
}

impl ErrorMessage {
    /// `code` rendered as text; strings are taken verbatim.
    fn code_text(&self) -> Option<String> {
        match self.code.as_ref()? {
            serde_json::Value::String(code) => Some(code.clone()),
            serde_json::Value::Null => None,
            other => Some(other.to_string()),
        }
    }

    /// Error identifier for reporting: the kind, else the code, else empty.
    pub fn code(&self) -> String {
        self.kind
            .clone()
            .or_else(|| self.code_text())
            .unwrap_or_default()
    }

    /// Whether the server rejected the credential, judged by either field.
    pub fn is_authentication_failure(&self) -> bool {
        let kind_matches = self
            .kind
            .as_deref()
            .is_some_and(|kind| AUTHENTICATION_ERROR_CODES.contains(&kind));
        kind_matches
            || self
                .code_text()
                .is_some_and(|code| AUTHENTICATION_ERROR_CODES.contains(&code.as_str()))
    }
}

// =============================================================================
// Event Enum and Parsing
// =============================================================================

/// Inbound events delivered by the transport.
///
/// All variants except [`ServerEvent::ConnectionClosed`] come from server
/// messages; that one is synthesised by the transport when the socket ends.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    RecognitionStarted(RecognitionStartedMessage),
    AudioAdded(AudioAddedMessage),
    /// `AddTranscript`: a final, non-revisable segment
    FinalTranscript(TranscriptMessage),
    /// `AddPartialTranscript`: ignored, partials are disabled
    PartialTranscript(TranscriptMessage),
    EndOfTranscript,
    Info(NoticeMessage),
    Warning(NoticeMessage),
    Error(ErrorMessage),
    /// The connection ended; carries the close reason if any
    ConnectionClosed(Option<String>),
    /// Known message type whose body could not be decoded
    Malformed { kind: String, error: String },
    /// Unknown message type (for forward compatibility)
    Other(String),
}

impl ServerEvent {
    /// Parse a WebSocket text message into the appropriate event.
    ///
    /// A known `message` tag with an undecodable body yields
    /// [`ServerEvent::Malformed`] so the session can fail on it; unknown tags
    /// yield [`ServerEvent::Other`].
    ///
    /// # Errors
    /// Returns the parse error when the text is not JSON or has no `message`
    /// tag.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        // First, peek at the message tag
        #[derive(Deserialize)]
        struct TypePeek {
            message: String,
        }

        let peek: TypePeek = serde_json::from_str(text)?;

        let parsed = match peek.message.as_str() {
            "RecognitionStarted" => serde_json::from_str(text).map(Self::RecognitionStarted),
            "AudioAdded" => serde_json::from_str(text).map(Self::AudioAdded),
            "AddTranscript" => serde_json::from_str(text).map(Self::FinalTranscript),
            "AddPartialTranscript" => serde_json::from_str(text).map(Self::PartialTranscript),
            "EndOfTranscript" => Ok(Self::EndOfTranscript),
            "Info" => serde_json::from_str(text).map(Self::Info),
            "Warning" => serde_json::from_str(text).map(Self::Warning),
            "Error" => serde_json::from_str(text).map(Self::Error),
            _ => Ok(Self::Other(text.to_string())),
        };

        Ok(parsed.unwrap_or_else(|e| Self::Malformed {
            kind: peek.message,
            error: e.to_string(),
        }))
    }

    /// Short tag for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RecognitionStarted(_) => "RecognitionStarted",
            Self::AudioAdded(_) => "AudioAdded",
            Self::FinalTranscript(_) => "AddTranscript",
            Self::PartialTranscript(_) => "AddPartialTranscript",
            Self::EndOfTranscript => "EndOfTranscript",
            Self::Info(_) => "Info",
            Self::Warning(_) => "Warning",
            Self::Error(_) => "Error",
            Self::ConnectionClosed(_) => "ConnectionClosed",
            Self::Malformed { .. } => "Malformed",
            Self::Other(_) => "Other",
        }
    }

    /// Convenience constructor for a final transcript carrying only metadata.
    pub fn final_transcript(text: impl Into<String>) -> Self {
        Self::FinalTranscript(TranscriptMessage {
            metadata: Some(TranscriptMetadata {
                start_time: 0.0,
                end_time: 0.0,
                transcript: text.into(),
            }),
            results: Vec::new(),
        })
    }

    /// Convenience constructor for a server error.
    pub fn error(code: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Error(ErrorMessage {
            kind: Some(code.into()),
            code: None,
            reason: reason.into(),
        })
    }
}
