use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde::Serialize;

/// Error types for STT sessions
///
/// Every failure a session can hit is converted into one of these at the
/// session boundary; the host only ever sees them as the `error` detail of a
/// [`SpeechResult`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum STTError {
    /// Rejected before any network activity
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Connection failed: {0}")]
    ConnectionFailure(String),
    #[error("Session start timeout")]
    SessionStartTimeout,
    #[error("Streaming failed: {0}")]
    StreamingFailure(String),
    /// Server-reported; disables the entity until it is reconfigured
    #[error("Authentication failed: {0}")]
    AuthenticationFailure(String),
    #[error("Speechmatics error: {message} (code: {code})")]
    ProviderError { code: String, message: String },
    #[error("Timeout waiting for transcription")]
    TranscriptionTimeout,
    #[error("No transcription received")]
    EmptyResult,
    /// A server event could not be handled
    #[error("Error processing server event: {0}")]
    EventHandling(String),
}

impl STTError {
    /// Whether this error should disable future sessions.
    #[inline]
    pub fn is_authentication_failure(&self) -> bool {
        matches!(self, Self::AuthenticationFailure(_))
    }
}

/// Outcome of a transcription request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeechResultState {
    Success,
    Error,
}

/// Result handed back to the host for one utterance
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpeechResult {
    /// Aggregated transcript (empty on error)
    pub text: String,
    pub result: SpeechResultState,
    /// Human-readable error detail when `result` is `Error`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SpeechResult {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            result: SpeechResultState::Success,
            error: None,
        }
    }

    pub fn error(error: &STTError) -> Self {
        Self::failure(error.to_string())
    }

    /// Error result with a plain message.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            text: String::new(),
            result: SpeechResultState::Error,
            error: Some(message.into()),
        }
    }

    #[inline]
    pub fn is_success(&self) -> bool {
        self.result == SpeechResultState::Success
    }
}

/// Container formats a host may announce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Wav,
    Ogg,
}

/// Audio codecs a host may announce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioCodec {
    Pcm,
    Opus,
}

/// Channel layouts a host may announce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioChannels {
    Mono,
    Stereo,
}

/// Metadata describing the audio stream of one request
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechMetadata {
    /// Requested language; falls back to the stored language when `None`
    pub language: Option<String>,
    pub format: AudioFormat,
    pub codec: AudioCodec,
    /// Sample rate in Hz
    pub sample_rate: u32,
    pub channels: AudioChannels,
    /// Bits per sample
    pub bit_rate: u16,
}

impl Default for SpeechMetadata {
    fn default() -> Self {
        Self {
            language: None,
            format: AudioFormat::Wav,
            codec: AudioCodec::Pcm,
            sample_rate: 16000,
            channels: AudioChannels::Mono,
            bit_rate: 16,
        }
    }
}

/// Host-facing seam for speech-to-text entities
///
/// A host registers an entity, asks it what audio it accepts, then hands it
/// one lazy audio stream per utterance. Implementations must never panic or
/// leave the caller waiting: every outcome is a [`SpeechResult`].
#[async_trait]
pub trait SpeechToTextEntity: Send + Sync {
    /// Display name
    fn name(&self) -> &str;

    /// Stable identifier derived from the configured language
    fn unique_id(&self) -> String;

    fn supported_languages(&self) -> &'static [&'static str];

    fn supported_formats(&self) -> &'static [AudioFormat];

    fn supported_codecs(&self) -> &'static [AudioCodec];

    fn supported_sample_rates(&self) -> &'static [u32];

    fn supported_channels(&self) -> &'static [AudioChannels];

    fn supported_bit_rates(&self) -> &'static [u16];

    /// Whether new requests will attempt a connection
    fn is_available(&self) -> bool;

    /// Transcribe one utterance
    ///
    /// # Arguments
    /// * `metadata` - Description of the audio stream
    /// * `stream` - Lazy, finite sequence of raw PCM chunks, consumed once
    async fn process_audio_stream(
        &self,
        metadata: SpeechMetadata,
        stream: BoxStream<'static, Bytes>,
    ) -> SpeechResult;
}
