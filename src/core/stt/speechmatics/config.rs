//! Configuration types for the Speechmatics real-time API.
//!
//! This module contains:
//! - Quality tier (operating point) and audio encoding selection
//! - The supported language set and tunable bounds
//! - [`ConnectionSettings`]: raw, unvalidated tunables (stored defaults merged
//!   with per-request metadata)
//! - [`ConnectionConfig`]: the validated, immutable form a session is opened with

use std::fmt;
use std::str::FromStr;

use zeroize::Zeroize;

use super::messages::{AudioFormatPayload, StartRecognitionMessage, TranscriptionConfigPayload};
use crate::core::stt::base::STTError;
use crate::utils::validate_endpoint_url;

// =============================================================================
// Constants
// =============================================================================

/// Default real-time endpoint (EU region)
pub const DEFAULT_ENDPOINT: &str = "wss://eu2.rt.speechmatics.com/v2";

pub const DEFAULT_LANGUAGE: &str = "en";

/// Default max latency budget in seconds
pub const DEFAULT_MAX_DELAY: f32 = 0.8;

/// Default audio chunk size in bytes
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

pub const DEFAULT_SAMPLE_RATE: u32 = 16000;

/// Minimum accepted credential length (after trimming)
pub const MIN_API_KEY_LENGTH: usize = 10;

pub const MIN_MAX_DELAY: f32 = 0.1;
pub const MAX_MAX_DELAY: f32 = 5.0;

/// Minimum supported sample rate (8kHz for telephony)
pub const MIN_SAMPLE_RATE: u32 = 8000;

/// Maximum supported sample rate (48kHz for high-quality audio)
pub const MAX_SAMPLE_RATE: u32 = 48000;

/// Languages accepted by the real-time API
pub const SUPPORTED_LANGUAGES: &[&str] = &[
    "en", "ru", "de", "fr", "es", "it", "pt", "pl", "tr", "nl", "cs", "ar", "zh", "ja", "hi", "th",
    "vi", "ko",
];

/// Check whether a language code is in [`SUPPORTED_LANGUAGES`].
#[inline]
pub fn is_supported_language(language: &str) -> bool {
    SUPPORTED_LANGUAGES.contains(&language)
}

/// Check whether a credential passes the minimum shape check.
#[inline]
pub fn is_valid_api_key(api_key: &str) -> bool {
    api_key.trim().len() >= MIN_API_KEY_LENGTH
}

// =============================================================================
// Operating Point
// =============================================================================

/// Server-side model selection, trading latency for accuracy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OperatingPoint {
    Standard,
    /// Higher accuracy model (default)
    #[default]
    Enhanced,
}

impl OperatingPoint {
    /// Convert to the API value.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Enhanced => "enhanced",
        }
    }
}

impl FromStr for OperatingPoint {
    type Err = STTError;

    /// Parse from an operating point string (case-insensitive).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "standard" => Ok(Self::Standard),
            "enhanced" => Ok(Self::Enhanced),
            other => Err(STTError::InvalidConfig(format!(
                "Unsupported operating point: {other}. Supported: standard, enhanced"
            ))),
        }
    }
}

impl fmt::Display for OperatingPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Audio Encoding
// =============================================================================

/// Raw audio encodings accepted by the real-time API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AudioEncoding {
    /// PCM signed 16-bit little-endian (default)
    #[default]
    PcmS16le,
    /// PCM 32-bit float little-endian
    PcmF32le,
    /// mu-law (telephony)
    Mulaw,
}

impl AudioEncoding {
    /// Convert to the API value.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PcmS16le => "pcm_s16le",
            Self::PcmF32le => "pcm_f32le",
            Self::Mulaw => "mulaw",
        }
    }
}

impl FromStr for AudioEncoding {
    type Err = STTError;

    /// Parse from an encoding string (case-insensitive).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pcm_s16le" | "s16le" => Ok(Self::PcmS16le),
            "pcm_f32le" | "f32le" => Ok(Self::PcmF32le),
            "mulaw" | "pcm_mulaw" => Ok(Self::Mulaw),
            other => Err(STTError::InvalidConfig(format!(
                "Unsupported audio encoding: {other}. Supported: pcm_s16le, pcm_f32le, mulaw"
            ))),
        }
    }
}

// =============================================================================
// Settings (unvalidated)
// =============================================================================

/// Raw tunables for one session, before validation.
///
/// `Default` carries the stored defaults; the entity overrides language and
/// sample rate from the request metadata before calling
/// [`ConnectionConfig::new`].
#[derive(Clone, PartialEq)]
pub struct ConnectionSettings {
    pub endpoint: String,
    pub api_key: String,
    pub language: String,
    pub operating_point: OperatingPoint,
    /// Max latency budget in seconds
    pub max_delay: f32,
    /// Largest audio frame sent in one WebSocket message, in bytes
    pub chunk_size: usize,
    pub sample_rate: u32,
    pub encoding: AudioEncoding,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: String::new(),
            language: DEFAULT_LANGUAGE.to_string(),
            operating_point: OperatingPoint::default(),
            max_delay: DEFAULT_MAX_DELAY,
            chunk_size: DEFAULT_CHUNK_SIZE,
            sample_rate: DEFAULT_SAMPLE_RATE,
            encoding: AudioEncoding::default(),
        }
    }
}

impl fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSettings")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<redacted>")
            .field("language", &self.language)
            .field("operating_point", &self.operating_point)
            .field("max_delay", &self.max_delay)
            .field("chunk_size", &self.chunk_size)
            .field("sample_rate", &self.sample_rate)
            .field("encoding", &self.encoding)
            .finish()
    }
}

// =============================================================================
// Validated Configuration
// =============================================================================

/// Validated, immutable connection parameters for one session.
#[derive(Clone)]
pub struct ConnectionConfig {
    endpoint: String,
    api_key: String,
    language: String,
    operating_point: OperatingPoint,
    max_delay: f32,
    chunk_size: usize,
    sample_rate: u32,
    encoding: AudioEncoding,
}

impl ConnectionConfig {
    /// Validate and freeze a set of settings.
    ///
    /// # Errors
    /// Returns [`STTError::InvalidConfig`] when:
    /// - the credential is missing or shorter than [`MIN_API_KEY_LENGTH`]
    /// - the language is not in [`SUPPORTED_LANGUAGES`]
    /// - the max delay is outside `[0.1, 5.0]`
    /// - the chunk size is zero or the sample rate is outside 8-48 kHz
    /// - the endpoint is not a usable WebSocket URL
    pub fn new(settings: &ConnectionSettings) -> Result<Self, STTError> {
        let api_key = settings.api_key.trim();
        if api_key.is_empty() {
            return Err(STTError::InvalidConfig("API key is required".to_string()));
        }
        if api_key.len() < MIN_API_KEY_LENGTH {
            return Err(STTError::InvalidConfig(format!(
                "API key must be at least {MIN_API_KEY_LENGTH} characters"
            )));
        }

        let language = settings.language.trim();
        if !is_supported_language(language) {
            return Err(STTError::InvalidConfig(format!(
                "Unsupported language: {language}"
            )));
        }

        // NaN fails the range check as well
        if !(MIN_MAX_DELAY..=MAX_MAX_DELAY).contains(&settings.max_delay) {
            return Err(STTError::InvalidConfig(format!(
                "Max delay {} is outside supported range ({MIN_MAX_DELAY}-{MAX_MAX_DELAY} seconds)",
                settings.max_delay
            )));
        }

        if settings.chunk_size == 0 {
            return Err(STTError::InvalidConfig(
                "Audio chunk size must be greater than zero".to_string(),
            ));
        }

        if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&settings.sample_rate) {
            return Err(STTError::InvalidConfig(format!(
                "Sample rate {} Hz is outside supported range ({MIN_SAMPLE_RATE}-{MAX_SAMPLE_RATE} Hz)",
                settings.sample_rate
            )));
        }

        let endpoint = validate_endpoint_url(&settings.endpoint)
            .map_err(|e| STTError::InvalidConfig(format!("Invalid endpoint: {e}")))?;

        Ok(Self {
            endpoint: endpoint.to_string(),
            api_key: api_key.to_string(),
            language: language.to_string(),
            operating_point: settings.operating_point,
            max_delay: settings.max_delay,
            chunk_size: settings.chunk_size,
            sample_rate: settings.sample_rate,
            encoding: settings.encoding,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn operating_point(&self) -> OperatingPoint {
        self.operating_point
    }

    pub fn max_delay(&self) -> f32 {
        self.max_delay
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn encoding(&self) -> AudioEncoding {
        self.encoding
    }

    /// Value for the `Authorization` header of the upgrade request.
    pub fn authorization_header(&self) -> String {
        format!("Bearer {}", self.api_key)
    }

    /// Build the session-start message. Interim results are always disabled.
    pub fn start_recognition_message(&self) -> StartRecognitionMessage {
        StartRecognitionMessage::new(
            AudioFormatPayload::raw(self.encoding.as_str(), self.sample_rate),
            TranscriptionConfigPayload {
                language: self.language.clone(),
                operating_point: self.operating_point.as_str(),
                max_delay: self.max_delay,
                enable_partials: false,
            },
        )
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<redacted>")
            .field("language", &self.language)
            .field("operating_point", &self.operating_point)
            .field("max_delay", &self.max_delay)
            .field("chunk_size", &self.chunk_size)
            .field("sample_rate", &self.sample_rate)
            .field("encoding", &self.encoding)
            .finish()
    }
}

impl Drop for ConnectionConfig {
    fn drop(&mut self) {
        self.api_key.zeroize();
    }
}
