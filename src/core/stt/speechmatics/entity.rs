//! Host-facing Speechmatics entity.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use parking_lot::RwLock;
use tracing::{info, warn};

use super::config::{
    ConnectionConfig, ConnectionSettings, SUPPORTED_LANGUAGES, is_valid_api_key,
};
use super::context::Availability;
use super::router::ResolutionPolicy;
use super::session::{SessionController, SessionTimeouts};
use super::transport::{TransportConnector, WebSocketConnector};
use crate::core::stt::base::{
    AudioChannels, AudioCodec, AudioFormat, STTError, SpeechMetadata, SpeechResult,
    SpeechToTextEntity,
};

/// Display name registered with the host
pub const ENTITY_NAME: &str = "Speechmatics STT";

/// Error detail returned while the entity is disabled
pub const UNAVAILABLE_MESSAGE: &str = "Entity is unavailable - check API key configuration";

const SUPPORTED_FORMATS: &[AudioFormat] = &[AudioFormat::Wav, AudioFormat::Ogg];
const SUPPORTED_CODECS: &[AudioCodec] = &[AudioCodec::Pcm];
const SUPPORTED_SAMPLE_RATES: &[u32] = &[16000, 44100];
const SUPPORTED_CHANNELS: &[AudioChannels] = &[AudioChannels::Mono];
const SUPPORTED_BIT_RATES: &[u16] = &[16];

/// Speech-to-text entity backed by the Speechmatics real-time API.
///
/// Every call to [`SpeechToTextEntity::process_audio_stream`] opens a fresh
/// session; nothing is retried. An authentication failure disables the
/// entity until [`SpeechmaticsSTT::reconfigure`] supplies a usable key.
pub struct SpeechmaticsSTT {
    settings: RwLock<ConnectionSettings>,
    connector: Arc<dyn TransportConnector>,
    availability: Availability,
    timeouts: SessionTimeouts,
    policy: ResolutionPolicy,
}

impl SpeechmaticsSTT {
    /// Create an entity that talks to the service over WebSocket.
    pub fn new(settings: ConnectionSettings) -> Self {
        Self::with_connector(settings, Arc::new(WebSocketConnector::new()))
    }

    pub fn with_connector(
        settings: ConnectionSettings,
        connector: Arc<dyn TransportConnector>,
    ) -> Self {
        let available = is_valid_api_key(&settings.api_key);
        if !available {
            warn!("Speechmatics API key missing or too short, entity unavailable");
        }

        Self {
            settings: RwLock::new(settings),
            connector,
            availability: Availability::new(available),
            timeouts: SessionTimeouts::default(),
            policy: ResolutionPolicy::default(),
        }
    }

    pub fn with_timeouts(mut self, timeouts: SessionTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_policy(mut self, policy: ResolutionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replace the stored settings.
    ///
    /// A usable key restores availability; an unusable one disables the
    /// entity.
    pub fn reconfigure(&self, settings: ConnectionSettings) {
        let valid = is_valid_api_key(&settings.api_key);
        *self.settings.write() = settings;

        if valid {
            self.availability.restore();
            info!("Speechmatics STT reconfigured");
        } else {
            self.availability.mark_unavailable();
        }
    }

    /// Stored language code
    pub fn language(&self) -> String {
        self.settings.read().language.clone()
    }

    fn validate_metadata(metadata: &SpeechMetadata) -> Result<(), STTError> {
        if !SUPPORTED_FORMATS.contains(&metadata.format) {
            return Err(STTError::InvalidConfig(format!(
                "Unsupported audio format: {:?}",
                metadata.format
            )));
        }
        if !SUPPORTED_CODECS.contains(&metadata.codec) {
            return Err(STTError::InvalidConfig(format!(
                "Unsupported audio codec: {:?}",
                metadata.codec
            )));
        }
        if !SUPPORTED_SAMPLE_RATES.contains(&metadata.sample_rate) {
            return Err(STTError::InvalidConfig(format!(
                "Unsupported sample rate: {} Hz",
                metadata.sample_rate
            )));
        }
        if !SUPPORTED_CHANNELS.contains(&metadata.channels) {
            return Err(STTError::InvalidConfig(format!(
                "Unsupported channel layout: {:?}",
                metadata.channels
            )));
        }
        if !SUPPORTED_BIT_RATES.contains(&metadata.bit_rate) {
            return Err(STTError::InvalidConfig(format!(
                "Unsupported bit depth: {}",
                metadata.bit_rate
            )));
        }
        Ok(())
    }

    /// Merge request metadata over the stored settings and validate.
    fn session_config(&self, metadata: &SpeechMetadata) -> Result<ConnectionConfig, STTError> {
        Self::validate_metadata(metadata)?;

        let mut settings = self.settings.read().clone();
        if let Some(language) = metadata.language.as_deref() {
            settings.language = language.to_string();
        }
        settings.sample_rate = metadata.sample_rate;

        ConnectionConfig::new(&settings)
    }
}

#[async_trait]
impl SpeechToTextEntity for SpeechmaticsSTT {
    fn name(&self) -> &str {
        ENTITY_NAME
    }

    fn unique_id(&self) -> String {
        format!("speechmatics_stt_{}", self.settings.read().language)
    }

    fn supported_languages(&self) -> &'static [&'static str] {
        SUPPORTED_LANGUAGES
    }

    fn supported_formats(&self) -> &'static [AudioFormat] {
        SUPPORTED_FORMATS
    }

    fn supported_codecs(&self) -> &'static [AudioCodec] {
        SUPPORTED_CODECS
    }

    fn supported_sample_rates(&self) -> &'static [u32] {
        SUPPORTED_SAMPLE_RATES
    }

    fn supported_channels(&self) -> &'static [AudioChannels] {
        SUPPORTED_CHANNELS
    }

    fn supported_bit_rates(&self) -> &'static [u16] {
        SUPPORTED_BIT_RATES
    }

    fn is_available(&self) -> bool {
        self.availability.is_available()
    }

    async fn process_audio_stream(
        &self,
        metadata: SpeechMetadata,
        stream: BoxStream<'static, Bytes>,
    ) -> SpeechResult {
        if !self.is_available() {
            warn!("Speechmatics STT request rejected: {}", UNAVAILABLE_MESSAGE);
            return SpeechResult::failure(UNAVAILABLE_MESSAGE);
        }

        let config = match self.session_config(&metadata) {
            Ok(config) => config,
            Err(e) => {
                warn!("Rejecting Speechmatics STT request: {}", e);
                return SpeechResult::error(&e);
            }
        };

        info!(
            "Starting Speechmatics session (language: {}, sample rate: {} Hz)",
            config.language(),
            config.sample_rate()
        );

        let report = SessionController::new(config, self.connector.clone(), self.availability.clone())
            .with_timeouts(self.timeouts)
            .with_policy(self.policy)
            .run(stream)
            .await;

        match report.result {
            Ok(text) => SpeechResult::success(text),
            Err(e) => SpeechResult::error(&e),
        }
    }
}

impl std::fmt::Debug for SpeechmaticsSTT {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechmaticsSTT")
            .field("settings", &*self.settings.read())
            .field("available", &self.availability.is_available())
            .field("timeouts", &self.timeouts)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
