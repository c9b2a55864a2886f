//! Speechmatics real-time Speech-to-Text API v2 integration.
//!
//! One utterance maps to one session: a fresh WebSocket connection is opened,
//! configured with `StartRecognition`, fed raw PCM frames, closed with
//! `EndOfStream`, and resolved into a single aggregated transcript.
//!
//! # Architecture
//!
//! - [`config`]: Validated connection parameters (`ConnectionConfig`) and the
//!   raw settings they are built from
//! - [`messages`]: WebSocket message types for API communication
//! - [`aggregator`]: Collects final transcript segments
//! - [`context`]: One-shot result cell, availability flag and per-session state
//! - [`router`]: Dispatches server events to typed handlers
//! - [`transport`]: Connector/transport seams and the WebSocket implementation
//! - [`session`]: The session state machine and its timeouts
//! - [`entity`]: The host-facing `SpeechmaticsSTT` entity
//!
//! # Example
//!
//! ```rust,no_run
//! use futures::StreamExt;
//! use speechmatics_stt_bridge::core::stt::{
//!     ConnectionSettings, SpeechMetadata, SpeechToTextEntity, SpeechmaticsSTT,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let stt = SpeechmaticsSTT::new(ConnectionSettings {
//!         api_key: "your-speechmatics-api-key".to_string(),
//!         ..Default::default()
//!     });
//!
//!     let audio = futures::stream::iter(vec![bytes::Bytes::from(vec![0u8; 3200])]);
//!     let result = stt
//!         .process_audio_stream(SpeechMetadata::default(), audio.boxed())
//!         .await;
//!
//!     println!("{}", serde_json::to_string(&result).unwrap());
//! }
//! ```
//!
//! # Error Codes
//!
//! | Server `type` | Result |
//! |---------------|--------|
//! | `not_authorised`, `authentication_failed`, `invalid_api_key`, `unauthorized` | `AuthenticationFailure`, entity disabled |
//! | anything else | `ProviderError` |

pub mod aggregator;
pub mod config;
pub mod context;
pub mod entity;
pub mod messages;
pub mod router;
pub mod session;
pub mod transport;

#[cfg(test)]
mod tests;

// Re-export public types
pub use aggregator::TranscriptAggregator;
pub use config::{
    AudioEncoding, ConnectionConfig, ConnectionSettings, DEFAULT_CHUNK_SIZE, DEFAULT_ENDPOINT,
    DEFAULT_LANGUAGE, DEFAULT_MAX_DELAY, OperatingPoint, SUPPORTED_LANGUAGES,
};
pub use context::{Availability, ResultCell, SessionContext};
pub use entity::{ENTITY_NAME, SpeechmaticsSTT, UNAVAILABLE_MESSAGE};
pub use messages::{ErrorMessage, ServerEvent, StartRecognitionMessage, TranscriptMessage};
pub use router::{EventRouter, ResolutionPolicy};
pub use session::{CloseReason, SessionController, SessionReport, SessionState, SessionTimeouts};
pub use transport::{
    OutboundMessage, TranscriptionTransport, TransportChannel, TransportConnector,
    WebSocketConnector,
};
