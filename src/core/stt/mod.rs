mod base;
pub mod speechmatics;

// Re-export public types and traits
pub use base::{
    AudioChannels, AudioCodec, AudioFormat, STTError, SpeechMetadata, SpeechResult,
    SpeechResultState, SpeechToTextEntity,
};

// Re-export Speechmatics implementation
pub use speechmatics::{
    Availability, ConnectionConfig, ConnectionSettings, OperatingPoint, ResolutionPolicy,
    SessionController, SessionReport, SessionTimeouts, SpeechmaticsSTT, TransportConnector,
    WebSocketConnector,
};
