pub mod stt;

// Re-export commonly used types for convenience
pub use stt::{
    STTError, SpeechMetadata, SpeechResult, SpeechResultState, SpeechToTextEntity,
    SpeechmaticsSTT,
};
