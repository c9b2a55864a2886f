//! Mock Speechmatics Server
//!
//! Simulates the real-time WebSocket API with scripted behaviour:
//! - Normal transcription (one or more final segments)
//! - In-band authentication errors
//! - Handshake rejection (HTTP 401)
//! - Silent server (never answers EndOfStream)

// Allow dead code in test infrastructure - not every test uses every helper
#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde_json::Value;

pub mod websocket_mock;

pub use websocket_mock::{MockSpeechmaticsServer, start_speechmatics_mock};

/// How the mock answers a session
#[derive(Clone, Debug)]
pub enum MockBehavior {
    /// Answer EndOfStream with one `AddTranscript` per segment, then `EndOfTranscript`
    Transcribe(Vec<String>),
    /// Reply to StartRecognition with a `not_authorised` error and close
    AuthError,
    /// Reject the WebSocket upgrade with HTTP 401
    RejectHandshake,
    /// Confirm the session but never send a transcript
    Silent,
}

impl MockBehavior {
    pub fn transcribe(text: &str) -> Self {
        Self::Transcribe(vec![text.to_string()])
    }
}

/// What the mock observed across all connections
#[derive(Default)]
pub struct MockStats {
    pub connections: AtomicU64,
    pub audio_frames: AtomicU64,
    pub audio_bytes: AtomicU64,
    pub start_messages: Mutex<Vec<Value>>,
    pub authorization_headers: Mutex<Vec<String>>,
    pub last_seq_no: Mutex<Option<u64>>,
}

impl MockStats {
    pub fn connections(&self) -> u64 {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn audio_frames(&self) -> u64 {
        self.audio_frames.load(Ordering::SeqCst)
    }

    pub fn audio_bytes(&self) -> u64 {
        self.audio_bytes.load(Ordering::SeqCst)
    }

    pub fn last_start_message(&self) -> Option<Value> {
        self.start_messages.lock().last().cloned()
    }

    pub fn last_authorization(&self) -> Option<String> {
        self.authorization_headers.lock().last().cloned()
    }

    pub fn last_seq_no(&self) -> Option<u64> {
        *self.last_seq_no.lock()
    }

    pub fn summary(&self) -> String {
        format!(
            "connections={}, audio_frames={}, audio_bytes={}, last_seq_no={:?}",
            self.connections(),
            self.audio_frames(),
            self.audio_bytes(),
            self.last_seq_no()
        )
    }
}
