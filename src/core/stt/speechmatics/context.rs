//! Per-session state shared between the controller and the event handlers.
//!
//! The controller owns the receiving ends (pending result, start
//! confirmation); the event pump hands a reference to [`SessionContext`] to
//! every handler.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use super::aggregator::TranscriptAggregator;
use super::router::ResolutionPolicy;
use crate::core::stt::base::STTError;

/// Value a session resolves to.
pub type SessionResult = Result<String, STTError>;

// =============================================================================
// ResultCell
// =============================================================================

/// One-shot result slot that can be written at most once.
///
/// The sender lives behind a lock; resolving takes it, so every later
/// `resolve` or `cancel` finds `None` and is a no-op.
#[derive(Debug)]
pub struct ResultCell {
    sender: Mutex<Option<oneshot::Sender<SessionResult>>>,
}

impl ResultCell {
    /// Create a cell and the receiver the controller awaits.
    pub fn new() -> (Self, oneshot::Receiver<SessionResult>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                sender: Mutex::new(Some(tx)),
            },
            rx,
        )
    }

    /// Resolve the pending result. Returns `false` if already resolved.
    pub fn resolve(&self, value: SessionResult) -> bool {
        match self.sender.lock().take() {
            Some(tx) => {
                // Receiver may already be gone if the controller gave up
                let _ = tx.send(value);
                true
            }
            None => false,
        }
    }

    /// Drop the sender without a value, releasing the waiting side.
    pub fn cancel(&self) -> bool {
        self.sender.lock().take().is_some()
    }

    pub fn is_resolved(&self) -> bool {
        self.sender.lock().is_none()
    }
}

// =============================================================================
// Availability
// =============================================================================

/// Availability flag owned by an entity and shared with its sessions.
///
/// Cleared on authentication failure; only reconfiguration restores it.
#[derive(Debug, Clone)]
pub struct Availability(Arc<AtomicBool>);

impl Availability {
    pub fn new(available: bool) -> Self {
        Self(Arc::new(AtomicBool::new(available)))
    }

    #[inline]
    pub fn is_available(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn mark_unavailable(&self) {
        if self.0.swap(false, Ordering::AcqRel) {
            warn!("Marking Speechmatics STT unavailable");
        }
    }

    pub fn restore(&self) {
        self.0.store(true, Ordering::Release);
    }
}

impl Default for Availability {
    fn default() -> Self {
        Self::new(true)
    }
}

// =============================================================================
// SessionContext
// =============================================================================

/// Receivers held by the controller for one session.
#[derive(Debug)]
pub struct PendingSignals {
    pub result: oneshot::Receiver<SessionResult>,
    /// Fires with the server session id once recognition has started
    pub started: oneshot::Receiver<Option<String>>,
}

/// Session state handed explicitly to every event handler.
#[derive(Debug)]
pub struct SessionContext {
    result: ResultCell,
    started: Mutex<Option<oneshot::Sender<Option<String>>>>,
    aggregator: Mutex<TranscriptAggregator>,
    last_error: Mutex<Option<STTError>>,
    availability: Availability,
    policy: ResolutionPolicy,
}

impl SessionContext {
    pub fn new(policy: ResolutionPolicy, availability: Availability) -> (Self, PendingSignals) {
        let (result, result_rx) = ResultCell::new();
        let (started_tx, started_rx) = oneshot::channel();
        (
            Self {
                result,
                started: Mutex::new(Some(started_tx)),
                aggregator: Mutex::new(TranscriptAggregator::new()),
                last_error: Mutex::new(None),
                availability,
                policy,
            },
            PendingSignals {
                result: result_rx,
                started: started_rx,
            },
        )
    }

    pub fn policy(&self) -> ResolutionPolicy {
        self.policy
    }

    /// Resolve the session. First call wins; later calls are no-ops.
    pub fn resolve(&self, value: SessionResult) -> bool {
        let resolved = self.result.resolve(value);
        if !resolved {
            debug!("Session already resolved, ignoring resolution");
        }
        resolved
    }

    pub fn cancel(&self) -> bool {
        self.result.cancel()
    }

    pub fn is_resolved(&self) -> bool {
        self.result.is_resolved()
    }

    /// Signal start confirmation. Only the first signal is delivered.
    pub fn confirm_started(&self, session_id: Option<String>) -> bool {
        match self.started.lock().take() {
            Some(tx) => {
                let _ = tx.send(session_id);
                true
            }
            None => false,
        }
    }

    /// Append a final fragment; returns the aggregated text so far.
    pub fn append_fragment(&self, fragment: &str) -> String {
        let mut aggregator = self.aggregator.lock();
        aggregator.append(fragment);
        aggregator.finalize()
    }

    pub fn aggregated_text(&self) -> String {
        self.aggregator.lock().finalize()
    }

    pub fn fragment_count(&self) -> usize {
        self.aggregator.lock().len()
    }

    pub fn record_error(&self, error: STTError) {
        *self.last_error.lock() = Some(error);
    }

    pub fn last_error(&self) -> Option<STTError> {
        self.last_error.lock().clone()
    }

    pub fn availability(&self) -> &Availability {
        &self.availability
    }
}
