//! Dispatch of inbound server events to typed handlers.
//!
//! Each handler receives the [`SessionContext`] explicitly. A handler that
//! fails does not propagate: [`EventRouter::dispatch`] turns the failure into
//! a resolution of the pending result.

use tracing::{debug, error, info, warn};

use super::context::SessionContext;
use super::messages::{
    ErrorMessage, NoticeMessage, RecognitionStartedMessage, ServerEvent, TranscriptMessage,
};
use crate::core::stt::base::STTError;

/// When a session's result is fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResolutionPolicy {
    /// Resolve on the first non-empty final transcript; later finals are
    /// logged and discarded.
    #[default]
    FirstFinal,
    /// Collect every final segment and resolve on `EndOfTranscript`.
    EndOfTranscript,
}

/// Routes [`ServerEvent`]s to their handlers.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventRouter {
    policy: ResolutionPolicy,
}

impl EventRouter {
    pub fn new(policy: ResolutionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> ResolutionPolicy {
        self.policy
    }

    /// Dispatch one event. Never fails; handler errors resolve the session.
    pub fn dispatch(&self, event: ServerEvent, ctx: &SessionContext) {
        let kind = event.kind();
        let outcome = match event {
            ServerEvent::RecognitionStarted(msg) => self.on_recognition_started(msg, ctx),
            ServerEvent::FinalTranscript(msg) => self.on_final_transcript(msg, ctx),
            ServerEvent::PartialTranscript(_) => {
                debug!("Ignoring partial transcript");
                Ok(())
            }
            ServerEvent::EndOfTranscript => self.on_end_of_transcript(ctx),
            ServerEvent::Error(msg) => self.on_error(msg, ctx),
            ServerEvent::ConnectionClosed(reason) => self.on_connection_closed(reason, ctx),
            ServerEvent::AudioAdded(msg) => {
                debug!("Speechmatics acknowledged audio frame {}", msg.seq_no);
                Ok(())
            }
            ServerEvent::Info(notice) => {
                Self::log_notice("info", &notice);
                Ok(())
            }
            ServerEvent::Warning(notice) => {
                Self::log_notice("warning", &notice);
                Ok(())
            }
            ServerEvent::Malformed { kind, error } => Err(STTError::EventHandling(format!(
                "Malformed {kind} message: {error}"
            ))),
            ServerEvent::Other(raw) => {
                debug!("Received unknown Speechmatics message type: {}", raw);
                Ok(())
            }
        };

        if let Err(e) = outcome {
            error!("Failed to handle {} event: {}", kind, e);
            let failure = match e {
                STTError::EventHandling(_) => e,
                other => STTError::EventHandling(other.to_string()),
            };
            ctx.record_error(failure.clone());
            ctx.resolve(Err(failure));
        }
    }

    fn on_recognition_started(
        &self,
        msg: RecognitionStartedMessage,
        ctx: &SessionContext,
    ) -> Result<(), STTError> {
        info!(
            "Speechmatics recognition started (session: {})",
            msg.id.as_deref().unwrap_or("unknown")
        );
        if !ctx.confirm_started(msg.id) {
            debug!("Duplicate RecognitionStarted ignored");
        }
        Ok(())
    }

    fn on_final_transcript(
        &self,
        msg: TranscriptMessage,
        ctx: &SessionContext,
    ) -> Result<(), STTError> {
        let text = msg.transcript().ok_or_else(|| {
            STTError::EventHandling("AddTranscript carried no transcript".to_string())
        })?;

        if text.trim().is_empty() {
            debug!("Ignoring empty final transcript");
            return Ok(());
        }

        if ctx.is_resolved() {
            debug!("Discarding final transcript after resolution: {}", text);
            return Ok(());
        }

        let aggregated = ctx.append_fragment(&text);
        debug!(
            "Final transcript segment (confidence: {:.2}): {}",
            msg.confidence(),
            text
        );

        if self.policy == ResolutionPolicy::FirstFinal {
            ctx.resolve(Ok(aggregated));
        }
        Ok(())
    }

    fn on_end_of_transcript(&self, ctx: &SessionContext) -> Result<(), STTError> {
        info!(
            "Speechmatics end of transcript ({} segments)",
            ctx.fragment_count()
        );
        ctx.resolve(Ok(ctx.aggregated_text()));
        Ok(())
    }

    fn on_error(&self, msg: ErrorMessage, ctx: &SessionContext) -> Result<(), STTError> {
        let failure = if msg.is_authentication_failure() {
            ctx.availability().mark_unavailable();
            STTError::AuthenticationFailure(msg.reason.clone())
        } else {
            STTError::ProviderError {
                code: msg.code(),
                message: msg.reason.clone(),
            }
        };
        error!("Speechmatics STT error: {}", failure);

        ctx.record_error(failure.clone());
        ctx.resolve(Err(failure));
        Ok(())
    }

    fn on_connection_closed(
        &self,
        reason: Option<String>,
        ctx: &SessionContext,
    ) -> Result<(), STTError> {
        if ctx.is_resolved() {
            debug!("Speechmatics connection closed after resolution");
            return Ok(());
        }

        let reason = reason.unwrap_or_else(|| "connection closed by server".to_string());
        warn!("Speechmatics connection closed before a result: {}", reason);
        let failure = STTError::StreamingFailure(reason);
        ctx.record_error(failure.clone());
        ctx.resolve(Err(failure));
        Ok(())
    }

    fn log_notice(level: &str, notice: &NoticeMessage) {
        let kind = notice.kind.as_deref().unwrap_or("unspecified");
        if level == "warning" {
            warn!("Speechmatics warning ({}): {}", kind, notice.reason);
        } else {
            debug!("Speechmatics info ({}): {}", kind, notice.reason);
        }
    }
}
