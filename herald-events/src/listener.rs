//! Listener trait

use crate::event::Event;
use async_trait::async_trait;
use std::sync::Arc;

/// Shared handle to a registered listener.
pub type ListenerRef = Arc<dyn EventListener>;

/// Receiver of events published on the bus.
///
/// A listener decides per event whether it is interested and how it wants to
/// be called. Lightweight listeners are called directly and failures are only
/// logged. Other listeners are reliable: every delivery first goes through the
/// durable queue and failures are retried up to [`max_failures`] times, so
/// their [`handle_event`] must be idempotent.
///
/// [`max_failures`]: EventListener::max_failures
/// [`handle_event`]: EventListener::handle_event
#[async_trait]
pub trait EventListener: Send + Sync + 'static {
    /// Stable identifier, referenced by persisted executions.
    fn id(&self) -> &str;

    /// Interest predicate.
    fn is_wanted(&self, event: &Event) -> bool;

    /// Run on the worker pool instead of the publishing task.
    fn is_async(&self, _event: &Event) -> bool {
        false
    }

    /// Best-effort in-memory delivery when `true`, durable delivery otherwise.
    fn is_lightweight(&self) -> bool {
        true
    }

    /// Attempts before a reliable delivery is abandoned.
    fn max_failures(&self) -> u32 {
        5
    }

    /// Called once when the listener is added to the registry.
    ///
    /// Runs while the registry is write-locked and must not block.
    fn init(&self) {}

    /// Deliver the event.
    ///
    /// `Ok(false)` and `Err(_)` both mean the delivery failed.
    async fn handle_event(&self, event: &Event) -> Result<bool, ListenerError>;
}

/// Error raised by a listener while handling an event.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("Handler failed: {0}")]
    HandlerFailed(String),

    #[error("Event processing error: {0}")]
    ProcessingError(String),

    #[error("Listener panicked: {0}")]
    Panicked(String),
}

impl ListenerError {
    /// Build an error from a caught panic payload.
    pub fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic".to_string()
        };
        ListenerError::Panicked(message)
    }
}
