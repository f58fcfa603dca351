//! Error types for publication.

use crate::auth::AuthorizationError;
use herald_events::RegistryError;
use herald_queue::QueueError;
use thiserror::Error;

/// Errors visible to producers.
///
/// Listener failures never appear here; only configuration mistakes,
/// authorization failures and durable-store failures on the reliable path do.
#[derive(Debug, Error)]
pub enum EventBusError {
    /// A reliable delivery could not be recorded
    #[error("Failed to enqueue event for listener '{listener_id}': {source}")]
    Enqueue {
        listener_id: String,
        #[source]
        source: QueueError,
    },

    /// The event was published before its contents were set
    #[error("Event '{category}' has no contents")]
    MissingContents { category: String },

    /// Listener registration failed
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The caller may not publish
    #[error(transparent)]
    Unauthorized(#[from] AuthorizationError),

    /// Queue or processor failure outside of publication
    #[error(transparent)]
    Queue(#[from] QueueError),
}

impl EventBusError {
    /// Whether the error comes from the authorization gate.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, EventBusError::Unauthorized(_))
    }
}
