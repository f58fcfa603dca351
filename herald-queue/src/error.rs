//! Error types for queue operations.

use crate::execution::ExecutionId;
use thiserror::Error;

/// Result type for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// Queue-specific errors.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Backing store failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Execution not found
    #[error("Pending execution not found: {0}")]
    ExecutionNotFound(ExecutionId),

    /// Processor already running
    #[error("Retry processor already running")]
    ProcessorAlreadyRunning,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}
