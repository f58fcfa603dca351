//! Durable delivery queue and retry processor for Herald.
//!
//! Reliable listeners never receive an event directly from the publisher.
//! Instead the bus records a [`PendingExecution`] through the [`DurableQueue`]
//! port and wakes the [`RetryProcessor`], which performs every attempt,
//! including the first one:
//! - 💾 Backlog lives only behind the [`DurableQueue`] port
//! - 🔁 Linear backoff capped at a maximum delay
//! - 🪦 Executions dropped once a listener's failure cap is reached
//! - 👻 Executions of removed listeners discarded
//! - ⏰ Periodic sweeps, or earlier when woken
//!
//! ## Backoff
//!
//! ```
//! use herald_queue::BackoffPolicy;
//! use std::time::Duration;
//!
//! let policy = BackoffPolicy::new(Duration::from_secs(30), Duration::from_secs(3600));
//!
//! assert_eq!(policy.delay_for(3), Duration::from_secs(90));
//! assert_eq!(policy.delay_for(10), Duration::from_secs(3600));
//! assert_eq!(policy.delay_for(500), Duration::from_secs(3600));
//! ```
//!
//! ## Running the processor
//!
//! ```no_run
//! use herald_events::ListenerRegistry;
//! use herald_queue::*;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), QueueError> {
//! let registry = Arc::new(ListenerRegistry::new());
//! let queue = Arc::new(InMemoryQueue::new());
//! let signal = WakeSignal::new();
//!
//! let processor = Arc::new(RetryProcessor::new(
//!     registry,
//!     queue,
//!     signal.clone(),
//!     ProcessorConfig::from_env()?,
//! ));
//! let mut handle = processor.start()?;
//!
//! // after enqueueing an execution
//! signal.wake();
//!
//! handle.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod config;
pub mod error;
pub mod execution;
pub mod processor;
pub mod signal;
pub mod store;

pub use backoff::BackoffPolicy;
pub use config::{DEFAULT_INTERVAL, DEFAULT_PENDING_LOOKAHEAD, ProcessorConfig};
pub use error::{QueueError, QueueResult};
pub use execution::{ExecutionId, PendingExecution, RetryDecision};
pub use processor::{ProcessorHandle, RetryProcessor, SweepReport};
pub use signal::WakeSignal;
pub use store::{DurableQueue, InMemoryQueue, QueueTransaction, run_in_transaction};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::backoff::BackoffPolicy;
    pub use crate::config::ProcessorConfig;
    pub use crate::error::{QueueError, QueueResult};
    pub use crate::execution::{ExecutionId, PendingExecution};
    pub use crate::processor::{ProcessorHandle, RetryProcessor, SweepReport};
    pub use crate::signal::WakeSignal;
    pub use crate::store::{DurableQueue, InMemoryQueue, QueueTransaction, run_in_transaction};
}
