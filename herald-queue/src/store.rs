//! Durable queue port and the in-memory implementation.

use crate::error::{QueueError, QueueResult};
use crate::execution::{ExecutionId, PendingExecution};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use herald_events::PersistableEvent;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::trace;

/// Storage of pending executions.
///
/// This is the only reader and writer of execution records. Every access goes
/// through a transaction so a read-modify-write cycle cannot interleave with
/// another one.
#[async_trait]
pub trait DurableQueue: Send + Sync {
    /// Open a transaction.
    async fn begin(&self) -> QueueResult<Box<dyn QueueTransaction>>;
}

/// Unit of work against a [`DurableQueue`].
///
/// Writes become visible on [`commit`](QueueTransaction::commit). Dropping a
/// transaction without committing discards them.
#[async_trait]
pub trait QueueTransaction: Send {
    /// Store a new execution and return its key.
    async fn create(&mut self, execution: PendingExecution) -> QueueResult<ExecutionId>;

    /// Executions whose next execution time is at or before `before`,
    /// earliest first.
    async fn get_eligible_for_processing(
        &mut self,
        before: DateTime<Utc>,
    ) -> QueueResult<Vec<PendingExecution>>;

    /// Record a failed attempt.
    async fn update_execution(
        &mut self,
        id: ExecutionId,
        next_execution_time: DateTime<Utc>,
        failure_count: u32,
    ) -> QueueResult<()>;

    /// Remove an execution. Removing a missing key is not an error.
    async fn delete_by_key(&mut self, id: ExecutionId) -> QueueResult<()>;

    /// Make all writes of this transaction durable.
    async fn commit(self: Box<Self>) -> QueueResult<()>;
}

/// Run `block` inside one transaction, committing only if it succeeds.
///
/// # Examples
///
/// ```
/// use herald_queue::*;
///
/// # #[tokio::main]
/// # async fn main() -> QueueResult<()> {
/// let queue = InMemoryQueue::new();
/// let due = run_in_transaction(&queue, |tx| {
///     Box::pin(async move { tx.get_eligible_for_processing(chrono::Utc::now()).await })
/// })
/// .await?;
/// assert!(due.is_empty());
/// # Ok(())
/// # }
/// ```
pub async fn run_in_transaction<T, F>(queue: &dyn DurableQueue, block: F) -> QueueResult<T>
where
    T: Send,
    F: for<'t> FnOnce(&'t mut Box<dyn QueueTransaction>) -> BoxFuture<'t, QueueResult<T>> + Send,
{
    let mut tx = queue.begin().await?;
    let value = block(&mut tx).await?;
    tx.commit().await?;
    Ok(value)
}

/// Row layout of the in-memory store; events are kept serialized.
#[derive(Debug, Clone)]
struct StoredExecution {
    listener_id: String,
    event_json: String,
    next_execution_time: DateTime<Utc>,
    failure_count: u32,
}

impl StoredExecution {
    fn encode(execution: &PendingExecution) -> QueueResult<Self> {
        let event_json = execution
            .event
            .to_json()
            .map_err(|e| QueueError::Serialization(e.to_string()))?;
        Ok(Self {
            listener_id: execution.listener_id.clone(),
            event_json,
            next_execution_time: execution.next_execution_time,
            failure_count: execution.failure_count,
        })
    }

    fn decode(&self, id: ExecutionId) -> QueueResult<PendingExecution> {
        let event = PersistableEvent::from_json(&self.event_json)
            .map_err(|e| QueueError::Deserialization(e.to_string()))?;
        Ok(PendingExecution {
            id,
            event,
            listener_id: self.listener_id.clone(),
            next_execution_time: self.next_execution_time,
            failure_count: self.failure_count,
        })
    }
}

type Rows = HashMap<ExecutionId, StoredExecution>;

/// Process-local durable queue.
///
/// Transactions are serialized by a mutex and work on a private copy of the
/// rows, which replaces the shared rows on commit. Opening a transaction
/// therefore costs time proportional to the backlog, enqueues included.
/// Useful for tests and for embedding where surviving a restart is not
/// required and the backlog stays small.
#[derive(Clone, Default)]
pub struct InMemoryQueue {
    rows: Arc<Mutex<Rows>>,
}

impl InMemoryQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored executions.
    pub async fn len(&self) -> usize {
        self.rows.lock().await.len()
    }

    /// Whether the queue holds no execution.
    pub async fn is_empty(&self) -> bool {
        self.rows.lock().await.is_empty()
    }

    /// Fetch one execution by key.
    pub async fn get(&self, id: ExecutionId) -> QueueResult<Option<PendingExecution>> {
        let rows = self.rows.lock().await;
        rows.get(&id).map(|row| row.decode(id)).transpose()
    }

    /// All stored executions, earliest first.
    pub async fn snapshot(&self) -> QueueResult<Vec<PendingExecution>> {
        let rows = self.rows.lock().await;
        sorted(&rows, |_| true)
    }

    /// Remove everything.
    pub async fn clear(&self) {
        self.rows.lock().await.clear();
    }
}

fn sorted(rows: &Rows, keep: impl Fn(&StoredExecution) -> bool) -> QueueResult<Vec<PendingExecution>> {
    let mut executions = rows
        .iter()
        .filter(|(_, row)| keep(row))
        .map(|(id, row)| row.decode(*id))
        .collect::<QueueResult<Vec<_>>>()?;
    executions.sort_by(|a, b| {
        a.next_execution_time
            .cmp(&b.next_execution_time)
            .then_with(|| a.id.cmp(&b.id))
    });
    Ok(executions)
}

#[async_trait]
impl DurableQueue for InMemoryQueue {
    async fn begin(&self) -> QueueResult<Box<dyn QueueTransaction>> {
        let guard = self.rows.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(InMemoryTransaction { guard, working }))
    }
}

struct InMemoryTransaction {
    guard: OwnedMutexGuard<Rows>,
    working: Rows,
}

#[async_trait]
impl QueueTransaction for InMemoryTransaction {
    async fn create(&mut self, execution: PendingExecution) -> QueueResult<ExecutionId> {
        let row = StoredExecution::encode(&execution)?;
        self.working.insert(execution.id, row);
        trace!(execution_id = %execution.id, "Staged pending execution");
        Ok(execution.id)
    }

    async fn get_eligible_for_processing(
        &mut self,
        before: DateTime<Utc>,
    ) -> QueueResult<Vec<PendingExecution>> {
        sorted(&self.working, |row| row.next_execution_time <= before)
    }

    async fn update_execution(
        &mut self,
        id: ExecutionId,
        next_execution_time: DateTime<Utc>,
        failure_count: u32,
    ) -> QueueResult<()> {
        let row = self
            .working
            .get_mut(&id)
            .ok_or(QueueError::ExecutionNotFound(id))?;
        row.next_execution_time = next_execution_time;
        row.failure_count = failure_count;
        Ok(())
    }

    async fn delete_by_key(&mut self, id: ExecutionId) -> QueueResult<()> {
        self.working.remove(&id);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> QueueResult<()> {
        let InMemoryTransaction { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}
