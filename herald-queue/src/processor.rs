//! Background delivery of pending executions.

use crate::backoff::add_duration;
use crate::config::ProcessorConfig;
use crate::error::{QueueError, QueueResult};
use crate::execution::{PendingExecution, RetryDecision};
use crate::signal::WakeSignal;
use crate::store::{DurableQueue, run_in_transaction};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use herald_events::{ListenerError, ListenerRegistry};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Outcome counters of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Delivered and deleted
    pub delivered: usize,
    /// Failed and rescheduled
    pub retried: usize,
    /// Failed for the last allowed time and deleted
    pub dropped: usize,
    /// Target listener no longer registered; deleted without delivery
    pub orphaned: usize,
    /// Outcome could not be written; left untouched for the next sweep
    pub failed_writes: usize,
}

impl SweepReport {
    /// Number of executions looked at.
    pub fn processed(&self) -> usize {
        self.delivered + self.retried + self.dropped + self.orphaned + self.failed_writes
    }
}

enum Outcome {
    Delivered,
    Retried,
    Dropped,
    Orphaned,
}

/// Delivers due pending executions to reliable listeners.
///
/// This is the only component that calls `handle_event` on reliable
/// listeners. Sweeps are serialized: an inline [`sweep`](Self::sweep) waits for
/// the background loop's sweep and the other way round. Each execution's
/// outcome is written in its own transaction, so a crash mid-sweep can at
/// worst repeat a delivery, never lose one.
pub struct RetryProcessor {
    registry: Arc<ListenerRegistry>,
    queue: Arc<dyn DurableQueue>,
    signal: WakeSignal,
    config: ProcessorConfig,
    running: AtomicBool,
    sweep_lock: Mutex<()>,
}

impl RetryProcessor {
    /// Create a processor.
    pub fn new(
        registry: Arc<ListenerRegistry>,
        queue: Arc<dyn DurableQueue>,
        signal: WakeSignal,
        config: ProcessorConfig,
    ) -> Self {
        debug!(
            interval = ?config.interval,
            base_delay = ?config.backoff.base_delay,
            max_delay = ?config.backoff.max_delay,
            "Retry processor configured"
        );
        Self {
            registry,
            queue,
            signal,
            config,
            running: AtomicBool::new(false),
            sweep_lock: Mutex::new(()),
        }
    }

    /// Processor configuration.
    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Signal used to wake the processor.
    pub fn signal(&self) -> &WakeSignal {
        &self.signal
    }

    /// Whether the background loop is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Start the background loop.
    ///
    /// The loop sleeps for the configured interval or until woken, then
    /// sweeps. Only one loop may run per processor.
    pub fn start(self: Arc<Self>) -> QueueResult<ProcessorHandle> {
        if self.running.swap(true, Ordering::AcqRel) {
            warn!("Retry processor already running");
            return Err(QueueError::ProcessorAlreadyRunning);
        }

        info!(interval = ?self.config.interval, "Retry processor started");

        let token = CancellationToken::new();
        let loop_token = token.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = loop_token.cancelled() => break,
                    _ = tokio::time::sleep(self.config.interval) => {}
                    _ = self.signal.notified() => {}
                }

                if loop_token.is_cancelled() {
                    break;
                }

                match self.sweep().await {
                    Ok(report) if report.processed() > 0 => {
                        debug!(?report, "Retry sweep finished");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!(error = %e, "Retry sweep failed");
                    }
                }
            }

            self.running.store(false, Ordering::Release);
            info!("Retry processor stopped");
        });

        Ok(ProcessorHandle {
            token,
            handle: Some(handle),
        })
    }

    /// Attempt every execution that is due now.
    pub async fn sweep(&self) -> QueueResult<SweepReport> {
        self.sweep_at(Utc::now()).await
    }

    /// Attempt every execution due at `now`.
    ///
    /// A failure to read the backlog is returned. A failure to write one
    /// execution's outcome is logged and counted; that execution keeps its
    /// previous state and is attempted again on a later sweep.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> QueueResult<SweepReport> {
        let _sweeping = self.sweep_lock.lock().await;

        let due = run_in_transaction(self.queue.as_ref(), |tx| {
            Box::pin(async move { tx.get_eligible_for_processing(now).await })
        })
        .await?;

        let mut report = SweepReport::default();
        for execution in due {
            let execution_id = execution.id;
            match self.process(execution, now).await {
                Ok(Outcome::Delivered) => report.delivered += 1,
                Ok(Outcome::Retried) => report.retried += 1,
                Ok(Outcome::Dropped) => report.dropped += 1,
                Ok(Outcome::Orphaned) => report.orphaned += 1,
                Err(e) => {
                    error!(
                        execution_id = %execution_id,
                        error = %e,
                        "Failed to record outcome of pending execution"
                    );
                    report.failed_writes += 1;
                }
            }
        }

        Ok(report)
    }

    /// Number of executions that become due within the configured lookahead.
    pub async fn pending_count(&self) -> QueueResult<usize> {
        let before = add_duration(Utc::now(), self.config.pending_lookahead);
        let eligible = run_in_transaction(self.queue.as_ref(), |tx| {
            Box::pin(async move { tx.get_eligible_for_processing(before).await })
        })
        .await?;
        Ok(eligible.len())
    }

    async fn process(&self, execution: PendingExecution, now: DateTime<Utc>) -> QueueResult<Outcome> {
        let id = execution.id;

        let Some(listener) = self.registry.get_by_id(&execution.listener_id) else {
            info!(
                execution_id = %id,
                listener_id = %execution.listener_id,
                "Dropping pending execution of a listener that is no longer registered"
            );
            self.delete(execution).await?;
            return Ok(Outcome::Orphaned);
        };

        let delivered = match AssertUnwindSafe(listener.handle_event(execution.event.event()))
            .catch_unwind()
            .await
        {
            Ok(Ok(delivered)) => delivered,
            Ok(Err(e)) => {
                debug!(execution_id = %id, listener_id = %execution.listener_id, error = %e, "Listener failed");
                false
            }
            Err(panic) => {
                let e = ListenerError::from_panic(panic);
                warn!(execution_id = %id, listener_id = %execution.listener_id, error = %e, "Listener panicked");
                false
            }
        };

        if delivered {
            self.delete(execution).await?;
            return Ok(Outcome::Delivered);
        }

        match execution.after_failure(listener.max_failures(), &self.config.backoff, now) {
            RetryDecision::Drop { failure_count } => {
                warn!(
                    execution_id = %id,
                    listener_id = %execution.listener_id,
                    category = %execution.event.category,
                    failure_count,
                    "Giving up on event delivery after too many failures"
                );
                self.delete(execution).await?;
                Ok(Outcome::Dropped)
            }
            RetryDecision::Retry {
                next_execution_time,
                failure_count,
            } => {
                debug!(
                    execution_id = %id,
                    listener_id = %execution.listener_id,
                    failure_count,
                    next_execution_time = %next_execution_time,
                    "Rescheduled failed event delivery"
                );
                run_in_transaction(self.queue.as_ref(), |tx| {
                    Box::pin(async move {
                        tx.update_execution(id, next_execution_time, failure_count)
                            .await
                    })
                })
                .await?;
                Ok(Outcome::Retried)
            }
        }
    }

    async fn delete(&self, execution: PendingExecution) -> QueueResult<()> {
        let id = execution.id;
        run_in_transaction(self.queue.as_ref(), |tx| {
            Box::pin(async move { tx.delete_by_key(id).await })
        })
        .await
    }
}

/// Handle to a running retry processor.
///
/// Dropping the handle cancels the loop without waiting for it.
pub struct ProcessorHandle {
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl ProcessorHandle {
    /// Stop the loop and wait for the current sweep to finish.
    ///
    /// Calling it again is a no-op.
    pub async fn shutdown(&mut self) {
        self.token.cancel();
        if let Some(handle) = self.handle.take()
            && let Err(e) = handle.await
        {
            error!(error = %e, "Retry processor task ended abnormally");
        }
    }

    /// Whether shutdown has been requested.
    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for ProcessorHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
