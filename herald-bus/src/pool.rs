//! Worker pool for asynchronous delivery.
//!
//! The bus hands every asynchronous delivery task to a [`WorkerPool`] and
//! returns without waiting for it. The pool is owned and sized by the
//! application.

use futures::future::BoxFuture;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Semaphore;
use tracing::{debug, trace};

/// Default number of tasks a [`TokioWorkerPool`] runs at once.
pub const DEFAULT_MAX_CONCURRENCY: usize = 16;

/// Task submission facility.
pub trait WorkerPool: Send + Sync {
    /// Run `task` eventually. Must not wait for it to finish.
    fn submit(&self, task: BoxFuture<'static, ()>);
}

/// Pool that spawns onto the current tokio runtime.
///
/// Submitted tasks are spawned immediately but only run while holding one of
/// `max_concurrency` permits, so at most that many execute at once and the
/// rest wait in line. The line itself is unbounded: `submit` never refuses or
/// blocks, so a producer outpacing the listeners grows the number of parked
/// tasks without limit.
#[derive(Clone)]
pub struct TokioWorkerPool {
    permits: Arc<Semaphore>,
    max_concurrency: usize,
    submitted: Arc<AtomicU64>,
}

impl TokioWorkerPool {
    /// Create a pool running at most `max_concurrency` tasks at once.
    ///
    /// A value of zero is raised to one.
    pub fn new(max_concurrency: usize) -> Self {
        let max_concurrency = max_concurrency.max(1);
        debug!(max_concurrency, "Worker pool initialized");
        Self {
            permits: Arc::new(Semaphore::new(max_concurrency)),
            max_concurrency,
            submitted: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Concurrency limit.
    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Permits not currently held by a running task.
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Tasks submitted since creation.
    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }
}

impl Default for TokioWorkerPool {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONCURRENCY)
    }
}

impl WorkerPool for TokioWorkerPool {
    fn submit(&self, task: BoxFuture<'static, ()>) {
        let permits = self.permits.clone();
        self.submitted.fetch_add(1, Ordering::Relaxed);
        tokio::spawn(async move {
            // the semaphore is never closed
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            task.await;
        });
        trace!("Task submitted to worker pool");
    }
}
