//! Wake-up signal for the retry processor.

use std::sync::Arc;
use tokio::sync::Notify;

/// Wakes the retry processor ahead of its next scheduled sweep.
///
/// A wake sent while nobody waits is remembered, so the next wait returns
/// immediately. Several wakes before the next wait collapse into one.
#[derive(Debug, Clone, Default)]
pub struct WakeSignal {
    notify: Arc<Notify>,
}

impl WakeSignal {
    /// Create a new signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a sweep.
    pub fn wake(&self) {
        self.notify.notify_one();
    }

    /// Wait until woken.
    pub async fn notified(&self) {
        self.notify.notified().await;
    }
}
