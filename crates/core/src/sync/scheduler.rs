//! Cancellable countdown for the single follow-up flush after a failure.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;

/// Fixed countdown before the one automatic follow-up flush.
pub const FLUSH_RETRY_COUNTDOWN_SECS: u64 = 10;

#[derive(Default)]
struct RetryInner {
    task: Mutex<Option<JoinHandle<()>>>,
    retry_at: Mutex<Option<DateTime<Utc>>>,
}

/// Handle to the scheduled retry countdown, owned by the flush caller.
///
/// Scheduling replaces any previously scheduled countdown. Cancellation
/// aborts the timer and clears the observable ETA with no partial side
/// effects: a canceled countdown never triggers its follow-up.
#[derive(Clone, Default)]
pub struct FlushRetryHandle {
    inner: Arc<RetryInner>,
}

impl FlushRetryHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `follow_up` to run once after the fixed countdown.
    pub fn schedule<F, Fut>(&self, follow_up: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.cancel();

        *self
            .inner
            .retry_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner) =
            Some(Utc::now() + chrono::Duration::seconds(FLUSH_RETRY_COUNTDOWN_SECS as i64));

        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(FLUSH_RETRY_COUNTDOWN_SECS)).await;
            *inner
                .retry_at
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = None;
            follow_up().await;
        });

        *self
            .inner
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }

    /// Abort a pending countdown and clear the "retrying in N" state.
    pub fn cancel(&self) {
        let handle = self
            .inner
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
        *self
            .inner
            .retry_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// When the scheduled follow-up will fire, if one is pending.
    pub fn retry_eta(&self) -> Option<DateTime<Utc>> {
        *self
            .inner
            .retry_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_scheduled(&self) -> bool {
        self.retry_eta().is_some()
    }
}
