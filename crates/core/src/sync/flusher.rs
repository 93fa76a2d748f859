//! Orders and drains queued mutations.

use log::{debug, warn};

use crate::errors::{Error, Result};
use crate::sync::executor::SyncExecutor;
use crate::sync::model::FlushOutcome;
use crate::sync::outbox::MutationOutbox;

/// One bounded drain pass over a user's queue.
///
/// Mutations run strictly sequentially in dependency-sorted order; concurrent
/// dispatch could reorder arrivals at the remote store and break the
/// parent-before-child guarantee. The flusher never loops internally — the
/// caller decides whether to schedule a follow-up pass.
#[derive(Clone)]
pub struct QueueFlusher {
    outbox: MutationOutbox,
    executor: SyncExecutor,
}

impl QueueFlusher {
    pub fn new(outbox: MutationOutbox, executor: SyncExecutor) -> Self {
        Self { outbox, executor }
    }

    /// Attempt the first `max_batch` pending mutations in execution order.
    ///
    /// Sync failures are counted and the pass continues; storage failures
    /// abort the pass and propagate.
    pub async fn flush(&self, user_id: &str, max_batch: usize) -> Result<FlushOutcome> {
        let pending = self.outbox.pending(user_id).await;
        let mut outcome = FlushOutcome::default();

        for mutation in pending.into_iter().take(max_batch) {
            match self.executor.try_sync_one(&mutation).await {
                Ok(()) => outcome.ok_count += 1,
                Err(Error::Sync(err)) => {
                    warn!(
                        "[Sync] mutation {} ({:?}) failed, left queued: {err}",
                        mutation.id, mutation.kind
                    );
                    outcome.fail_count += 1;
                }
                Err(other) => return Err(other),
            }
        }

        debug!(
            "[Sync] flush for {user_id}: ok={} fail={}",
            outcome.ok_count, outcome.fail_count
        );
        Ok(outcome)
    }
}
