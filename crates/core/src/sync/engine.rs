//! Sync engine facade: queueing, flushing with bounded retry, hydration.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::budget::Snapshot;
use crate::errors::{Error, Result};
use crate::sync::executor::SyncExecutor;
use crate::sync::flusher::QueueFlusher;
use crate::sync::merge::merge_snapshots;
use crate::sync::model::{
    FlushOutcome, HydrationMode, HydrationOutcome, Mutation, MutationDraft,
};
use crate::sync::outbox::MutationOutbox;
use crate::sync::scheduler::FlushRetryHandle;
use crate::sync::store::{ConnectivityChecker, RemoteStore, StateStore};

/// Observable engine state for the pending-changes / retrying-in-N UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncEngineStatus {
    pub pending_count: usize,
    pub last_error: Option<String>,
    pub retry_at: Option<DateTime<Utc>>,
    pub syncing: bool,
}

/// Ties the store, outbox, executor, flusher, hydration, and retry countdown
/// together behind one per-process handle.
///
/// All queue and snapshot access for one user is serialized through the
/// hosting application's await chain; the `syncing` flag is the advisory
/// single-in-flight guard for overlapping flush triggers.
pub struct SyncEngine {
    store: Arc<dyn StateStore>,
    remote: Arc<dyn RemoteStore>,
    connectivity: Arc<dyn ConnectivityChecker>,
    outbox: MutationOutbox,
    executor: SyncExecutor,
    flusher: QueueFlusher,
    retry: FlushRetryHandle,
    syncing: AtomicBool,
}

impl SyncEngine {
    pub fn new(
        store: Arc<dyn StateStore>,
        remote: Arc<dyn RemoteStore>,
        connectivity: Arc<dyn ConnectivityChecker>,
    ) -> Self {
        let outbox = MutationOutbox::new(Arc::clone(&store));
        let executor = SyncExecutor::new(outbox.clone(), Arc::clone(&remote));
        let flusher = QueueFlusher::new(outbox.clone(), executor.clone());
        Self {
            store,
            remote,
            connectivity,
            outbox,
            executor,
            flusher,
            retry: FlushRetryHandle::new(),
            syncing: AtomicBool::new(false),
        }
    }

    pub fn outbox(&self) -> &MutationOutbox {
        &self.outbox
    }

    /// Persist a changed snapshot, queue its remote counterpart, then try the
    /// remote write immediately, best-effort.
    ///
    /// The snapshot save always precedes the enqueue: a crash between the two
    /// leaves local state ahead of the queue, never a queued operation with
    /// no local effect. A failed immediate attempt stays queued for the next
    /// flush and never interrupts the caller.
    pub async fn record_change(
        &self,
        snapshot: &Snapshot,
        draft: MutationDraft,
    ) -> Result<Mutation> {
        self.store.save(snapshot).await?;
        let mutation = self.outbox.enqueue(&snapshot.user_id, draft).await?;

        if self.connectivity.is_online().await {
            if let Err(err) = self.executor.try_sync_one(&mutation).await {
                debug!("[Sync] immediate attempt for {} deferred: {err}", mutation.id);
            }
        } else {
            debug!("[Sync] offline, mutation {} queued for later flush", mutation.id);
        }
        Ok(mutation)
    }

    /// One bounded flush pass with the retry escalation policy: when the pass
    /// reports failures, schedule exactly one follow-up flush after the fixed
    /// countdown, then stop — the queue waits for the next natural trigger.
    pub async fn flush_with_retry(&self, user_id: &str, max_batch: usize) -> Result<FlushOutcome> {
        if self.syncing.swap(true, Ordering::SeqCst) {
            debug!("[Sync] flush already in flight for {user_id}, skipping");
            return Ok(FlushOutcome::default());
        }
        // An explicit flush supersedes any pending countdown.
        self.retry.cancel();

        let flushed = self.flusher.flush(user_id, max_batch).await;
        self.syncing.store(false, Ordering::SeqCst);
        let outcome = flushed?;

        if outcome.fail_count > 0 {
            let flusher = self.flusher.clone();
            let user_id = user_id.to_string();
            self.retry.schedule(move || async move {
                match flusher.flush(&user_id, max_batch).await {
                    Ok(outcome) => debug!(
                        "[Sync] scheduled retry for {user_id}: ok={} fail={}",
                        outcome.ok_count, outcome.fail_count
                    ),
                    Err(err) => warn!("[Sync] scheduled retry for {user_id} failed: {err}"),
                }
            });
        }
        Ok(outcome)
    }

    /// Pull the authoritative remote snapshot and reconcile it locally.
    ///
    /// Skipped while offline (no network call, no persist). On success the
    /// result is persisted through the state store, whose change notification
    /// re-triggers downstream recalculation.
    pub async fn hydrate(&self, user_id: &str, mode: HydrationMode) -> Result<HydrationOutcome> {
        if !self.connectivity.is_online().await {
            debug!("[Sync] hydration for {user_id} skipped: offline");
            return Ok(HydrationOutcome::SkippedOffline);
        }

        let Some(remote_snapshot) = self
            .remote
            .fetch_snapshot(user_id)
            .await
            .map_err(Error::Sync)?
        else {
            debug!("[Sync] no remote data yet for {user_id}");
            return Ok(HydrationOutcome::NoRemoteData);
        };

        let hydrated = match mode {
            HydrationMode::Replace => remote_snapshot,
            HydrationMode::Merge => {
                let local = self.store.load(user_id).await;
                merge_snapshots(local, remote_snapshot)
            }
        };
        self.store.save(&hydrated).await?;
        Ok(HydrationOutcome::Hydrated)
    }

    /// Hydrate with the mode derived from queue state: replace when nothing
    /// is pending, merge (local wins) while unsynced work exists.
    pub async fn refresh(&self, user_id: &str) -> Result<HydrationOutcome> {
        let mode = if self.outbox.pending_count(user_id).await == 0 {
            HydrationMode::Replace
        } else {
            HydrationMode::Merge
        };
        self.hydrate(user_id, mode).await
    }

    pub async fn status(&self, user_id: &str) -> SyncEngineStatus {
        let pending = self.outbox.pending(user_id).await;
        let last_error = pending
            .iter()
            .filter(|m| m.last_error.is_some())
            .max_by_key(|m| m.last_attempt_at)
            .and_then(|m| m.last_error.clone());
        SyncEngineStatus {
            pending_count: pending.len(),
            last_error,
            retry_at: self.retry.retry_eta(),
            syncing: self.syncing.load(Ordering::SeqCst),
        }
    }

    pub fn retry_eta(&self) -> Option<DateTime<Utc>> {
        self.retry.retry_eta()
    }

    /// Cancel a pending retry countdown (user navigated away or triggered an
    /// explicit sync).
    pub fn cancel_retry(&self) {
        self.retry.cancel();
    }

    /// Destructive local reset: delete the user's snapshot and queue records.
    pub async fn reset_local(&self, user_id: &str) -> Result<()> {
        self.retry.cancel();
        self.store.clear(user_id).await
    }
}
