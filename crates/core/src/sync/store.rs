//! Trait seams between the sync engine and its collaborators.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::budget::Snapshot;
use crate::errors::{Result, SyncError};
use crate::sync::MutationQueue;

/// Remote entity collections the queue can write to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityCollection {
    Profiles,
    IncomeSources,
    Cycles,
    Categories,
    Transactions,
}

impl EntityCollection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Profiles => "profiles",
            Self::IncomeSources => "income_sources",
            Self::Cycles => "cycles",
            Self::Categories => "categories",
            Self::Transactions => "transactions",
        }
    }
}

/// Durable, process-independent storage for one snapshot record and one
/// queue record per user.
///
/// Read failures degrade to the empty default (losing cached state beats
/// crashing); write failures propagate, since the enqueue-after-save
/// invariant depends on saves being confirmed.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Last persisted snapshot, or the empty default when the record is
    /// missing or fails its version/ownership check.
    async fn load(&self, user_id: &str) -> Snapshot;

    /// Atomically replace the user's snapshot record, stamping `updated_at`.
    async fn save(&self, snapshot: &Snapshot) -> Result<()>;

    /// Last persisted queue, with the same degradation contract as `load`.
    async fn load_queue(&self, user_id: &str) -> MutationQueue;

    /// Atomically replace the user's queue record, stamping `updated_at`.
    async fn save_queue(&self, queue: &MutationQueue) -> Result<()>;

    /// Delete both records; only for explicit user-initiated reset.
    async fn clear(&self, user_id: &str) -> Result<()>;
}

pub type RemoteResult<T> = std::result::Result<T, SyncError>;

/// Per-entity write surface of the remote relational store.
///
/// Upserts are keyed by primary id, so replaying one after an unconfirmed
/// success is safe; deletes are filtered by id and owner id together.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn upsert(
        &self,
        collection: EntityCollection,
        record: &Map<String, Value>,
    ) -> RemoteResult<()>;

    async fn delete(&self, collection: EntityCollection, id: &str, user_id: &str)
        -> RemoteResult<()>;

    /// Bulk delete of every record a user owns in one collection.
    async fn delete_all(&self, collection: EntityCollection, user_id: &str) -> RemoteResult<()>;

    /// Clear the top-level preference fields on the user's profile record.
    async fn clear_preferences(&self, user_id: &str) -> RemoteResult<()>;

    /// Authoritative remote snapshot, or `None` when the user record and
    /// every collection are empty ("no remote data yet", distinct from an
    /// empty snapshot).
    async fn fetch_snapshot(&self, user_id: &str) -> RemoteResult<Option<Snapshot>>;
}

/// Best-effort online/offline probe.
///
/// Fails closed to offline; this is a conservative optimization, never a
/// correctness mechanism — the executor handles per-attempt failures on its
/// own regardless of the probe's verdict.
#[async_trait]
pub trait ConnectivityChecker: Send + Sync {
    async fn is_online(&self) -> bool;
}
