//! Mutation queue domain models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{Error, Result};

/// Closed set of remote operations a local state change can require.
///
/// Every kind has an exhaustive handler in the sync executor; the compiler
/// enforces that adding a kind here cannot leave an unhandled case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    UpsertProfile,
    UpsertIncomeSource,
    DeleteIncomeSource,
    UpsertCycle,
    DeleteCycle,
    UpsertCategory,
    DeleteCategory,
    InsertTransaction,
    UpdateTransaction,
    DeleteTransaction,
    ResetBudget,
}

impl MutationKind {
    /// Fixed cross-entity dependency rank used as the flush tie-breaker.
    ///
    /// A category references its cycle by foreign key, and a transaction
    /// references a cycle and optionally a category; the parent write must
    /// reach the remote store first or the dependent write fails avoidably.
    pub fn dependency_rank(self) -> u8 {
        match self {
            Self::UpsertProfile => 0,
            Self::UpsertCycle => 1,
            Self::UpsertCategory => 2,
            Self::InsertTransaction => 3,
            Self::UpdateTransaction => 4,
            Self::DeleteTransaction => 5,
            Self::UpsertIncomeSource
            | Self::DeleteIncomeSource
            | Self::DeleteCycle
            | Self::DeleteCategory
            | Self::ResetBudget => 6,
        }
    }
}

/// One pending remote operation derived from a local state change.
///
/// Immutable except for the bookkeeping fields (`retry_count`,
/// `last_attempt_at`, `last_error`) until it is removed on confirmed remote
/// success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mutation {
    pub id: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub kind: MutationKind,
    pub payload: Map<String, Value>,
    pub retry_count: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempt_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// A mutation before the outbox assigns id, timestamps, and retry counters.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationDraft {
    pub kind: MutationKind,
    pub payload: Map<String, Value>,
}

impl MutationDraft {
    pub fn new(kind: MutationKind, payload: Map<String, Value>) -> Self {
        Self { kind, payload }
    }

    /// Build a draft from any serializable entity; the entity must serialize
    /// to a flat JSON object matching the remote write shape.
    pub fn from_entity<T: serde::Serialize>(kind: MutationKind, entity: &T) -> Result<Self> {
        match serde_json::to_value(entity)? {
            Value::Object(payload) => Ok(Self { kind, payload }),
            other => Err(Error::InvalidPayload(format!(
                "mutation payload must be a JSON object, got {other}"
            ))),
        }
    }
}

/// Partial update of one mutation's bookkeeping fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookkeepingPatch {
    pub retry_count: Option<i32>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// The persisted, ordered collection of a user's pending mutations.
///
/// Storage order is most-recent-first (prepend on enqueue); execution order
/// is re-derived at flush time by [`sort_for_execution`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationQueue {
    pub user_id: String,
    pub mutations: Vec<Mutation>,
    pub updated_at: DateTime<Utc>,
}

impl MutationQueue {
    pub fn empty(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            mutations: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }
}

/// Sort mutations into execution order: `created_at` ascending to preserve
/// causal intent, dependency rank as the tie-break. The sort is stable, so
/// kinds with no ordering constraint keep their relative order.
pub fn sort_for_execution(mutations: &mut [Mutation]) {
    mutations.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.kind.dependency_rank().cmp(&b.kind.dependency_rank()))
    });
}

/// Result of one bounded flush pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlushOutcome {
    pub ok_count: usize,
    pub fail_count: usize,
}

/// How a remote snapshot is reconciled into local state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HydrationMode {
    /// Remote becomes local verbatim; only safe when the queue is empty.
    Replace,
    /// Per-entity id merge with local wins; used while unsynced work exists.
    Merge,
}

/// Outcome of one hydration attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HydrationOutcome {
    Hydrated,
    SkippedOffline,
    NoRemoteData,
}

impl HydrationOutcome {
    pub fn hydrated(self) -> bool {
        matches!(self, Self::Hydrated)
    }
}
