//! Persisted mutation outbox, one queue record per user.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::errors::Result;
use crate::sync::model::{
    sort_for_execution, BookkeepingPatch, Mutation, MutationDraft, MutationQueue,
};
use crate::sync::store::StateStore;

/// Queue bookkeeping over the state store.
///
/// Callers must persist the corresponding snapshot change before calling
/// `enqueue`, so a crash between the two leaves local state ahead of the
/// queue — never a queued operation with no local effect.
#[derive(Clone)]
pub struct MutationOutbox {
    store: Arc<dyn StateStore>,
}

impl MutationOutbox {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    /// Assign id and bookkeeping defaults, prepend to the persisted queue
    /// (most-recent-first storage order), and return the stored mutation.
    pub async fn enqueue(&self, user_id: &str, draft: MutationDraft) -> Result<Mutation> {
        let mutation = Mutation {
            id: Uuid::now_v7().to_string(),
            user_id: user_id.to_string(),
            created_at: Utc::now(),
            kind: draft.kind,
            payload: draft.payload,
            retry_count: 0,
            last_attempt_at: None,
            last_error: None,
        };

        let mut queue = self.store.load_queue(user_id).await;
        queue.mutations.insert(0, mutation.clone());
        self.store.save_queue(&queue).await?;
        Ok(mutation)
    }

    /// Patch one mutation's bookkeeping fields without touching payload,
    /// kind, or id. No-op when the mutation is already gone.
    pub async fn update_bookkeeping(
        &self,
        user_id: &str,
        mutation_id: &str,
        patch: BookkeepingPatch,
    ) -> Result<()> {
        let mut queue = self.store.load_queue(user_id).await;
        let Some(mutation) = queue.mutations.iter_mut().find(|m| m.id == mutation_id) else {
            return Ok(());
        };
        if let Some(retry_count) = patch.retry_count {
            mutation.retry_count = retry_count;
        }
        if let Some(last_attempt_at) = patch.last_attempt_at {
            mutation.last_attempt_at = Some(last_attempt_at);
        }
        if let Some(last_error) = patch.last_error {
            mutation.last_error = Some(last_error);
        }
        self.store.save_queue(&queue).await
    }

    /// Remove one mutation by id; no-op when already absent, which keeps
    /// at-least-once re-delivery safe.
    pub async fn remove(&self, user_id: &str, mutation_id: &str) -> Result<()> {
        let mut queue = self.store.load_queue(user_id).await;
        let before = queue.mutations.len();
        queue.mutations.retain(|m| m.id != mutation_id);
        if queue.mutations.len() == before {
            return Ok(());
        }
        self.store.save_queue(&queue).await
    }

    /// Pending mutations in execution order.
    pub async fn pending(&self, user_id: &str) -> Vec<Mutation> {
        let mut mutations = self.store.load_queue(user_id).await.mutations;
        sort_for_execution(&mut mutations);
        mutations
    }

    pub async fn pending_count(&self, user_id: &str) -> usize {
        self.store.load_queue(user_id).await.mutations.len()
    }
}
