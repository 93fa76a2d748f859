//! Applies one queued mutation against the remote store.

use std::sync::Arc;

use chrono::Utc;
use log::debug;
use uuid::Uuid;

use crate::errors::{Error, Result, SyncError};
use crate::sync::model::{BookkeepingPatch, Mutation, MutationKind};
use crate::sync::outbox::MutationOutbox;
use crate::sync::store::{EntityCollection, RemoteResult, RemoteStore};

/// Executes single mutations: bookkeeping first, then validation, then the
/// remote write; remove on success, record the error and keep on failure.
#[derive(Clone)]
pub struct SyncExecutor {
    outbox: MutationOutbox,
    remote: Arc<dyn RemoteStore>,
}

impl SyncExecutor {
    pub fn new(outbox: MutationOutbox, remote: Arc<dyn RemoteStore>) -> Self {
        Self { outbox, remote }
    }

    /// Try to apply one mutation remotely.
    ///
    /// Bookkeeping (attempt time, retry count) is persisted before the
    /// dispatch so a crash mid-attempt leaves an accurate retry count rather
    /// than a silent retry-forever. On failure the mutation stays queued
    /// with its last error recorded.
    pub async fn try_sync_one(&self, mutation: &Mutation) -> Result<()> {
        self.outbox
            .update_bookkeeping(
                &mutation.user_id,
                &mutation.id,
                BookkeepingPatch {
                    retry_count: Some(mutation.retry_count + 1),
                    last_attempt_at: Some(Utc::now()),
                    last_error: None,
                },
            )
            .await?;

        // Malformed ids never come from user input, only corrupted local
        // state; reject before sending a doomed request.
        if let Err(err) = validate_identifiers(mutation) {
            self.record_failure(mutation, &err).await?;
            return Err(Error::Sync(err));
        }

        match self.dispatch(mutation).await {
            Ok(()) => {
                debug!(
                    "[Sync] mutation {} ({:?}) confirmed, removing from queue",
                    mutation.id, mutation.kind
                );
                self.outbox.remove(&mutation.user_id, &mutation.id).await?;
                Ok(())
            }
            Err(err) => {
                self.record_failure(mutation, &err).await?;
                Err(Error::Sync(err))
            }
        }
    }

    async fn record_failure(&self, mutation: &Mutation, err: &SyncError) -> Result<()> {
        self.outbox
            .update_bookkeeping(
                &mutation.user_id,
                &mutation.id,
                BookkeepingPatch {
                    retry_count: None,
                    last_attempt_at: None,
                    last_error: Some(format!("{}: {}", err.code(), err)),
                },
            )
            .await
    }

    async fn dispatch(&self, mutation: &Mutation) -> RemoteResult<()> {
        let user_id = mutation.user_id.as_str();
        match mutation.kind {
            MutationKind::UpsertProfile => {
                self.remote
                    .upsert(EntityCollection::Profiles, &mutation.payload)
                    .await
            }
            MutationKind::UpsertIncomeSource => {
                self.remote
                    .upsert(EntityCollection::IncomeSources, &mutation.payload)
                    .await
            }
            MutationKind::UpsertCycle => {
                self.remote
                    .upsert(EntityCollection::Cycles, &mutation.payload)
                    .await
            }
            MutationKind::UpsertCategory => {
                self.remote
                    .upsert(EntityCollection::Categories, &mutation.payload)
                    .await
            }
            MutationKind::InsertTransaction | MutationKind::UpdateTransaction => {
                self.remote
                    .upsert(EntityCollection::Transactions, &mutation.payload)
                    .await
            }
            MutationKind::DeleteIncomeSource => {
                self.delete(EntityCollection::IncomeSources, mutation).await
            }
            MutationKind::DeleteCycle => self.delete(EntityCollection::Cycles, mutation).await,
            MutationKind::DeleteCategory => {
                self.delete(EntityCollection::Categories, mutation).await
            }
            MutationKind::DeleteTransaction => {
                self.delete(EntityCollection::Transactions, mutation).await
            }
            MutationKind::ResetBudget => {
                // Children before parents; partial completion surfaces as a
                // regular failure and the reset retries from the top, which
                // is safe because every step is idempotent.
                self.remote
                    .delete_all(EntityCollection::Transactions, user_id)
                    .await?;
                self.remote
                    .delete_all(EntityCollection::Categories, user_id)
                    .await?;
                self.remote
                    .delete_all(EntityCollection::Cycles, user_id)
                    .await?;
                self.remote
                    .delete_all(EntityCollection::IncomeSources, user_id)
                    .await?;
                self.remote.clear_preferences(user_id).await
            }
        }
    }

    async fn delete(&self, collection: EntityCollection, mutation: &Mutation) -> RemoteResult<()> {
        let id = payload_str(mutation, "id").unwrap_or_default();
        self.remote
            .delete(collection, id, &mutation.user_id)
            .await
    }
}

fn payload_str<'a>(mutation: &'a Mutation, key: &str) -> Option<&'a str> {
    mutation.payload.get(key).and_then(|value| value.as_str())
}

fn require_uuid(value: &str, field: &str) -> std::result::Result<(), SyncError> {
    Uuid::parse_str(value)
        .map(|_| ())
        .map_err(|_| SyncError::MalformedIdentifier(format!("{field} '{value}' is not a valid UUID")))
}

fn require_payload_uuid(mutation: &Mutation, key: &str) -> std::result::Result<(), SyncError> {
    match payload_str(mutation, key) {
        Some(value) => require_uuid(value, key),
        None => Err(SyncError::MalformedIdentifier(format!(
            "payload field '{key}' is missing"
        ))),
    }
}

/// Validate every identifier a mutation carries — its own id and any foreign
/// id — before dispatch.
pub(crate) fn validate_identifiers(mutation: &Mutation) -> std::result::Result<(), SyncError> {
    require_uuid(&mutation.user_id, "userId")?;
    match mutation.kind {
        MutationKind::UpsertProfile | MutationKind::ResetBudget => Ok(()),
        MutationKind::UpsertIncomeSource | MutationKind::UpsertCycle => {
            require_payload_uuid(mutation, "id")
        }
        MutationKind::UpsertCategory => {
            require_payload_uuid(mutation, "id")?;
            require_payload_uuid(mutation, "cycleId")
        }
        MutationKind::InsertTransaction | MutationKind::UpdateTransaction => {
            require_payload_uuid(mutation, "id")?;
            require_payload_uuid(mutation, "cycleId")?;
            match payload_str(mutation, "categoryId") {
                Some(category_id) => require_uuid(category_id, "categoryId"),
                None => Ok(()),
            }
        }
        MutationKind::DeleteIncomeSource
        | MutationKind::DeleteCycle
        | MutationKind::DeleteCategory
        | MutationKind::DeleteTransaction => require_payload_uuid(mutation, "id"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::{json, Value};

    const USER_ID: &str = "6f9619ff-8b86-4d01-b42d-00cf4fc964ff";
    const ENTITY_ID: &str = "11111111-1111-4111-8111-111111111111";
    const CYCLE_ID: &str = "22222222-2222-4222-8222-222222222222";

    fn mutation(kind: MutationKind, payload: Value) -> Mutation {
        let Value::Object(payload) = payload else {
            panic!("payload must be an object");
        };
        Mutation {
            id: "mutation-1".to_string(),
            user_id: USER_ID.to_string(),
            created_at: Utc::now(),
            kind,
            payload,
            retry_count: 0,
            last_attempt_at: None,
            last_error: None,
        }
    }

    #[test]
    fn upsert_requires_well_formed_entity_id() {
        let bad = mutation(MutationKind::UpsertCycle, json!({ "id": "not-a-uuid" }));
        assert!(matches!(
            validate_identifiers(&bad),
            Err(SyncError::MalformedIdentifier(_))
        ));

        let good = mutation(MutationKind::UpsertCycle, json!({ "id": ENTITY_ID }));
        assert!(validate_identifiers(&good).is_ok());
    }

    #[test]
    fn category_upsert_validates_foreign_cycle_id() {
        let bad = mutation(
            MutationKind::UpsertCategory,
            json!({ "id": ENTITY_ID, "cycleId": "corrupted" }),
        );
        assert!(matches!(
            validate_identifiers(&bad),
            Err(SyncError::MalformedIdentifier(_))
        ));
    }

    #[test]
    fn transaction_category_id_is_optional_but_validated_when_present() {
        let without = mutation(
            MutationKind::InsertTransaction,
            json!({ "id": ENTITY_ID, "cycleId": CYCLE_ID }),
        );
        assert!(validate_identifiers(&without).is_ok());

        let with_bad = mutation(
            MutationKind::InsertTransaction,
            json!({ "id": ENTITY_ID, "cycleId": CYCLE_ID, "categoryId": "nope" }),
        );
        assert!(matches!(
            validate_identifiers(&with_bad),
            Err(SyncError::MalformedIdentifier(_))
        ));
    }

    #[test]
    fn delete_requires_own_id() {
        let missing = mutation(MutationKind::DeleteCategory, json!({}));
        assert!(matches!(
            validate_identifiers(&missing),
            Err(SyncError::MalformedIdentifier(_))
        ));
    }

    #[test]
    fn reset_only_validates_the_owner_id() {
        let reset = mutation(MutationKind::ResetBudget, json!({}));
        assert!(validate_identifiers(&reset).is_ok());

        let mut corrupted = reset;
        corrupted.user_id = "garbage".to_string();
        assert!(matches!(
            validate_identifiers(&corrupted),
            Err(SyncError::MalformedIdentifier(_))
        ));
    }
}
