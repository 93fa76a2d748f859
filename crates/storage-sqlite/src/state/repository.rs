//! SQLite-backed [`StateStore`]: one snapshot record and one queue record
//! per user, each a versioned JSON payload.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use log::warn;

use centavo_core::budget::Snapshot;
use centavo_core::errors::Result;
use centavo_core::notify::ChangeNotifier;
use centavo_core::sync::{MutationQueue, StateStore};

use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::StorageError;
use crate::schema::{queue_records, snapshot_records};
use crate::state::model::{QueueRecordDB, SnapshotRecordDB};

/// Version stamp written into every record; bumped when the payload shape
/// changes incompatibly. Records with a different version are discarded on
/// read rather than migrated — the remote store re-hydrates the state.
pub const STATE_SCHEMA_VERSION: i32 = 1;

pub struct SqliteStateStore {
    pool: Arc<DbPool>,
    writer: WriteHandle,
    notifier: Arc<ChangeNotifier>,
}

impl SqliteStateStore {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle, notifier: Arc<ChangeNotifier>) -> Self {
        Self {
            pool,
            writer,
            notifier,
        }
    }

    pub fn notifier(&self) -> &Arc<ChangeNotifier> {
        &self.notifier
    }

    fn load_snapshot_record(&self, user_id: &str) -> Result<Option<SnapshotRecordDB>> {
        let mut conn = get_connection(&self.pool)?;
        snapshot_records::table
            .find(user_id)
            .first::<SnapshotRecordDB>(&mut conn)
            .optional()
            .map_err(|e| StorageError::from(e).into())
    }

    fn load_queue_record(&self, user_id: &str) -> Result<Option<QueueRecordDB>> {
        let mut conn = get_connection(&self.pool)?;
        queue_records::table
            .find(user_id)
            .first::<QueueRecordDB>(&mut conn)
            .optional()
            .map_err(|e| StorageError::from(e).into())
    }
}

fn decode_snapshot(record: SnapshotRecordDB, user_id: &str) -> Option<Snapshot> {
    if record.schema_version != STATE_SCHEMA_VERSION {
        warn!(
            "[Storage] discarding snapshot record for {user_id}: schema version {} != {}",
            record.schema_version, STATE_SCHEMA_VERSION
        );
        return None;
    }
    let snapshot = match serde_json::from_str::<Snapshot>(&record.payload) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            warn!("[Storage] discarding unreadable snapshot record for {user_id}: {e}");
            return None;
        }
    };
    if snapshot.user_id != user_id {
        warn!(
            "[Storage] discarding snapshot record for {user_id}: payload owned by {}",
            snapshot.user_id
        );
        return None;
    }
    Some(snapshot)
}

fn decode_queue(record: QueueRecordDB, user_id: &str) -> Option<MutationQueue> {
    if record.schema_version != STATE_SCHEMA_VERSION {
        warn!(
            "[Storage] discarding queue record for {user_id}: schema version {} != {}",
            record.schema_version, STATE_SCHEMA_VERSION
        );
        return None;
    }
    let queue = match serde_json::from_str::<MutationQueue>(&record.payload) {
        Ok(queue) => queue,
        Err(e) => {
            warn!("[Storage] discarding unreadable queue record for {user_id}: {e}");
            return None;
        }
    };
    if queue.user_id != user_id {
        warn!(
            "[Storage] discarding queue record for {user_id}: payload owned by {}",
            queue.user_id
        );
        return None;
    }
    Some(queue)
}

#[async_trait]
impl StateStore for SqliteStateStore {
    async fn load(&self, user_id: &str) -> Snapshot {
        match self.load_snapshot_record(user_id) {
            Ok(record) => record
                .and_then(|r| decode_snapshot(r, user_id))
                .unwrap_or_else(|| Snapshot::empty(user_id)),
            Err(e) => {
                warn!("[Storage] snapshot read for {user_id} failed, using empty: {e}");
                Snapshot::empty(user_id)
            }
        }
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<()> {
        let mut stored = snapshot.clone();
        stored.updated_at = Utc::now();
        let row = SnapshotRecordDB {
            user_id: stored.user_id.clone(),
            schema_version: STATE_SCHEMA_VERSION,
            payload: serde_json::to_string(&stored)?,
            updated_at: stored.updated_at.to_rfc3339(),
        };

        self.writer
            .exec(move |conn| {
                diesel::insert_into(snapshot_records::table)
                    .values(&row)
                    .on_conflict(snapshot_records::user_id)
                    .do_update()
                    .set(&row)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await?;

        self.notifier.notify(&snapshot.user_id);
        Ok(())
    }

    async fn load_queue(&self, user_id: &str) -> MutationQueue {
        match self.load_queue_record(user_id) {
            Ok(record) => record
                .and_then(|r| decode_queue(r, user_id))
                .unwrap_or_else(|| MutationQueue::empty(user_id)),
            Err(e) => {
                warn!("[Storage] queue read for {user_id} failed, using empty: {e}");
                MutationQueue::empty(user_id)
            }
        }
    }

    async fn save_queue(&self, queue: &MutationQueue) -> Result<()> {
        let mut stored = queue.clone();
        stored.updated_at = Utc::now();
        let row = QueueRecordDB {
            user_id: stored.user_id.clone(),
            schema_version: STATE_SCHEMA_VERSION,
            payload: serde_json::to_string(&stored)?,
            updated_at: stored.updated_at.to_rfc3339(),
        };

        self.writer
            .exec(move |conn| {
                diesel::insert_into(queue_records::table)
                    .values(&row)
                    .on_conflict(queue_records::user_id)
                    .do_update()
                    .set(&row)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await?;

        self.notifier.notify(&queue.user_id);
        Ok(())
    }

    async fn clear(&self, user_id: &str) -> Result<()> {
        let owner = user_id.to_string();
        self.writer
            .exec(move |conn| {
                diesel::delete(snapshot_records::table.find(&owner))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                diesel::delete(queue_records::table.find(&owner))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await?;

        self.notifier.notify(user_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tokio::sync::broadcast::Receiver;

    use centavo_core::budget::BudgetCycle;
    use centavo_core::notify::StateChange;
    use centavo_core::sync::{Mutation, MutationKind};
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use serde_json::Map;

    use crate::db::{create_pool, init, run_migrations, spawn_writer};

    const USER_ID: &str = "6f9619ff-8b86-4d01-b42d-00cf4fc964ff";

    fn setup_store() -> SqliteStateStore {
        let app_data = tempdir()
            .expect("tempdir")
            .keep()
            .to_string_lossy()
            .to_string();
        let db_path = init(&app_data).expect("init db");
        run_migrations(&db_path).expect("migrate db");
        let pool = create_pool(&db_path).expect("create pool");
        let writer = spawn_writer(pool.as_ref().clone());
        SqliteStateStore::new(pool, writer, Arc::new(ChangeNotifier::new()))
    }

    fn sample_snapshot() -> Snapshot {
        let mut snapshot = Snapshot::empty(USER_ID);
        snapshot.cycles.push(BudgetCycle {
            id: "11111111-1111-4111-8111-111111111111".to_string(),
            user_id: USER_ID.to_string(),
            name: "August".to_string(),
            starts_on: NaiveDate::from_ymd_opt(2026, 8, 1).unwrap(),
            ends_on: NaiveDate::from_ymd_opt(2026, 8, 31).unwrap(),
            expected_income: Decimal::new(350000, 2),
        });
        snapshot
    }

    fn sample_queue() -> MutationQueue {
        let mut queue = MutationQueue::empty(USER_ID);
        queue.mutations.push(Mutation {
            id: "mutation-1".to_string(),
            user_id: USER_ID.to_string(),
            created_at: Utc::now(),
            kind: MutationKind::UpsertCycle,
            payload: Map::new(),
            retry_count: 0,
            last_attempt_at: None,
            last_error: None,
        });
        queue
    }

    fn drain(rx: &mut Receiver<StateChange>) -> Vec<StateChange> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn missing_records_load_as_empty() {
        let store = setup_store();
        assert!(store.load(USER_ID).await.is_empty());
        assert!(store.load_queue(USER_ID).await.is_empty());
    }

    #[tokio::test]
    async fn snapshot_round_trips_and_is_stamped() {
        let store = setup_store();
        let snapshot = sample_snapshot();
        let before = Utc::now();

        store.save(&snapshot).await.expect("save");
        let loaded = store.load(USER_ID).await;
        assert_eq!(loaded.cycles, snapshot.cycles);
        assert!(loaded.updated_at >= before);
    }

    #[tokio::test]
    async fn queue_round_trips() {
        let store = setup_store();
        let queue = sample_queue();

        store.save_queue(&queue).await.expect("save queue");
        let loaded = store.load_queue(USER_ID).await;
        assert_eq!(loaded.mutations, queue.mutations);
    }

    #[tokio::test]
    async fn schema_version_mismatch_discards_the_record() {
        let store = setup_store();
        store.save(&sample_snapshot()).await.expect("save");

        let mut conn = get_connection(&store.pool).expect("conn");
        diesel::update(snapshot_records::table.find(USER_ID))
            .set(snapshot_records::schema_version.eq(STATE_SCHEMA_VERSION + 1))
            .execute(&mut conn)
            .expect("bump version");

        assert!(store.load(USER_ID).await.is_empty());
    }

    #[tokio::test]
    async fn foreign_owner_payload_is_discarded() {
        let store = setup_store();
        store.save(&sample_snapshot()).await.expect("save");

        // Simulate a record keyed under another user but carrying this
        // user's payload.
        let mut conn = get_connection(&store.pool).expect("conn");
        let record = snapshot_records::table
            .find(USER_ID)
            .first::<SnapshotRecordDB>(&mut conn)
            .expect("record");
        let other = "other-user";
        diesel::insert_into(snapshot_records::table)
            .values(SnapshotRecordDB {
                user_id: other.to_string(),
                ..record
            })
            .execute(&mut conn)
            .expect("insert foreign record");

        assert!(store.load(other).await.is_empty());
    }

    #[tokio::test]
    async fn unreadable_payload_loads_as_empty() {
        let store = setup_store();
        store.save(&sample_snapshot()).await.expect("save");

        let mut conn = get_connection(&store.pool).expect("conn");
        diesel::update(snapshot_records::table.find(USER_ID))
            .set(snapshot_records::payload.eq("{not json"))
            .execute(&mut conn)
            .expect("corrupt payload");

        assert!(store.load(USER_ID).await.is_empty());
    }

    #[tokio::test]
    async fn clear_removes_both_records() {
        let store = setup_store();
        store.save(&sample_snapshot()).await.expect("save");
        store.save_queue(&sample_queue()).await.expect("save queue");

        store.clear(USER_ID).await.expect("clear");
        assert!(store.load(USER_ID).await.is_empty());
        assert!(store.load_queue(USER_ID).await.is_empty());
    }

    #[tokio::test]
    async fn saves_notify_subscribers() {
        let store = setup_store();
        let mut rx = store.notifier().subscribe();

        store.save(&sample_snapshot()).await.expect("save");
        store.save_queue(&sample_queue()).await.expect("save queue");

        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.user_id == USER_ID));
    }

    #[tokio::test]
    async fn batch_scope_coalesces_save_notifications() {
        let store = setup_store();
        let mut rx = store.notifier().subscribe();

        {
            let _batch = store.notifier().batch(USER_ID);
            store.save(&sample_snapshot()).await.expect("save");
            store.save_queue(&sample_queue()).await.expect("save queue");
            assert!(drain(&mut rx).is_empty());
        }
        assert_eq!(drain(&mut rx).len(), 1);
    }
}
