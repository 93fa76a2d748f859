//! Database rows for the per-user snapshot and queue records.

use diesel::prelude::*;

#[derive(Queryable, Identifiable, Insertable, AsChangeset, Selectable, Debug, Clone)]
#[diesel(primary_key(user_id))]
#[diesel(table_name = crate::schema::snapshot_records)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SnapshotRecordDB {
    pub user_id: String,
    pub schema_version: i32,
    pub payload: String,
    pub updated_at: String,
}

#[derive(Queryable, Identifiable, Insertable, AsChangeset, Selectable, Debug, Clone)]
#[diesel(primary_key(user_id))]
#[diesel(table_name = crate::schema::queue_records)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct QueueRecordDB {
    pub user_id: String,
    pub schema_version: i32,
    pub payload: String,
    pub updated_at: String,
}
