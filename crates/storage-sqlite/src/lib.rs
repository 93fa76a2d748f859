//! SQLite persistence for centavo: the durable snapshot and queue records
//! behind the core `StateStore` seam.

pub mod db;
pub mod errors;
pub mod schema;
pub mod state;

pub use db::{create_pool, get_connection, init, run_migrations, spawn_writer, DbPool, WriteHandle};
pub use errors::StorageError;
pub use state::{SqliteStateStore, STATE_SCHEMA_VERSION};
