pub mod model;
pub mod repository;

pub use repository::{SqliteStateStore, STATE_SCHEMA_VERSION};
