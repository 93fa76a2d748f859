//! Offline-first mutation queue and reconciliation engine.

mod engine;
mod executor;
mod flusher;
mod merge;
mod model;
mod outbox;
mod scheduler;
mod store;

pub use engine::*;
pub use executor::SyncExecutor;
pub use flusher::QueueFlusher;
pub use merge::merge_snapshots;
pub use model::*;
pub use outbox::MutationOutbox;
pub use scheduler::{FlushRetryHandle, FLUSH_RETRY_COUNTDOWN_SECS};
pub use store::*;
