//! Core domain models and the offline-first sync engine for centavo.
//!
//! Storage and remote transport live in sibling crates; this crate owns the
//! trait seams (`StateStore`, `RemoteStore`, `ConnectivityChecker`) they
//! implement.

pub mod budget;
pub mod errors;
pub mod notify;
pub mod sync;

pub use errors::{Error, Result};
