//! HTTP transport for centavo's sync engine: the `RemoteStore` and
//! `ConnectivityChecker` implementations talking to the backend API.

pub mod client;
pub mod connectivity;
pub mod error;

pub use client::{HttpRemoteStore, RemoteSyncConfig};
pub use connectivity::HttpConnectivityChecker;
pub use error::RemoteError;
