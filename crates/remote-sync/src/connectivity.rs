//! Lightweight reachability probe against the backend.

use async_trait::async_trait;
use log::debug;
use std::time::Duration;

use centavo_core::sync::ConnectivityChecker;

use crate::client::RemoteSyncConfig;

/// Short probe timeout: the probe is an optimization, not a gate, so it must
/// never hold up a sync decision for long.
const PROBE_TIMEOUT_SECS: u64 = 3;

/// Probes the backend's health endpoint with a HEAD request.
///
/// Any response, including an error status, counts as online: the probe
/// answers "is the network path up", not "is the API healthy". Transport
/// failures and timeouts report offline.
#[derive(Debug, Clone)]
pub struct HttpConnectivityChecker {
    client: reqwest::Client,
    probe_url: String,
}

impl HttpConnectivityChecker {
    pub fn new(config: &RemoteSyncConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(PROBE_TIMEOUT_SECS))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            probe_url: format!("{}/v1/health", config.base_url.trim_end_matches('/')),
        }
    }
}

#[async_trait]
impl ConnectivityChecker for HttpConnectivityChecker {
    async fn is_online(&self) -> bool {
        match self.client.head(&self.probe_url).send().await {
            Ok(_) => true,
            Err(e) => {
                debug!("[Connectivity] probe failed, reporting offline: {e}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn checker_for(base_url: &str) -> HttpConnectivityChecker {
        HttpConnectivityChecker::new(&RemoteSyncConfig {
            base_url: base_url.to_string(),
            api_token: "test-token".to_string(),
        })
    }

    #[tokio::test]
    async fn any_response_counts_as_online() {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("listener addr");
        let server = tokio::spawn(async move {
            if let Ok((mut stream, _)) = listener.accept().await {
                let mut buffer = [0_u8; 2048];
                let _ = stream.read(&mut buffer).await;
                // Unhealthy API, but the network path works.
                let _ = stream
                    .write_all(
                        b"HTTP/1.1 500 Internal Server Error\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                    )
                    .await;
            }
        });

        let checker = checker_for(&format!("http://{}", addr));
        assert!(checker.is_online().await);
        server.abort();
    }

    #[tokio::test]
    async fn unreachable_host_reports_offline() {
        // Bind-then-drop guarantees nothing is listening on the port.
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("listener addr");
        drop(listener);

        let checker = checker_for(&format!("http://{}", addr));
        assert!(!checker.is_online().await);
    }
}
