//! HTTP client for the centavo backend's per-entity sync API.

use async_trait::async_trait;
use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::time::Duration;

use centavo_core::budget::{BudgetCycle, Category, IncomeSource, Snapshot, Transaction};
use centavo_core::errors::SyncError;
use centavo_core::sync::{EntityCollection, RemoteResult, RemoteStore};

use crate::error::{RemoteError, Result};

/// Default timeout for API requests.
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_LOG_BODY_CHARS: usize = 512;

/// Connection settings for the remote store, usually read from the
/// environment.
#[derive(Debug, Clone)]
pub struct RemoteSyncConfig {
    pub base_url: String,
    pub api_token: String,
}

impl RemoteSyncConfig {
    /// Read `CENTAVO_API_URL` and `CENTAVO_API_TOKEN`. Returns `None` when
    /// either is missing or blank, which means the app runs local-only.
    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var("CENTAVO_API_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())?;
        let api_token = std::env::var("CENTAVO_API_TOKEN")
            .ok()
            .filter(|v| !v.trim().is_empty())?;
        Some(Self {
            base_url,
            api_token,
        })
    }
}

/// Error envelope returned by the API on non-2xx responses.
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    code: String,
    message: String,
}

/// The per-user remote snapshot as returned by `GET /v1/snapshot`.
///
/// A missing profile together with empty collections means the user has
/// never synced, which callers must distinguish from a synced-but-empty
/// budget.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteSnapshotResponse {
    #[serde(default)]
    profile: Option<Map<String, Value>>,
    #[serde(default)]
    income_sources: Vec<IncomeSource>,
    #[serde(default)]
    cycles: Vec<BudgetCycle>,
    #[serde(default)]
    categories: Vec<Category>,
    #[serde(default)]
    transactions: Vec<Transaction>,
}

impl RemoteSnapshotResponse {
    fn is_unprovisioned(&self) -> bool {
        self.profile.is_none()
            && self.income_sources.is_empty()
            && self.cycles.is_empty()
            && self.categories.is_empty()
            && self.transactions.is_empty()
    }

    fn into_snapshot(self, user_id: &str) -> Option<Snapshot> {
        if self.is_unprovisioned() {
            return None;
        }
        let mut snapshot = Snapshot::empty(user_id);
        snapshot.income_sources = self.income_sources;
        snapshot.cycles = self.cycles;
        snapshot.categories = self.categories;
        snapshot.transactions = self.transactions;
        snapshot.preferences = self.profile.unwrap_or_default();
        Some(snapshot)
    }
}

/// [`RemoteStore`] over the backend's REST API.
///
/// Every write endpoint is idempotent server-side (upserts keyed by id,
/// deletes filtered by id and owner), which is what lets the queue replay
/// mutations after unconfirmed attempts.
#[derive(Debug, Clone)]
pub struct HttpRemoteStore {
    client: reqwest::Client,
    base_url: String,
    api_token: String,
}

impl HttpRemoteStore {
    pub fn new(config: RemoteSyncConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_token: config.api_token,
        }
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let auth_value = HeaderValue::from_str(&format!("Bearer {}", self.api_token))
            .map_err(|_| RemoteError::invalid_request("Invalid access token format"))?;
        headers.insert(AUTHORIZATION, auth_value);
        Ok(headers)
    }

    fn log_response(status: reqwest::StatusCode, body: &str) {
        if status.is_success() {
            debug!("API response status: {}", status);
            return;
        }
        let mut preview = body.chars().take(MAX_LOG_BODY_CHARS).collect::<String>();
        if body.chars().count() > MAX_LOG_BODY_CHARS {
            preview.push_str("...");
        }
        debug!("API response error ({}): {}", status, preview);
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();
        let body = response.text().await?;
        Self::log_response(status, &body);

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<ApiErrorResponse>(&body) {
                return Err(RemoteError::api(
                    status.as_u16(),
                    format!("{}: {}", error.code, error.message),
                ));
            }
            return Err(RemoteError::api(
                status.as_u16(),
                format!("Request failed: {}", body),
            ));
        }

        serde_json::from_str(&body).map_err(|e| {
            RemoteError::api(status.as_u16(), format!("Failed to parse response: {}", e))
        })
    }

    /// Check a response where only the status matters.
    async fn check_response(response: reqwest::Response) -> Result<()> {
        let status = response.status();
        if status.is_success() {
            debug!("API response status: {}", status);
            return Ok(());
        }
        let body = response.text().await?;
        Self::log_response(status, &body);
        if let Ok(error) = serde_json::from_str::<ApiErrorResponse>(&body) {
            return Err(RemoteError::api(
                status.as_u16(),
                format!("{}: {}", error.code, error.message),
            ));
        }
        Err(RemoteError::api(
            status.as_u16(),
            format!("Request failed: {}", body),
        ))
    }

    fn collection_url(&self, collection: EntityCollection, action: &str) -> String {
        format!("{}/v1/{}/{}", self.base_url, collection.as_str(), action)
    }

    async fn post_json<B: Serialize + ?Sized>(&self, url: &str, body: &B) -> Result<()> {
        let response = self
            .client
            .post(url)
            .headers(self.headers()?)
            .json(body)
            .send()
            .await?;
        Self::check_response(response).await
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    /// POST /v1/{collection}/upsert
    async fn upsert(
        &self,
        collection: EntityCollection,
        record: &Map<String, Value>,
    ) -> RemoteResult<()> {
        self.post_json(&self.collection_url(collection, "upsert"), record)
            .await
            .map_err(SyncError::from)
    }

    /// POST /v1/{collection}/delete
    async fn delete(
        &self,
        collection: EntityCollection,
        id: &str,
        user_id: &str,
    ) -> RemoteResult<()> {
        let body = json!({ "id": id, "userId": user_id });
        self.post_json(&self.collection_url(collection, "delete"), &body)
            .await
            .map_err(SyncError::from)
    }

    /// POST /v1/{collection}/delete-all
    async fn delete_all(&self, collection: EntityCollection, user_id: &str) -> RemoteResult<()> {
        let body = json!({ "userId": user_id });
        self.post_json(&self.collection_url(collection, "delete-all"), &body)
            .await
            .map_err(SyncError::from)
    }

    /// POST /v1/profiles/clear-preferences
    async fn clear_preferences(&self, user_id: &str) -> RemoteResult<()> {
        let url = format!("{}/v1/profiles/clear-preferences", self.base_url);
        let body = json!({ "userId": user_id });
        self.post_json(&url, &body).await.map_err(SyncError::from)
    }

    /// GET /v1/snapshot?userId={userId}
    async fn fetch_snapshot(&self, user_id: &str) -> RemoteResult<Option<Snapshot>> {
        let inner = async {
            let url = format!("{}/v1/snapshot", self.base_url);
            let response = self
                .client
                .get(&url)
                .headers(self.headers()?)
                .query(&[("userId", user_id)])
                .send()
                .await?;
            let remote: RemoteSnapshotResponse = Self::parse_response(response).await?;
            Ok::<_, RemoteError>(remote.into_snapshot(user_id))
        };
        inner.await.map_err(SyncError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::Mutex;

    const USER_ID: &str = "6f9619ff-8b86-4d01-b42d-00cf4fc964ff";

    #[derive(Debug, Clone)]
    struct CapturedRequest {
        path: String,
        body: String,
    }

    async fn read_http_request(stream: &mut tokio::net::TcpStream) -> Option<CapturedRequest> {
        let mut buffer = Vec::new();
        let header_end = loop {
            let mut chunk = [0_u8; 2048];
            let read = stream.read(&mut chunk).await.ok()?;
            if read == 0 {
                return None;
            }
            buffer.extend_from_slice(&chunk[..read]);
            if let Some(pos) = buffer.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos;
            }
        };

        let head = String::from_utf8_lossy(&buffer[..header_end]).to_string();
        let request_line = head.lines().next()?.to_string();
        let path = request_line.split_whitespace().nth(1)?.to_string();

        let content_length = head
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.trim()
                    .eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())?
            })
            .unwrap_or(0);

        let mut body = buffer[header_end + 4..].to_vec();
        while body.len() < content_length {
            let mut chunk = [0_u8; 2048];
            let read = stream.read(&mut chunk).await.ok()?;
            if read == 0 {
                break;
            }
            body.extend_from_slice(&chunk[..read]);
        }

        Some(CapturedRequest {
            path,
            body: String::from_utf8_lossy(&body).to_string(),
        })
    }

    async fn write_http_response(
        stream: &mut tokio::net::TcpStream,
        status: u16,
        body: &str,
    ) -> std::io::Result<()> {
        let reason = match status {
            200 => "OK",
            422 => "Unprocessable Entity",
            500 => "Internal Server Error",
            _ => "Error",
        };
        let response = format!(
            "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            reason,
            body.len(),
            body
        );
        stream.write_all(response.as_bytes()).await?;
        stream.flush().await
    }

    async fn start_mock_server(
        status: u16,
        body: &'static str,
    ) -> (
        String,
        Arc<Mutex<Vec<CapturedRequest>>>,
        tokio::task::JoinHandle<()>,
    ) {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("listener addr");
        let captured = Arc::new(Mutex::new(Vec::new()));
        let captured_clone = Arc::clone(&captured);

        let handle = tokio::spawn(async move {
            loop {
                let (mut stream, _) = match listener.accept().await {
                    Ok(value) => value,
                    Err(_) => break,
                };
                let captured_inner = Arc::clone(&captured_clone);
                tokio::spawn(async move {
                    if let Some(request) = read_http_request(&mut stream).await {
                        captured_inner.lock().await.push(request);
                    }
                    let _ = write_http_response(&mut stream, status, body).await;
                });
            }
        });

        (format!("http://{}", addr), captured, handle)
    }

    fn store_for(base_url: &str) -> HttpRemoteStore {
        HttpRemoteStore::new(RemoteSyncConfig {
            base_url: base_url.to_string(),
            api_token: "test-token".to_string(),
        })
    }

    #[tokio::test]
    async fn upsert_posts_to_the_collection_endpoint() {
        let (base_url, captured, server) = start_mock_server(200, "{}").await;
        let store = store_for(&base_url);

        let mut record = Map::new();
        record.insert("id".to_string(), json!("cycle-1"));
        record.insert("userId".to_string(), json!(USER_ID));
        store
            .upsert(EntityCollection::Cycles, &record)
            .await
            .expect("upsert");

        let requests = captured.lock().await.clone();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].path, "/v1/cycles/upsert");
        let sent: Value = serde_json::from_str(&requests[0].body).expect("body json");
        assert_eq!(sent["userId"], json!(USER_ID));

        server.abort();
    }

    #[tokio::test]
    async fn api_error_becomes_remote_rejected_with_status() {
        let (base_url, _captured, server) = start_mock_server(
            422,
            r#"{"code":"invalid_reference","message":"cycleId references a missing cycle"}"#,
        )
        .await;
        let store = store_for(&base_url);

        let err = store
            .delete(EntityCollection::Transactions, "txn-1", USER_ID)
            .await
            .unwrap_err();
        match err {
            SyncError::RemoteRejected { status, message } => {
                assert_eq!(status, 422);
                assert!(message.contains("invalid_reference"));
            }
            other => panic!("expected RemoteRejected, got {other:?}"),
        }

        server.abort();
    }

    #[tokio::test]
    async fn unprovisioned_snapshot_response_is_none() {
        let (base_url, captured, server) = start_mock_server(200, "{}").await;
        let store = store_for(&base_url);

        let snapshot = store.fetch_snapshot(USER_ID).await.expect("fetch");
        assert!(snapshot.is_none());

        let requests = captured.lock().await.clone();
        assert!(requests[0].path.starts_with("/v1/snapshot?"));

        server.abort();
    }

    #[tokio::test]
    async fn populated_snapshot_response_is_decoded() {
        let (base_url, _captured, server) = start_mock_server(
            200,
            r#"{"profile":{"currency":"USD"},"cycles":[{"id":"11111111-1111-4111-8111-111111111111","userId":"6f9619ff-8b86-4d01-b42d-00cf4fc964ff","name":"August","startsOn":"2026-08-01","endsOn":"2026-08-31","expectedIncome":3500.0}]}"#,
        )
        .await;
        let store = store_for(&base_url);

        let snapshot = store
            .fetch_snapshot(USER_ID)
            .await
            .expect("fetch")
            .expect("snapshot");
        assert_eq!(snapshot.user_id, USER_ID);
        assert_eq!(snapshot.cycles.len(), 1);
        assert_eq!(snapshot.cycles[0].name, "August");
        assert_eq!(snapshot.preferences["currency"], json!("USD"));

        server.abort();
    }

    #[test]
    fn profile_only_response_still_counts_as_provisioned() {
        let response = RemoteSnapshotResponse {
            profile: Some(Map::new()),
            income_sources: Vec::new(),
            cycles: Vec::new(),
            categories: Vec::new(),
            transactions: Vec::new(),
        };
        let snapshot = response.into_snapshot(USER_ID).expect("snapshot");
        assert!(snapshot.is_empty());
    }
}
