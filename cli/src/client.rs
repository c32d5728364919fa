//! HTTP client for the Lens gateway

use lens_shared::types::page::{ClearResponse, ErrorResponse, FilterKind, QueryPageResponse};
use serde::de::DeserializeOwned;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("unexpected response body: {0}")]
    Decode(String),
}

/// Parameters of one page fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub per_page: u32,
    pub filter: FilterKind,
    pub search: String,
}

#[derive(Debug, Clone)]
pub struct LensClient {
    http: reqwest::Client,
    base: String,
}

impl LensClient {
    /// `endpoint` includes any route prefix, e.g. `http://127.0.0.1:8087/lens`.
    pub fn new(endpoint: &str) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            base: endpoint.trim_end_matches('/').to_string(),
        })
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub async fn fetch_page(&self, req: &PageRequest) -> Result<QueryPageResponse, ClientError> {
        let page = req.page.to_string();
        let per_page = req.per_page.to_string();
        let response = self
            .http
            .get(format!("{}/queries", self.base))
            .query(&[
                ("page", page.as_str()),
                ("perPage", per_page.as_str()),
                ("filter", req.filter.as_query_value()),
                ("search", req.search.as_str()),
            ])
            .send()
            .await?;
        decode(response).await
    }

    pub async fn clear(&self) -> Result<ClearResponse, ClientError> {
        let response = self
            .http
            .post(format!("{}/queries/clear", self.base))
            .send()
            .await?;
        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        let message = serde_json::from_str::<ErrorResponse>(&body)
            .map(|e| e.error)
            .unwrap_or_else(|_| body.trim().to_string());
        return Err(ClientError::Status {
            status: status.as_u16(),
            message,
        });
    }

    serde_json::from_str(&body).map_err(|e| ClientError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lens_server::config::{BackendConfig, StorageConfig};
    use lens_server::gateway::QueryGateway;
    use lens_server::server::{self, ApiState};
    use lens_server::storage::{QueryStore, StorageBackend};
    use lens_shared::types::record::{ConnectionInfo, Parameters, QueryRecord};
    use serde_json::json;
    use std::net::{SocketAddr, TcpListener};
    use std::sync::Arc;
    use tokio::sync::oneshot;

    fn record(sql: &str, duration: f64, error: bool) -> QueryRecord {
        let now = chrono::Utc::now();
        QueryRecord {
            batch_id: uuid::Uuid::nil(),
            sql: sql.to_string(),
            parameters: Parameters::Positional(vec![json!(1)]),
            started_at: now,
            finished_at: now,
            duration_seconds: duration,
            backtrace: vec![],
            connection: ConnectionInfo::default(),
            hostname: None,
            request: None,
            error,
            error_message: None,
        }
    }

    /// Start a gateway on a free port with `/lens` as its prefix.
    async fn gateway(dir: &tempfile::TempDir) -> (String, Arc<StorageBackend>, oneshot::Sender<()>) {
        let config = StorageConfig {
            max_records: 200,
            backend: BackendConfig::File {
                path: dir.path().join("query_logs.log"),
            },
        };
        let store = Arc::new(StorageBackend::open(&config).unwrap());
        let state = ApiState::new(QueryGateway::new(store.clone()), "/lens");

        let addr: SocketAddr = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };
        let (tx, rx) = oneshot::channel::<()>();
        tokio::spawn(server::serve(addr, state, async {
            let _ = rx.await;
        }));
        tokio::time::sleep(Duration::from_millis(50)).await;

        (format!("http://{}/lens/", addr), store, tx)
    }

    fn page(filter: FilterKind, search: &str) -> PageRequest {
        PageRequest {
            page: 1,
            per_page: 20,
            filter,
            search: search.to_string(),
        }
    }

    #[tokio::test]
    async fn test_fetch_filter_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let (endpoint, store, shutdown) = gateway(&dir).await;
        store.append(&record("SELECT * FROM users WHERE id = ?", 0.01, false)).unwrap();
        store.append(&record("SELECT pg_sleep(?)", 0.5, false)).unwrap();
        store.append(&record("INSERT INTO users VALUES (?)", 0.01, true)).unwrap();

        let client = LensClient::new(&endpoint).unwrap();
        assert!(!client.base().ends_with('/'));

        let all = client.fetch_page(&page(FilterKind::All, "")).await.unwrap();
        assert_eq!(all.total, 3);
        assert_eq!(all.queries[0].id, 3);
        assert_eq!(all.queries[0].display_sql, "INSERT INTO users VALUES (1)");

        let slow = client.fetch_page(&page(FilterKind::Slow, "")).await.unwrap();
        assert_eq!(slow.total, 1);
        assert_eq!(slow.filter, "slow");

        let search = client.fetch_page(&page(FilterKind::All, "users")).await.unwrap();
        assert_eq!(search.total, 2);

        let cleared = client.clear().await.unwrap();
        assert!(cleared.success);
        assert_eq!(cleared.cleared, 3);
        let empty = client.fetch_page(&page(FilterKind::All, "")).await.unwrap();
        assert!(empty.queries.is_empty());

        let _ = shutdown.send(());
    }

    #[tokio::test]
    async fn test_error_status_is_decoded() {
        let dir = tempfile::tempdir().unwrap();
        let (endpoint, _store, shutdown) = gateway(&dir).await;

        let client = LensClient::new(&format!("{}missing", endpoint)).unwrap();
        match client.fetch_page(&page(FilterKind::All, "")).await {
            Err(ClientError::Status { status, .. }) => assert_eq!(status, 404),
            other => panic!("expected a 404, got {:?}", other.map(|p| p.total)),
        }

        let _ = shutdown.send(());
    }
}
