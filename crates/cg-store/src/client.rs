//! Firestore REST backend.
//!
//! - Service-account tokens cached with a refresh margin
//! - One retry with a fresh token when a token expires mid-flight
//! - Backoff retries for idempotent operations
//! - Tracing span and metrics per request

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use gcp_auth::{CustomServiceAccount, TokenProvider};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tracing::{debug, info, info_span, Instrument};

use crate::document_store::{DocumentStore, FieldEq, StoredDocument};
use crate::error::{StoreError, StoreResult};
use crate::metrics::record_request;
use crate::retry::{with_retry, RetryConfig};
use crate::token_cache::TokenSource;
use crate::types::{Document, Fields, RunQueryRequest, RunQueryResponse, StructuredQuery};

const BACKEND: &str = "firestore";

/// Collection read by the readiness check.
const HEALTH_COLLECTION: &str = "_health";

/// Firestore client configuration.
#[derive(Debug, Clone)]
pub struct FirestoreConfig {
    pub project_id: String,
    /// Database ID (usually "(default)")
    pub database_id: String,
    /// Emulator `host:port`; when set, requests go there with a fixed token.
    pub emulator_host: Option<String>,
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub retry: RetryConfig,
}

impl FirestoreConfig {
    /// Create config from environment variables.
    pub fn from_env() -> StoreResult<Self> {
        let project_id = std::env::var("GCP_PROJECT_ID")
            .or_else(|_| std::env::var("FIREBASE_PROJECT_ID"))
            .unwrap_or_default();

        if project_id.trim().is_empty() {
            return Err(StoreError::Config(
                "GCP_PROJECT_ID or FIREBASE_PROJECT_ID must be set for the firestore backend".to_string(),
            ));
        }

        let connect_timeout_secs: u64 = std::env::var("FIRESTORE_CONNECT_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5);

        Ok(Self {
            project_id,
            database_id: std::env::var("FIRESTORE_DATABASE_ID")
                .unwrap_or_else(|_| "(default)".to_string()),
            emulator_host: std::env::var("FIRESTORE_EMULATOR_HOST")
                .ok()
                .filter(|h| !h.trim().is_empty()),
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(connect_timeout_secs),
            retry: RetryConfig::from_env(),
        })
    }

    fn base_url(&self) -> String {
        let origin = match &self.emulator_host {
            Some(host) if host.starts_with("http://") || host.starts_with("https://") => {
                host.clone()
            }
            Some(host) => format!("http://{}", host),
            None => "https://firestore.googleapis.com".to_string(),
        };
        format!(
            "{}/v1/projects/{}/databases/{}/documents",
            origin.trim_end_matches('/'),
            self.project_id,
            self.database_id
        )
    }
}

/// Firestore REST API client.
#[derive(Clone)]
pub struct FirestoreClient {
    http: Client,
    config: FirestoreConfig,
    base_url: String,
    tokens: Arc<TokenSource>,
}

impl FirestoreClient {
    /// Create a client. Uses service-account credentials unless an emulator is configured.
    pub async fn new(config: FirestoreConfig) -> StoreResult<Self> {
        let tokens = match &config.emulator_host {
            Some(host) => {
                info!(host = %host, "Using Firestore emulator");
                TokenSource::fixed("owner")
            }
            None => TokenSource::service_account(Self::create_auth_provider()?),
        };

        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .user_agent(concat!("cg-store/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let base_url = config.base_url();
        Ok(Self {
            http,
            config,
            base_url,
            tokens: Arc::new(tokens),
        })
    }

    /// Create from environment variables.
    pub async fn from_env() -> StoreResult<Self> {
        Self::new(FirestoreConfig::from_env()?).await
    }

    fn create_auth_provider() -> StoreResult<Arc<dyn TokenProvider>> {
        let service_account = CustomServiceAccount::from_env()
            .map_err(|e| StoreError::auth_error(format!("Failed to load service account: {}", e)))?;

        match service_account {
            Some(sa) => Ok(Arc::new(sa)),
            None => Err(StoreError::auth_error(
                "GOOGLE_APPLICATION_CREDENTIALS not set. \
                 Set it to the path of your service account JSON file.",
            )),
        }
    }

    fn document_url(&self, collection: &str, doc_id: &str) -> String {
        format!(
            "{}/{}/{}",
            self.base_url,
            collection,
            urlencoding::encode(doc_id)
        )
    }

    fn is_access_token_expired(body: &str) -> bool {
        body.contains("ACCESS_TOKEN_EXPIRED") || body.contains("\"UNAUTHENTICATED\"")
    }

    /// Send with a bearer token, refreshing it once if the backend reports expiry.
    async fn send_authed<F>(&self, build: F) -> StoreResult<Response>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let token = self.tokens.get_token().await?;
        let response = build(&self.http).bearer_auth(&token).send().await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        if !Self::is_access_token_expired(&body) {
            return Err(StoreError::from_http_status(401, body));
        }

        debug!("Access token expired, refreshing");
        self.tokens.invalidate().await;
        let token = self.tokens.get_token().await?;
        Ok(build(&self.http).bearer_auth(&token).send().await?)
    }

    /// Run a request future inside a span and record its outcome.
    async fn execute<T, Fut>(&self, operation: &str, collection: &str, fut: Fut) -> StoreResult<T>
    where
        Fut: std::future::Future<Output = StoreResult<T>>,
    {
        let span = info_span!(
            "firestore_request",
            operation = %operation,
            collection = %collection
        );
        let started = Instant::now();
        let result = fut.instrument(span).await;
        let status = match &result {
            Ok(_) => 200,
            Err(e) => e.http_status().unwrap_or(500),
        };
        record_request(BACKEND, operation, status, started.elapsed().as_secs_f64() * 1000.0);
        result
    }

    async fn error_from(response: Response, url: &str) -> StoreError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        StoreError::from_http_status(status, format!("{} failed: {}", url, body))
    }

    async fn get_once(
        &self,
        collection: &str,
        doc_id: &str,
    ) -> StoreResult<Option<StoredDocument>> {
        let url = self.document_url(collection, doc_id);
        let response = self.send_authed(|http| http.get(&url)).await?;
        match response.status() {
            StatusCode::OK => {
                let doc: Document = response.json().await?;
                Ok(Some(StoredDocument {
                    id: doc_id.to_string(),
                    fields: doc.fields.unwrap_or_default(),
                }))
            }
            StatusCode::NOT_FOUND => Ok(None),
            _ => Err(Self::error_from(response, &url).await),
        }
    }

    async fn upsert_once(
        &self,
        collection: &str,
        doc_id: &str,
        body: &Document,
    ) -> StoreResult<()> {
        let url = self.document_url(collection, doc_id);
        let response = self.send_authed(|http| http.patch(&url).json(body)).await?;
        match response.status() {
            StatusCode::OK => Ok(()),
            _ => Err(Self::error_from(response, &url).await),
        }
    }

    async fn delete_once(&self, collection: &str, doc_id: &str) -> StoreResult<()> {
        let url = self.document_url(collection, doc_id);
        let response = self.send_authed(|http| http.delete(&url)).await?;
        match response.status() {
            StatusCode::OK | StatusCode::NO_CONTENT => Ok(()),
            StatusCode::NOT_FOUND => {
                debug!("Document {}/{} already deleted", collection, doc_id);
                Ok(())
            }
            _ => Err(Self::error_from(response, &url).await),
        }
    }

    async fn query_once(&self, request: &RunQueryRequest) -> StoreResult<Vec<StoredDocument>> {
        let url = format!("{}:runQuery", self.base_url);
        let response = self.send_authed(|http| http.post(&url).json(request)).await?;
        if response.status() != StatusCode::OK {
            return Err(Self::error_from(response, &url).await);
        }

        // runQuery returns a JSON array; entries without a document carry only a read time.
        let body = response.text().await?;
        let responses: Vec<RunQueryResponse> = serde_json::from_str(&body).map_err(|e| {
            StoreError::InvalidResponse(format!(
                "runQuery response: {} (body prefix: {})",
                e,
                body.chars().take(200).collect::<String>()
            ))
        })?;

        responses
            .into_iter()
            .filter_map(|r| r.document)
            .map(|doc| {
                let id = doc
                    .id()
                    .map(str::to_string)
                    .ok_or_else(|| {
                        StoreError::InvalidResponse("query result without a name".to_string())
                    })?;
                Ok(StoredDocument {
                    id,
                    fields: doc.fields.unwrap_or_default(),
                })
            })
            .collect()
    }
}

#[async_trait]
impl DocumentStore for FirestoreClient {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    async fn insert(&self, collection: &str, id: &str, fields: Fields) -> StoreResult<()> {
        let url = format!(
            "{}/{}?documentId={}",
            self.base_url,
            collection,
            urlencoding::encode(id)
        );
        let body = Document::new(fields);

        // Not retried: a create whose response was lost would report a conflict.
        self.execute("insert", collection, async {
            let response = self.send_authed(|http| http.post(&url).json(&body)).await?;
            match response.status() {
                StatusCode::OK | StatusCode::CREATED => Ok(()),
                StatusCode::CONFLICT => {
                    Err(StoreError::AlreadyExists(format!("{}/{}", collection, id)))
                }
                _ => Err(Self::error_from(response, &url).await),
            }
        })
        .await
    }

    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<StoredDocument>> {
        self.execute(
            "get",
            collection,
            with_retry(&self.config.retry, "get", || self.get_once(collection, id)),
        )
        .await
    }

    async fn upsert(&self, collection: &str, id: &str, fields: Fields) -> StoreResult<()> {
        let body = Document::new(fields);
        self.execute(
            "upsert",
            collection,
            with_retry(&self.config.retry, "upsert", || self.upsert_once(collection, id, &body)),
        )
        .await
    }

    async fn delete(&self, collection: &str, id: &str) -> StoreResult<()> {
        self.execute(
            "delete",
            collection,
            with_retry(&self.config.retry, "delete", || self.delete_once(collection, id)),
        )
        .await
    }

    async fn find(
        &self,
        collection: &str,
        filters: &[FieldEq],
    ) -> StoreResult<Vec<StoredDocument>> {
        let request = RunQueryRequest {
            structured_query: StructuredQuery::equal_filters(collection, filters),
        };
        self.execute(
            "find",
            collection,
            with_retry(&self.config.retry, "find", || self.query_once(&request)),
        )
        .await
    }

    async fn ping(&self) -> StoreResult<()> {
        self.get(HEALTH_COLLECTION, "ping").await.map(|_| ())
    }
}
