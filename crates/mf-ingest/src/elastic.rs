//! Elasticsearch backend over its REST API.
//!
//! Partitions are indices and sub-types are mapping types:
//!
//! | Operation          | Request                          |
//! |--------------------|----------------------------------|
//! | `partition_exists` | `HEAD /{index}`                  |
//! | `create_partition` | `PUT /{index}` with the template |
//! | `write_one`        | `POST /{index}/{type}`           |
//! | `write_bulk`       | `POST /_bulk` (NDJSON)           |

use std::time::Duration;

use reqwest::{Client, StatusCode, Url};
use serde_json::{json, Value};
use tracing::debug;

use crate::backend::{BulkItemOutcome, BulkOperation, SearchBackend};
use crate::error::BackendError;
use crate::schema::PartitionSchema;
use crate::types::{Payload, RecordId};

/// Default address of the store.
pub const DEFAULT_ELASTIC_URL: &str = "http://localhost:9400";

/// Default timeout for a single request to the store.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection settings for [`ElasticBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElasticConfig {
    /// Base URL of the store.
    pub url: String,
    /// Timeout applied to every request.
    pub request_timeout: Duration,
}

impl Default for ElasticConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_ELASTIC_URL.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl ElasticConfig {
    /// Creates a configuration for the given base URL.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Sets the request timeout.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// [`SearchBackend`] backed by an Elasticsearch cluster.
#[derive(Debug, Clone)]
pub struct ElasticBackend {
    client: Client,
    base: Url,
}

impl ElasticBackend {
    /// Builds a backend from its configuration. No request is sent.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Unavailable`] if the URL is invalid or the
    /// HTTP client cannot be built.
    pub fn new(config: &ElasticConfig) -> Result<Self, BackendError> {
        let base = Url::parse(&config.url)
            .map_err(|e| BackendError::Unavailable(format!("invalid url {}: {e}", config.url)))?;
        if base.cannot_be_a_base() {
            return Err(BackendError::Unavailable(format!(
                "invalid url {}: not a base url",
                config.url
            )));
        }
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| BackendError::Unavailable(e.to_string()))?;
        Ok(Self { client, base })
    }

    /// Base URL requests are sent to.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}

fn transport(err: &reqwest::Error) -> BackendError {
    BackendError::Unavailable(err.to_string())
}

async fn rejection(response: reqwest::Response) -> BackendError {
    let status = response.status().as_u16();
    let reason = response.text().await.unwrap_or_default();
    BackendError::Rejected { status, reason }
}

/// Encodes bulk operations as the NDJSON body of a `_bulk` request.
///
/// # Errors
///
/// Returns [`BackendError::Serialization`] if a document cannot be encoded.
pub fn encode_bulk_body(operations: &[BulkOperation]) -> Result<String, BackendError> {
    let mut body = String::new();
    for op in operations {
        let action = json!({ "index": { "_index": op.partition, "_type": op.sub_type } });
        body.push_str(&serde_json::to_string(&action)?);
        body.push('\n');
        body.push_str(&serde_json::to_string(&op.document)?);
        body.push('\n');
    }
    Ok(body)
}

/// Decodes the response of a `_bulk` request into per-item outcomes.
///
/// # Errors
///
/// Returns [`BackendError::InvalidResponse`] if the response has no `items`
/// array or an item carries neither an id nor an error.
pub fn parse_bulk_response(response: &Value) -> Result<Vec<BulkItemOutcome>, BackendError> {
    let items = response
        .get("items")
        .and_then(Value::as_array)
        .ok_or_else(|| BackendError::InvalidResponse("bulk response has no items".to_string()))?;

    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let result = item
                .as_object()
                .and_then(|obj| obj.values().next())
                .ok_or_else(|| {
                    BackendError::InvalidResponse(format!("bulk item {index} is not an object"))
                })?;

            if let Some(error) = result.get("error") {
                let reason = error
                    .get("reason")
                    .and_then(Value::as_str)
                    .map_or_else(|| error.to_string(), str::to_string);
                return Ok(Err(reason));
            }
            if let Some(status) = result.get("status").and_then(Value::as_u64) {
                if status >= 300 {
                    return Ok(Err(format!("status {status}")));
                }
            }
            result
                .get("_id")
                .and_then(Value::as_str)
                .map(|id| Ok(RecordId::new(id)))
                .ok_or_else(|| {
                    BackendError::InvalidResponse(format!("bulk item {index} has no _id"))
                })
        })
        .collect()
}

fn is_already_exists(reason: &str) -> bool {
    reason.contains("already_exists") || reason.contains("IndexAlreadyExists")
}

impl SearchBackend for ElasticBackend {
    async fn partition_exists(&self, partition: &str) -> Result<bool, BackendError> {
        let response = self
            .client
            .head(self.endpoint(&[partition]))
            .send()
            .await
            .map_err(|e| transport(&e))?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(rejection(response).await),
        }
    }

    async fn create_partition(
        &self,
        partition: &str,
        schema: &PartitionSchema,
    ) -> Result<(), BackendError> {
        let body = json!({ "mappings": { "_default_": schema } });
        let response = self
            .client
            .put(self.endpoint(&[partition]))
            .json(&body)
            .send()
            .await
            .map_err(|e| transport(&e))?;

        if response.status().is_success() {
            debug!(partition, "index created");
            return Ok(());
        }
        match rejection(response).await {
            BackendError::Rejected { reason, .. } if is_already_exists(&reason) => {
                Err(BackendError::AlreadyExists(partition.to_string()))
            }
            other => Err(other),
        }
    }

    async fn write_one(
        &self,
        partition: &str,
        sub_type: &str,
        document: &Payload,
    ) -> Result<RecordId, BackendError> {
        let response = self
            .client
            .post(self.endpoint(&[partition, sub_type]))
            .json(document)
            .send()
            .await
            .map_err(|e| transport(&e))?;

        if !response.status().is_success() {
            return Err(rejection(response).await);
        }
        let body: Value = response
            .json()
            .await
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;
        body.get("_id")
            .and_then(Value::as_str)
            .map(RecordId::new)
            .ok_or_else(|| BackendError::InvalidResponse("index response has no _id".to_string()))
    }

    async fn write_bulk(
        &self,
        operations: &[BulkOperation],
    ) -> Result<Vec<BulkItemOutcome>, BackendError> {
        let body = encode_bulk_body(operations)?;
        let response = self
            .client
            .post(self.endpoint(&["_bulk"]))
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(body)
            .send()
            .await
            .map_err(|e| transport(&e))?;

        if !response.status().is_success() {
            return Err(rejection(response).await);
        }
        let body: Value = response
            .json()
            .await
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;
        parse_bulk_response(&body)
    }
}
