//! Batched JSON submission to the ingest Gateway with per-item results and
//! fallback to per-item submission (component C11).

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::retry::BackoffPolicy;
use crate::types::{CanonicalDocument, IngestSubmission};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("transient gateway error: {0}")]
    Transient(String),

    #[error("gateway returned {status}: {body}")]
    Http { status: u16, body: String },

    #[error("gateway network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("gateway response could not be parsed: {0}")]
    Parse(String),
}

/// `sha256("<source_type>:<external_id>:<content_hash>")`, the key used
/// both for per-item submission and for batch fallback (§4.10).
pub fn idempotency_key(source_type: &str, external_id: &str, content_hash: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{source_type}:{external_id}:{content_hash}").as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Clone, Debug, Serialize)]
struct BatchRequest<'a> {
    documents: &'a [CanonicalDocument],
}

#[derive(Clone, Debug, Deserialize)]
struct BatchResponse {
    #[allow(dead_code)]
    success_count: u64,
    #[allow(dead_code)]
    failure_count: u64,
    results: Vec<BatchResultEntry>,
}

#[derive(Clone, Debug, Deserialize)]
struct BatchResultEntry {
    index: usize,
    status_code: u16,
    submission: Option<IngestSubmission>,
    error: Option<String>,
}

/// Per-item outcome after a batch or per-item submission attempt.
#[derive(Clone, Debug)]
pub struct ItemResult {
    pub index: usize,
    pub status_code: u16,
    pub submission: Option<IngestSubmission>,
    pub error: Option<String>,
}

impl ItemResult {
    pub fn is_success(&self) -> bool {
        self.submission.is_some()
    }

    /// Synthetic result for an index the batch response omitted entirely.
    fn missing(index: usize) -> Self {
        Self {
            index,
            status_code: 502,
            submission: None,
            error: Some("gateway omitted this index from the batch response".to_string()),
        }
    }
}

pub struct GatewayClient {
    client: Client,
    base_url: String,
    ingest_path: String,
    ingest_file_path: String,
    bearer_token: String,
    backoff: BackoffPolicy,
}

impl GatewayClient {
    pub fn new(client: Client, base_url: impl Into<String>, ingest_path: impl Into<String>, ingest_file_path: impl Into<String>, bearer_token: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            ingest_path: ingest_path.into(),
            ingest_file_path: ingest_file_path.into(),
            bearer_token: bearer_token.into(),
            backoff: BackoffPolicy::linear_gateway(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Sends `request_fn`, retrying on 429/503 with linear `0.5*attempt`
    /// backoff up to 3 total attempts (§4.10). Non-2xx responses other than
    /// the retried codes are surfaced as `(status, body)`.
    async fn send_with_retry(
        &self,
        make_request: impl Fn() -> reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, GatewayError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let response = make_request()
                .timeout(DEFAULT_REQUEST_TIMEOUT)
                .send()
                .await?;
            let status = response.status();
            if (status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::SERVICE_UNAVAILABLE)
                && attempt < self.backoff.total_attempts()
            {
                tokio::time::sleep(self.backoff.delay_for(attempt, None)).await;
                continue;
            }
            return Ok(response);
        }
    }

    pub async fn submit_document(
        &self,
        payload: &CanonicalDocument,
        idempotency_key: &str,
    ) -> Result<IngestSubmission, GatewayError> {
        let response = self
            .send_with_retry(|| {
                self.client
                    .post(self.url(&self.ingest_path))
                    .bearer_auth(&self.bearer_token)
                    .header("Idempotency-Key", idempotency_key)
                    .json(payload)
            })
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Http { status: status.as_u16(), body });
        }
        response.json().await.map_err(|err| GatewayError::Parse(err.to_string()))
    }

    /// Attempts the batch endpoint; returns `Ok(None)` only when it is
    /// unavailable (404/405), meaning callers should fall back to
    /// per-item submission. Any other failure is raised.
    pub async fn submit_batch(
        &self,
        documents: &[CanonicalDocument],
    ) -> Result<Option<Vec<ItemResult>>, GatewayError> {
        let batch_path = format!("{}:batch", self.ingest_path);
        let response = self
            .send_with_retry(|| {
                self.client
                    .post(self.url(&batch_path))
                    .bearer_auth(&self.bearer_token)
                    .json(&BatchRequest { documents })
            })
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND || status == StatusCode::METHOD_NOT_ALLOWED {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Http { status: status.as_u16(), body });
        }

        let parsed: BatchResponse = response.json().await.map_err(|err| GatewayError::Parse(err.to_string()))?;
        let mut results: Vec<Option<ItemResult>> = vec![None; documents.len()];
        for entry in parsed.results {
            if entry.index < results.len() {
                results[entry.index] = Some(ItemResult {
                    index: entry.index,
                    status_code: entry.status_code,
                    submission: entry.submission,
                    error: entry.error,
                });
            }
        }
        let filled = results
            .into_iter()
            .enumerate()
            .map(|(i, r)| r.unwrap_or_else(|| ItemResult::missing(i)))
            .collect();
        Ok(Some(filled))
    }

    /// Per-item fallback used when the batch endpoint is unavailable.
    /// Duplicates reported by the Gateway are treated as success.
    pub async fn submit_all_per_item(
        &self,
        documents: &[CanonicalDocument],
    ) -> Vec<ItemResult> {
        let mut results = Vec::with_capacity(documents.len());
        for (index, doc) in documents.iter().enumerate() {
            let key = idempotency_key(
                &doc.source_type,
                &doc.external_id,
                doc.content_hash().unwrap_or_default(),
            );
            match self.submit_document(doc, &key).await {
                Ok(submission) => results.push(ItemResult {
                    index,
                    status_code: 200,
                    submission: Some(submission),
                    error: None,
                }),
                Err(GatewayError::Http { status, body }) => results.push(ItemResult {
                    index,
                    status_code: status,
                    submission: None,
                    error: Some(body),
                }),
                Err(other) => results.push(ItemResult {
                    index,
                    status_code: 502,
                    submission: None,
                    error: Some(other.to_string()),
                }),
            }
        }
        results
    }

    pub async fn submit_file(
        &self,
        metadata: &Value,
        bytes: Vec<u8>,
        filename: &str,
        idempotency_key: &str,
        mime: &str,
    ) -> Result<IngestSubmission, GatewayError> {
        let meta_part = reqwest::multipart::Part::text(metadata.to_string())
            .mime_str("application/json")
            .map_err(|err| GatewayError::Parse(err.to_string()))?;
        let upload_part = reqwest::multipart::Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str(mime)
            .map_err(|err| GatewayError::Parse(err.to_string()))?;
        let form = reqwest::multipart::Form::new().part("meta", meta_part).part("upload", upload_part);

        let response = self
            .client
            .post(self.url(&self.ingest_file_path))
            .bearer_auth(&self.bearer_token)
            .header("Idempotency-Key", idempotency_key)
            .multipart(form)
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Http { status: status.as_u16(), body });
        }
        response.json().await.map_err(|err| GatewayError::Parse(err.to_string()))
    }
}
