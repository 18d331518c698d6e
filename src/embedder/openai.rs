//! OpenAI-compatible embeddings client.

use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{EncodingError, Encoder};

/// Connection settings for [`OpenAiEncoder`].
#[derive(Debug, Clone)]
pub struct OpenAiSettings {
    /// Bearer token.
    pub api_key: String,
    /// API root, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    /// Embedding model identifier.
    pub model: String,
    /// Width of the returned vectors; sent as the `dimensions` override.
    pub dimensions: usize,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Attempts per batch, including the first.
    pub max_retries: usize,
    /// Max inputs per request.
    pub batch_size: usize,
}

/// Blocking embeddings client that talks to OpenAI-compatible endpoints.
#[derive(Clone)]
pub struct OpenAiEncoder {
    client: Client,
    endpoint: String,
    model: String,
    dimensions: usize,
    max_retries: usize,
    batch_size: usize,
}

impl OpenAiEncoder {
    /// Builds a new client.
    pub fn new(settings: OpenAiSettings) -> Result<Self> {
        let OpenAiSettings {
            api_key,
            base_url,
            model,
            dimensions,
            timeout,
            max_retries,
            batch_size,
        } = settings;
        anyhow::ensure!(!api_key.trim().is_empty(), "missing OpenAI API key");
        anyhow::ensure!(!model.trim().is_empty(), "missing OpenAI model name");
        anyhow::ensure!(dimensions > 0, "embedding dimensions must be positive");
        let mut headers = reqwest::header::HeaderMap::new();
        let auth = format!("Bearer {}", api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth).context("invalid OpenAI API key")?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .context("failed to build OpenAI HTTP client")?;
        let endpoint = format!("{}/embeddings", base_url.trim_end_matches('/'));
        Ok(Self {
            client,
            endpoint,
            model,
            dimensions,
            max_retries: max_retries.max(1),
            batch_size: batch_size.max(1),
        })
    }

    /// Maximum batch size configured for this client.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn fail(&self, message: impl Into<String>) -> EncodingError {
        EncodingError::new(self.model.clone(), message)
    }

    fn request_batch(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>, EncodingError> {
        let mut attempt = 0usize;
        loop {
            let request = EmbeddingRequest {
                model: &self.model,
                input: inputs,
                dimensions: self.dimensions,
            };
            match self.client.post(&self.endpoint).json(&request).send() {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let mut parsed: EmbeddingResponse = resp.json().map_err(|err| {
                            self.fail(format!("failed to parse embedding response: {err}"))
                        })?;
                        parsed.data.sort_by_key(|entry| entry.index);
                        if parsed.data.len() != inputs.len() {
                            return Err(self.fail(format!(
                                "returned {} embeddings for {} inputs",
                                parsed.data.len(),
                                inputs.len()
                            )));
                        }
                        return Ok(parsed
                            .data
                            .into_iter()
                            .map(|entry| entry.embedding)
                            .collect());
                    }

                    let body = resp
                        .text()
                        .unwrap_or_else(|_| "<body unavailable>".to_string());
                    if should_retry(status) && attempt + 1 < self.max_retries {
                        attempt += 1;
                        warn!(%status, attempt, "retrying embedding request");
                        thread::sleep(retry_backoff(attempt));
                        continue;
                    }
                    return Err(self.fail(format!("request failed ({status}): {body}")));
                }
                Err(err) => {
                    if is_retryable_error(&err) && attempt + 1 < self.max_retries {
                        attempt += 1;
                        warn!(error = %err, attempt, "retrying embedding request");
                        thread::sleep(retry_backoff(attempt));
                        continue;
                    }
                    return Err(self.fail(err.to_string()));
                }
            }
        }
    }
}

impl Encoder for OpenAiEncoder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn encode(&self, text: &str) -> Result<Vec<f32>, EncodingError> {
        let mut embeddings = self.encode_batch(&[text])?;
        embeddings
            .pop()
            .ok_or_else(|| self.fail("no embedding returned"))
    }

    fn encode_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EncodingError> {
        // the endpoint rejects empty strings outright
        if let Some(position) = texts.iter().position(|text| text.is_empty()) {
            return Err(self.fail(format!("input {position} is empty")));
        }
        let mut out = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.batch_size) {
            debug!(inputs = chunk.len(), model = %self.model, "requesting embeddings");
            out.extend(self.request_batch(chunk)?);
        }
        Ok(out)
    }
}

fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_body() || err.is_request() || err.is_decode()
}

fn retry_backoff(attempt: usize) -> Duration {
    let capped = attempt.min(5) as u32;
    Duration::from_millis(500 * (1 << capped))
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    #[serde(borrow)]
    input: &'a [&'a str],
    dimensions: usize,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}
