//! Client for OpenAI-compatible `/embeddings` endpoints.

use std::fmt;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use refrain_core::{Embedding, ModelSpec};

use crate::error::{EmbedError, EmbedResult};
use crate::provider::{check_response, EmbeddingProvider};

const USER_AGENT: &str = "refrain/0.1.0 (https://github.com/oxur/refrain)";

/// Everything the client needs to reach the provider.
#[derive(Clone)]
pub struct ProviderSettings {
    pub api_key: String,
    /// Base URL without the `/embeddings` suffix.
    pub base_url: String,
    pub model: ModelSpec,
    /// Request timeout when embedding a single text.
    pub single_timeout: Duration,
    /// Request timeout when embedding more than one text.
    pub batch_timeout: Duration,
    /// Extra attempts after a transient failure.
    pub max_retries: usize,
    /// First backoff delay; doubles on each retry.
    pub retry_min_delay: Duration,
    pub max_input_chars: usize,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: ModelSpec::new("text-embedding-3-small", 1536),
            single_timeout: Duration::from_secs(30),
            batch_timeout: Duration::from_secs(60),
            max_retries: 2,
            retry_min_delay: Duration::from_millis(500),
            max_input_chars: 8000,
        }
    }
}

impl fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("single_timeout", &self.single_timeout)
            .field("batch_timeout", &self.batch_timeout)
            .field("max_retries", &self.max_retries)
            .field("retry_min_delay", &self.retry_min_delay)
            .field("max_input_chars", &self.max_input_chars)
            .finish()
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
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

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Embeddings client for OpenAI and compatible services.
///
/// Every request carries a bounded timeout. Transient failures are retried
/// with exponential backoff a few times before being reported as
/// [`EmbedError::ProviderUnavailable`].
#[derive(Debug, Clone)]
pub struct OpenAiEmbedder {
    http: Client,
    endpoint: String,
    settings: ProviderSettings,
}

impl OpenAiEmbedder {
    /// Create a new client.
    ///
    /// # Errors
    /// Returns [`EmbedError::Config`] if the key is empty or the HTTP client
    /// cannot be built.
    pub fn new(settings: ProviderSettings) -> EmbedResult<Self> {
        if settings.api_key.trim().is_empty() {
            return Err(EmbedError::Config("missing provider API key".to_string()));
        }

        let mut auth = HeaderValue::from_str(&format!("Bearer {}", settings.api_key.trim()))
            .map_err(|_| EmbedError::Config("API key is not a valid header value".to_string()))?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()
            .map_err(|e| EmbedError::Config(format!("failed to build HTTP client: {e}")))?;

        let endpoint = format!("{}/embeddings", settings.base_url.trim_end_matches('/'));

        Ok(Self {
            http,
            endpoint,
            settings,
        })
    }

    fn validate_inputs(&self, texts: &[String]) -> EmbedResult<()> {
        if texts.is_empty() {
            return Err(EmbedError::rejected("no input texts"));
        }
        for (i, text) in texts.iter().enumerate() {
            if text.trim().is_empty() {
                return Err(EmbedError::rejected(format!("input {i} is empty")));
            }
            let chars = text.chars().count();
            if chars > self.settings.max_input_chars {
                return Err(EmbedError::rejected(format!(
                    "input {i} has {chars} characters, limit is {}",
                    self.settings.max_input_chars
                )));
            }
        }
        Ok(())
    }

    fn timeout_for(&self, count: usize) -> Duration {
        if count == 1 {
            self.settings.single_timeout
        } else {
            self.settings.batch_timeout
        }
    }

    async fn request(&self, texts: &[String], timeout: Duration) -> EmbedResult<Vec<Embedding>> {
        let body = EmbeddingRequest {
            model: &self.settings.model.name,
            input: texts,
            dimensions: self.settings.model.dimensions,
        };

        let response = self
            .http
            .post(&self.endpoint)
            .timeout(timeout)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = format!("{status}: {}", error_message(&text));
            return Err(if is_retryable_status(status) {
                EmbedError::unavailable(message)
            } else {
                EmbedError::rejected(message)
            });
        }

        let bytes = response.bytes().await?;
        let mut parsed: EmbeddingResponse = serde_json::from_slice(&bytes)
            .map_err(|e| EmbedError::rejected(format!("malformed response: {e}")))?;

        parsed.data.sort_by_key(|entry| entry.index);
        if parsed
            .data
            .iter()
            .enumerate()
            .any(|(expected, entry)| entry.index != expected)
        {
            return Err(EmbedError::rejected(
                "response indices do not cover the inputs",
            ));
        }

        Ok(parsed
            .data
            .into_iter()
            .map(|entry| Embedding::new(self.settings.model.name.clone(), entry.embedding))
            .collect())
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for OpenAiEmbedder {
    fn model(&self) -> &ModelSpec {
        &self.settings.model
    }

    async fn embed(&self, texts: &[String]) -> EmbedResult<Vec<Embedding>> {
        self.validate_inputs(texts)?;
        let timeout = self.timeout_for(texts.len());

        let backoff = ExponentialBuilder::default()
            .with_min_delay(self.settings.retry_min_delay)
            .with_max_times(self.settings.max_retries);

        let embeddings = (|| self.request(texts, timeout))
            .retry(backoff)
            .sleep(tokio::time::sleep)
            .when(EmbedError::is_transient)
            .notify(|err: &EmbedError, delay: Duration| {
                log::warn!(
                    "Embedding request for {} texts failed, retrying in {:?}: {}",
                    texts.len(),
                    delay,
                    err
                );
            })
            .await?;

        check_response(&self.settings.model, texts.len(), &embeddings)?;
        log::debug!("Embedded {} texts with {}", texts.len(), self.settings.model);
        Ok(embeddings)
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

/// The provider's own error message if the body carries one.
fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorResponse>(body)
        .map(|parsed| parsed.error.message)
        .unwrap_or_else(|_| {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                "<empty body>".to_string()
            } else {
                trimmed.chars().take(200).collect()
            }
        })
}
