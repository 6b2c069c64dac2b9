//! HTTP client for the external image model.

use std::time::Duration;

use async_trait::async_trait;
use common::ModelConfig;
use common::model::{ContractError, ModelRequest, ModelResponse};
use reqwest::header::CONTENT_TYPE;

/// Errors from the model call.
#[derive(Debug, thiserror::Error)]
pub enum ModelClientError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout, body decode).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The model returned a non-2xx status code.
    #[error("model API error ({status}): {body}")]
    ApiError { status: u16, body: String },

    #[error(transparent)]
    Contract(#[from] ContractError),
}

impl ModelClientError {
    /// Transport failures, throttling and server errors are worth retrying;
    /// a 4xx or an unusable body means the model rejected the input.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Request(e) => !e.is_decode() && !e.is_builder(),
            Self::ApiError { status, .. } => *status == 429 || *status >= 500,
            Self::Contract(_) => false,
        }
    }
}

/// The model as seen by the worker.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn generate(&self, request: &ModelRequest) -> Result<ModelResponse, ModelClientError>;

    /// Fetch a generated image, returning its bytes and content type.
    async fn download(&self, url: &str) -> Result<(Vec<u8>, Option<String>), ModelClientError>;
}

pub struct HttpModelClient {
    client: reqwest::Client,
    config: ModelConfig,
}

impl HttpModelClient {
    pub fn new(config: ModelConfig) -> Result<Self, ModelClientError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ModelClientError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|e| format!("<failed to read body: {e}>"));
            return Err(ModelClientError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl ModelClient for HttpModelClient {
    async fn generate(&self, request: &ModelRequest) -> Result<ModelResponse, ModelClientError> {
        let mut builder = self.client.post(&self.config.endpoint).json(request);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = Self::ensure_success(builder.send().await?).await?;
        Ok(response.json::<ModelResponse>().await?)
    }

    async fn download(&self, url: &str) -> Result<(Vec<u8>, Option<String>), ModelClientError> {
        let response = Self::ensure_success(self.client.get(url).send().await?).await?;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await?;
        Ok((bytes.to_vec(), content_type))
    }
}
