//! HTTP client for the generation API.

use async_trait::async_trait;
use common::blobs::{BlobRef, UploadHandle};
use common::{FeedPage, GenerationView};
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ClientError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout, body decode).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server answered with an error body.
    #[error("API error ({status}) {code}: {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },
}

impl ClientError {
    /// Machine-readable error code, when the server sent one.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Api { code, .. } => Some(code),
            Self::Request(_) => None,
        }
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    code: String,
    message: String,
}

#[derive(Deserialize)]
struct CreatedGeneration {
    id: Uuid,
}

/// The feed operations the reconciling [`Session`](crate::Session) needs.
#[async_trait]
pub trait FeedBackend: Send + Sync {
    async fn fetch_feed(&self) -> Result<Vec<GenerationView>, ClientError>;

    async fn toggle_save(&self, id: Uuid) -> Result<GenerationView, ClientError>;

    async fn delete(&self, id: Uuid) -> Result<(), ClientError>;
}

/// Authenticated client for `/api/v1`.
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl ApiClient {
    /// `base_url` is the server origin, e.g. `http://localhost:3000`.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{path}", self.base_url)
    }

    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let text = response.text().await.unwrap_or_default();
        let (code, message) = match serde_json::from_str::<ErrorBody>(&text) {
            Ok(body) => (body.code, body.message),
            Err(_) => ("UNKNOWN".to_string(), text),
        };
        debug!(status = status.as_u16(), %code, "API call rejected");
        Err(ClientError::Api {
            status: status.as_u16(),
            code,
            message,
        })
    }

    async fn get(&self, path: &str) -> Result<reqwest::Response, ClientError> {
        let response = self
            .client
            .get(self.url(path))
            .bearer_auth(&self.token)
            .send()
            .await?;
        Self::ensure_success(response).await
    }

    /// Reserve an upload handle for a sketch.
    pub async fn create_upload(&self) -> Result<UploadHandle, ClientError> {
        let response = self
            .client
            .post(self.url("/uploads"))
            .bearer_auth(&self.token)
            .send()
            .await?;
        Ok(Self::ensure_success(response).await?.json().await?)
    }

    /// Send the sketch bytes to a handle's `write_url`.
    pub async fn upload(
        &self,
        handle: &UploadHandle,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), ClientError> {
        let response = self
            .client
            .put(&handle.write_url)
            .bearer_auth(&self.token)
            .header(CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await?;
        Self::ensure_success(response).await?;
        Ok(())
    }

    pub async fn create_generation(
        &self,
        prompt: &str,
        canvas_ref: BlobRef,
    ) -> Result<Uuid, ClientError> {
        let response = self
            .client
            .post(self.url("/generations"))
            .bearer_auth(&self.token)
            .json(&serde_json::json!({ "prompt": prompt, "canvas_ref": canvas_ref }))
            .send()
            .await?;
        let created: CreatedGeneration = Self::ensure_success(response).await?.json().await?;
        Ok(created.id)
    }

    /// Upload a sketch and start a generation from it.
    pub async fn generate(
        &self,
        prompt: &str,
        sketch: Vec<u8>,
        content_type: &str,
    ) -> Result<Uuid, ClientError> {
        let handle = self.create_upload().await?;
        self.upload(&handle, sketch, content_type).await?;
        self.create_generation(prompt, handle.blob_ref).await
    }

    pub async fn fetch_page(
        &self,
        cursor: Option<&str>,
        page_size: u64,
    ) -> Result<FeedPage, ClientError> {
        let mut request = self
            .client
            .get(self.url("/generations/page"))
            .bearer_auth(&self.token)
            .query(&[("page_size", page_size.to_string())]);
        if let Some(cursor) = cursor {
            request = request.query(&[("cursor", cursor)]);
        }
        let response = Self::ensure_success(request.send().await?).await?;
        Ok(response.json().await?)
    }

    pub async fn fetch_saved(&self) -> Result<Vec<GenerationView>, ClientError> {
        Ok(self.get("/generations/saved").await?.json().await?)
    }

    pub async fn fetch_generation(&self, id: Uuid) -> Result<GenerationView, ClientError> {
        Ok(self.get(&format!("/generations/{id}")).await?.json().await?)
    }
}

#[async_trait]
impl FeedBackend for ApiClient {
    async fn fetch_feed(&self) -> Result<Vec<GenerationView>, ClientError> {
        Ok(self.get("/generations").await?.json().await?)
    }

    async fn toggle_save(&self, id: Uuid) -> Result<GenerationView, ClientError> {
        let response = self
            .client
            .post(self.url(&format!("/generations/{id}/toggle-save")))
            .bearer_auth(&self.token)
            .send()
            .await?;
        Ok(Self::ensure_success(response).await?.json().await?)
    }

    async fn delete(&self, id: Uuid) -> Result<(), ClientError> {
        let response = self
            .client
            .delete(self.url(&format!("/generations/{id}")))
            .bearer_auth(&self.token)
            .send()
            .await?;
        Self::ensure_success(response).await?;
        Ok(())
    }
}
