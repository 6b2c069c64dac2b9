use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use common::model::{ImageDescriptor, ModelRequest, ModelResponse};
use common::store::JobStore;
use reqwest::Client;
use serde_json::Value;
use tokio::sync::Notify;

use server::config::{
    AppConfig, AuthConfig, CorsConfig, DatabaseConfig, DlqConfig, GenerationConfig, MqAppConfig,
    ServerConfig, StorageConfig,
};
use server::state::Services;
use server::utils::jwt::{self, Claims};
use worker::{ModelClient, ModelClientError};

pub const JWT_SECRET: &str = "test-secret-for-integration-tests";
pub const GENERATED_IMAGE: &[u8] = b"generated image bytes";
pub const SKETCH: &[u8] = b"\x89PNG sketch bytes";

pub mod routes {
    pub const ME: &str = "/api/v1/auth/me";
    pub const UPLOADS: &str = "/api/v1/uploads";
    pub const GENERATIONS: &str = "/api/v1/generations";
    pub const GENERATIONS_PAGE: &str = "/api/v1/generations/page";
    pub const GENERATIONS_SAVED: &str = "/api/v1/generations/saved";
    pub const GENERATIONS_LIVE: &str = "/api/v1/generations/live";
    pub const OPENAPI: &str = "/api-docs/openapi.json";

    pub fn upload(blob_ref: &str) -> String {
        format!("/api/v1/uploads/{blob_ref}")
    }

    pub fn blob(blob_ref: &str) -> String {
        format!("/api/v1/blobs/{blob_ref}")
    }

    pub fn generation(id: &str) -> String {
        format!("/api/v1/generations/{id}")
    }

    pub fn toggle_save(id: &str) -> String {
        format!("/api/v1/generations/{id}/toggle-save")
    }

    pub fn page(cursor: Option<&str>, page_size: u64) -> String {
        match cursor {
            Some(cursor) => format!("{GENERATIONS_PAGE}?page_size={page_size}&cursor={cursor}"),
            None => format!("{GENERATIONS_PAGE}?page_size={page_size}"),
        }
    }
}

/// How the stub model answers.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum StubBehavior {
    Succeed,
    /// 400: the model refuses the input.
    Reject,
    /// 503 on every call.
    Unavailable,
    /// Succeeds once [`StubModel::release`] is called.
    Gated,
}

pub struct StubModel {
    behavior: StubBehavior,
    gate: Notify,
    generate_calls: AtomicUsize,
    downloads: AtomicUsize,
}

impl StubModel {
    pub fn new(behavior: StubBehavior) -> Self {
        Self {
            behavior,
            gate: Notify::new(),
            generate_calls: AtomicUsize::new(0),
            downloads: AtomicUsize::new(0),
        }
    }

    pub fn release(&self) {
        self.gate.notify_one();
    }

    pub fn generate_calls(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }

    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelClient for StubModel {
    async fn generate(&self, request: &ModelRequest) -> Result<ModelResponse, ModelClientError> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        assert!(request.image.starts_with("data:image/png;base64,"));

        match self.behavior {
            StubBehavior::Reject => {
                return Err(ModelClientError::ApiError {
                    status: 400,
                    body: "unsafe prompt".into(),
                });
            }
            StubBehavior::Unavailable => {
                return Err(ModelClientError::ApiError {
                    status: 503,
                    body: "overloaded".into(),
                });
            }
            StubBehavior::Gated => self.gate.notified().await,
            StubBehavior::Succeed => {}
        }

        Ok(ModelResponse {
            final_image: Some(ImageDescriptor {
                url: "http://model.test/final.png".into(),
                content_type: Some("image/png".into()),
            }),
            previews: vec![ImageDescriptor {
                url: "http://model.test/preview.png".into(),
                content_type: None,
            }],
        })
    }

    async fn download(&self, url: &str) -> Result<(Vec<u8>, Option<String>), ModelClientError> {
        assert_eq!(url, "http://model.test/final.png");
        self.downloads.fetch_add(1, Ordering::SeqCst);
        Ok((GENERATED_IMAGE.to_vec(), Some("image/png".into())))
    }
}

/// A running test server with in-memory stores and a stub model.
pub struct TestApp {
    pub addr: SocketAddr,
    pub client: Client,
    pub jobs: Arc<dyn JobStore>,
    pub model: Arc<StubModel>,
    blob_dir: tempfile::TempDir,
}

/// Parsed HTTP response for test assertions.
pub struct TestResponse {
    pub status: u16,
    /// Raw response body as text.
    pub text: String,
    /// Parsed JSON body, or `Null` if the response is not valid JSON.
    pub body: Value,
}

impl TestResponse {
    async fn from_response(res: reqwest::Response) -> Self {
        let status = res.status().as_u16();
        let text = res.text().await.expect("Failed to read response body");
        let body = serde_json::from_str(&text).unwrap_or(Value::Null);
        Self { status, text, body }
    }
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(StubBehavior::Succeed).await
    }

    pub async fn spawn_with(behavior: StubBehavior) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let addr = listener.local_addr().unwrap();
        let blob_dir = tempfile::tempdir().expect("Failed to create blob dir");

        let app_config = AppConfig {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: addr.port(),
                cors: CorsConfig::default(),
            },
            database: DatabaseConfig::default(),
            auth: AuthConfig {
                jwt_secret: JWT_SECRET.to_string(),
            },
            storage: StorageConfig {
                blob_dir: blob_dir.path().to_path_buf(),
                max_blob_size: 64 * 1024,
                public_url: format!("http://{addr}"),
                ..Default::default()
            },
            generation: GenerationConfig {
                live_refresh_secs: 3600,
                ..Default::default()
            },
            mq: MqAppConfig::default(),
            dlq: DlqConfig {
                max_retries: 2,
                base_delay_ms: 5,
                max_delay_ms: 20,
                ..Default::default()
            },
        };

        let model = Arc::new(StubModel::new(behavior));
        let services = Services::build(app_config, None, None, model.clone())
            .await
            .expect("Failed to build services");
        let jobs = services.jobs.clone();
        let app = server::build_router(services.state);

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            client: Client::new(),
            jobs,
            model,
            blob_dir,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Sign a token for `owner_id` the way the identity provider would.
    pub fn token_for(&self, owner_id: &str) -> String {
        jwt::sign(&Claims::new(owner_id, chrono::Duration::hours(1)), JWT_SECRET)
            .expect("Failed to sign token")
    }

    pub async fn post_with_token(&self, path: &str, body: &Value, token: &str) -> TestResponse {
        let res = self
            .client
            .post(self.url(path))
            .header("Authorization", format!("Bearer {token}"))
            .json(body)
            .send()
            .await
            .expect("Failed to send POST request");

        TestResponse::from_response(res).await
    }

    pub async fn post_without_body(&self, path: &str, token: &str) -> TestResponse {
        let res = self
            .client
            .post(self.url(path))
            .header("Authorization", format!("Bearer {token}"))
            .send()
            .await
            .expect("Failed to send POST request");

        TestResponse::from_response(res).await
    }

    pub async fn get_with_token(&self, path: &str, token: &str) -> TestResponse {
        let res = self
            .client
            .get(self.url(path))
            .header("Authorization", format!("Bearer {token}"))
            .send()
            .await
            .expect("Failed to send GET request");

        TestResponse::from_response(res).await
    }

    pub async fn get_without_token(&self, path: &str) -> TestResponse {
        let res = self
            .client
            .get(self.url(path))
            .send()
            .await
            .expect("Failed to send GET request");

        TestResponse::from_response(res).await
    }

    pub async fn put_bytes_with_token(
        &self,
        path: &str,
        bytes: &[u8],
        content_type: &str,
        token: &str,
    ) -> TestResponse {
        let res = self
            .client
            .put(self.url(path))
            .header("Authorization", format!("Bearer {token}"))
            .header("Content-Type", content_type)
            .body(bytes.to_vec())
            .send()
            .await
            .expect("Failed to send PUT request");

        TestResponse::from_response(res).await
    }

    pub async fn delete_with_token(&self, path: &str, token: &str) -> TestResponse {
        let res = self
            .client
            .delete(self.url(path))
            .header("Authorization", format!("Bearer {token}"))
            .send()
            .await
            .expect("Failed to send DELETE request");

        TestResponse::from_response(res).await
    }

    /// Issue a handle and upload `bytes` to it, returning the blob ref.
    pub async fn upload_sketch(&self, token: &str, bytes: &[u8]) -> String {
        let handle = self.post_without_body(routes::UPLOADS, token).await;
        assert_eq!(handle.status, 201, "Upload handle failed: {}", handle.text);
        let blob_ref = handle.body["blob_ref"].as_str().unwrap().to_string();

        let put = self
            .put_bytes_with_token(&routes::upload(&blob_ref), bytes, "image/png", token)
            .await;
        assert_eq!(put.status, 201, "Upload failed: {}", put.text);
        blob_ref
    }

    /// Upload a sketch and start a generation from it, returning the job id.
    pub async fn create_generation(&self, token: &str, prompt: &str) -> String {
        let canvas_ref = self.upload_sketch(token, SKETCH).await;
        let res = self
            .post_with_token(
                routes::GENERATIONS,
                &serde_json::json!({"prompt": prompt, "canvas_ref": canvas_ref}),
                token,
            )
            .await;
        assert_eq!(res.status, 201, "Create generation failed: {}", res.text);
        res.body["id"].as_str().unwrap().to_string()
    }

    /// Poll the job until it reaches `status`, returning its view.
    pub async fn wait_for_status(&self, id: &str, token: &str, status: &str) -> Value {
        for _ in 0..200 {
            let res = self.get_with_token(&routes::generation(id), token).await;
            assert_eq!(res.status, 200, "Get generation failed: {}", res.text);
            if res.body["status"] == status {
                return res.body;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("Generation {id} never reached {status}");
    }

    /// Number of content files in the blob store.
    pub fn stored_blob_count(&self) -> usize {
        count_files(self.blob_dir.path())
    }
}

fn count_files(dir: &Path) -> usize {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    entries
        .flatten()
        .map(|entry| {
            let path = entry.path();
            if path.is_dir() {
                count_files(&path)
            } else {
                1
            }
        })
        .sum()
}
