//! Common test utilities for E2E testing with mocks.
//!
//! This module provides a test fixture that builds the in-process router with
//! a mock converter behind the dispatcher, enabling end-to-end testing
//! without ffmpeg or a running network listener.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use nocturne_server::api::create_router;
use nocturne_server::state::AppState;

use nocturne_core::{
    metrics, testing::MockConverter, BlobStore, Config, DispatchConfig, Dispatcher, RateLimiter,
    SqliteBlobStore, SqliteRateLimitStore, SqliteTaskStore, TaskStore,
};

const BOUNDARY: &str = "nocturne-test-boundary";

/// Test fixture for E2E testing with a mock converter.
///
/// The dispatcher is not started automatically; call
/// [`TestFixture::start_worker`] once the test has made its pre-conversion
/// assertions.
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Mock converter - configure conversion results
    pub converter: MockConverter,
    /// The dispatcher driving the mock converter
    pub dispatcher: Dispatcher,
    /// Direct task store access for assertions
    pub tasks: Arc<SqliteTaskStore>,
    /// Direct blob store access for assertions
    pub blobs: Arc<SqliteBlobStore>,
    /// Temporary directory for the test database
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
    pub raw_body: Vec<u8>,
}

impl TestFixture {
    /// Create a new test fixture.
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");

        let tasks = Arc::new(SqliteTaskStore::new(&db_path).expect("Failed to create task store"));
        let blobs = Arc::new(SqliteBlobStore::new(&db_path).expect("Failed to create blob store"));
        let ratelimit_store = Arc::new(
            SqliteRateLimitStore::new(&db_path).expect("Failed to create rate limit store"),
        );

        let converter = MockConverter::new();

        let dispatcher = Dispatcher::new(
            DispatchConfig {
                workers: 1,
                queue_capacity: 2,
                claim_interval_secs: 1,
                result_ttl_secs: 3600,
            },
            Arc::clone(&tasks) as Arc<dyn TaskStore>,
            Arc::clone(&blobs) as Arc<dyn BlobStore>,
            Arc::new(converter.clone()),
        );

        let mut config = Config::default();
        config.database.path = db_path;

        let registry = prometheus::Registry::new();
        for metric in metrics::all_metrics() {
            // Collectors are process-wide statics; a second fixture in the
            // same process registers the same ones into its own registry.
            let _ = registry.register(metric);
        }

        let state = Arc::new(AppState::new(
            config,
            Arc::clone(&tasks) as Arc<dyn TaskStore>,
            Arc::clone(&blobs) as Arc<dyn BlobStore>,
            RateLimiter::new(ratelimit_store),
            registry,
        ));

        Self {
            router: create_router(state),
            converter,
            dispatcher,
            tasks,
            blobs,
            temp_dir,
        }
    }

    /// Start the worker pool behind the fixture.
    pub async fn start_worker(&self) {
        self.dispatcher.start().await;
    }

    /// Stop the worker pool.
    pub async fn stop_worker(&self) {
        self.dispatcher.stop().await;
    }

    /// Send a raw request through the router.
    pub async fn request(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("request should not fail at the transport level");

        let status = response.status();
        let headers = response.headers().clone();
        let raw_body = response
            .into_body()
            .collect()
            .await
            .expect("body collect")
            .to_bytes()
            .to_vec();
        let body = serde_json::from_slice(&raw_body).unwrap_or(Value::Null);

        TestResponse {
            status,
            headers,
            body,
            raw_body,
        }
    }

    /// Submit an audio conversion as `client`, returning the response.
    pub async fn submit(&self, client: &str, output_format: &str) -> TestResponse {
        let body = multipart_body(&[
            MultipartField::file("audio_file", "my song.mp3", "audio/mpeg", b"fake-audio"),
            MultipartField::text("output_format", output_format),
        ]);

        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/convert")
            .header("x-forwarded-for", client)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap();

        self.request(request).await
    }

    /// Poll a task as `client`.
    pub async fn check(&self, client: &str, task_id: &str) -> TestResponse {
        let request = Request::builder()
            .method("GET")
            .uri(format!("/api/v1/convert/check?task_id={}", task_id))
            .header("x-forwarded-for", client)
            .body(Body::empty())
            .unwrap();

        self.request(request).await
    }

    /// GET an arbitrary API path as `client`.
    pub async fn get(&self, client: &str, path: &str) -> TestResponse {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .header("x-forwarded-for", client)
            .body(Body::empty())
            .unwrap();

        self.request(request).await
    }

    /// Wait until the task reaches a terminal state in the store.
    pub async fn wait_for_terminal(&self, task_id: i64) {
        for _ in 0..100 {
            if let Some(task) = self.tasks.get(task_id).expect("task store read") {
                if task.state.is_terminal() {
                    return;
                }
            } else {
                // Already polled away.
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }
        panic!("task {} never reached a terminal state", task_id);
    }
}

pub enum MultipartField<'a> {
    Text {
        name: &'a str,
        value: &'a str,
    },
    File {
        name: &'a str,
        filename: &'a str,
        content_type: &'a str,
        data: &'a [u8],
    },
}

impl<'a> MultipartField<'a> {
    pub fn text(name: &'a str, value: &'a str) -> Self {
        Self::Text { name, value }
    }

    pub fn file(name: &'a str, filename: &'a str, content_type: &'a str, data: &'a [u8]) -> Self {
        Self::File {
            name,
            filename,
            content_type,
            data,
        }
    }
}

/// Builds a multipart/form-data body with the fixture's boundary.
pub fn multipart_body(fields: &[MultipartField]) -> Vec<u8> {
    let mut body = Vec::new();

    for field in fields {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match field {
            MultipartField::Text { name, value } => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name)
                        .as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            MultipartField::File {
                name,
                filename,
                content_type,
                data,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                        name, filename, content_type
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(data);
            }
        }
        body.extend_from_slice(b"\r\n");
    }

    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}
