//! End-to-end tests with a mocked converter.
//!
//! These tests run the full server stack in-process: multipart submission,
//! queue position reporting, worker completion, one-shot terminal reads, and
//! media download.

mod common;

use axum::http::StatusCode;

use common::TestFixture;
use nocturne_core::PipelineError;
use nocturne_core::{BlobStore, TaskStore};

fn task_id(response: &common::TestResponse) -> String {
    response.body["task_id"]
        .as_str()
        .expect("response carries a task_id")
        .to_string()
}

#[tokio::test]
async fn test_submit_poll_download_lifecycle() {
    let fixture = TestFixture::new().await;
    fixture
        .converter
        .set_output_bytes(b"night-audio".to_vec())
        .await;

    // Submit.
    let response = fixture.submit("10.0.0.1", "m4a").await;
    assert_eq!(response.status, StatusCode::ACCEPTED);
    let id = task_id(&response);

    // Still queued: position 1.
    let response = fixture.check("10.0.0.1", &id).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["complete"], false);
    assert_eq!(response.body["position"], 1);

    // Let the worker finish it.
    fixture.start_worker().await;
    fixture.wait_for_terminal(id.parse().unwrap()).await;

    // Terminal read hands out the file id.
    let response = fixture.check("10.0.0.1", &id).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["complete"], true);
    let file_id = response.body["file_id"]
        .as_str()
        .expect("completed check carries file_id")
        .to_string();

    // One-shot: the record is gone now.
    let response = fixture.check("10.0.0.1", &id).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    // The converted file downloads with its conversion metadata.
    let response = fixture
        .get("10.0.0.1", &format!("/api/v1/media/file/{}/whatever.m4a", file_id))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.raw_body, b"night-audio");
    assert_eq!(
        response.headers.get("content-type").unwrap(),
        "audio/mp4"
    );
    assert!(response
        .headers
        .get("content-disposition")
        .unwrap()
        .to_str()
        .unwrap()
        .contains("my_song.night.m4a"));

    // Describe and recents see it too.
    let response = fixture
        .get("10.0.0.1", &format!("/api/v1/media/describe/{}", file_id))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["content_type"], "audio/mp4");
    assert_eq!(response.body["length"], 11);

    let response = fixture.get("10.0.0.1", "/api/v1/media/recents").await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response
        .body
        .as_array()
        .unwrap()
        .iter()
        .any(|v| v == &serde_json::json!(file_id)));

    fixture.stop_worker().await;
}

#[tokio::test]
async fn test_submit_with_unsupported_format_creates_nothing() {
    let fixture = TestFixture::new().await;

    let response = fixture.submit("10.0.0.2", "mp3").await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["error"], "invalid_parameter");

    // Rejected at validation: no task, no blob.
    assert!(fixture.tasks.claim_oldest().unwrap().is_none());
    assert!(fixture.blobs.recent(10).unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_conversion_surfaces_stored_error_once() {
    let fixture = TestFixture::new().await;
    fixture
        .converter
        .set_next_error(PipelineError::unsupported_input("container 'mp4' is not supported"))
        .await;

    let response = fixture.submit("10.0.0.3", "ogg").await;
    let id = task_id(&response);

    fixture.start_worker().await;
    fixture.wait_for_terminal(id.parse().unwrap()).await;

    let response = fixture.check("10.0.0.3", &id).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["error"], "unsupported_input");

    // The failure was a one-shot read as well.
    let response = fixture.check("10.0.0.3", &id).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    fixture.stop_worker().await;
}

#[tokio::test]
async fn test_submission_rate_limit() {
    let fixture = TestFixture::new().await;

    for _ in 0..5 {
        let response = fixture.submit("10.0.0.4", "ogg").await;
        assert_eq!(response.status, StatusCode::ACCEPTED);
    }

    // The sixth submission within the window is rejected with a retry hint.
    let response = fixture.submit("10.0.0.4", "ogg").await;
    assert_eq!(response.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.body["error"], "rate_limited");
    let retry_after: i64 = response
        .headers
        .get("retry-after")
        .expect("rate limited response carries Retry-After")
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(retry_after > 0);

    // Another client is unaffected.
    let response = fixture.submit("10.0.0.5", "ogg").await;
    assert_eq!(response.status, StatusCode::ACCEPTED);
}

#[tokio::test]
async fn test_check_with_bad_ids() {
    let fixture = TestFixture::new().await;

    let response = fixture.check("10.0.0.6", "not-a-number").await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let response = fixture.check("10.0.0.6", "123456").await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_pending_upload_is_not_downloadable() {
    let fixture = TestFixture::new().await;

    // Submit but never start the worker: the input blob stays pending.
    let response = fixture.submit("10.0.0.7", "ogg").await;
    let id: i64 = task_id(&response).parse().unwrap();
    let input_ref = fixture.tasks.get(id).unwrap().unwrap().input_ref;

    let response = fixture
        .get("10.0.0.7", &format!("/api/v1/media/file/{}/x.ogg", input_ref))
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    let response = fixture
        .get("10.0.0.7", &format!("/api/v1/media/describe/{}", input_ref))
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_health_and_metrics() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("10.0.0.8", "/api/v1/health").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "ok");

    let response = fixture.get("10.0.0.8", "/api/v1/metrics").await;
    assert_eq!(response.status, StatusCode::OK);
    let text = String::from_utf8(response.raw_body).unwrap();
    assert!(text.contains("nocturne_tasks_enqueued_total"));
}
