// ============================================================================
// Video Gateway Tests
// ============================================================================
//
// Tests for:
// - Multipart upload validation and re-encoding
// - Streamed downloads
// - GET passthroughs (query string, user id, request id, backend errors)
//
// ============================================================================

use reqwest::multipart::{Form, Part};
use serde_json::Value;
use std::time::Duration;
use tokio::time::timeout;

use test_utils::{
    spawn_app, spawn_app_with_services, spawn_mock_auth_service, spawn_mock_video_service,
    DOWNLOAD_CHUNKS, NESTED_TOKEN, SLOW_UPLOAD_DELAY, SLOW_UPLOAD_NAME, VALID_TOKEN,
};
use video_gateway::config::ServicesConfig;

fn video_part(name: &str, data: &'static [u8]) -> Part {
    Part::bytes(data)
        .file_name(name.to_string())
        .mime_str("video/mp4")
        .unwrap()
}

fn form_with_files(field: &str, count: usize) -> Form {
    (0..count).fold(Form::new(), |form, i| {
        form.part(
            field.to_string(),
            video_part(&format!("clip_{}.mp4", i + 1), b"\x00\x00\x00\x18ftypmp42"),
        )
    })
}

#[tokio::test]
async fn test_upload_rejects_empty_form_without_backend_call() {
    let app = spawn_app().await;

    let form = Form::new().text("note", "no files here");
    let response = app
        .client
        .post(app.url("/videos/upload"))
        .bearer_auth(VALID_TOKEN)
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "No files provided");
    assert_eq!(body["error_code"], "VALIDATION_ERROR");
    assert_eq!(app.video.calls(), 0);
}

#[tokio::test]
async fn test_upload_rejects_more_than_three_files() {
    let app = spawn_app().await;

    let response = app
        .client
        .post(app.url("/videos/upload"))
        .bearer_auth(VALID_TOKEN)
        .multipart(form_with_files("videos", 4))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Maximum 3 files allowed");
    assert_eq!(app.video.calls(), 0);
    assert_eq!(app.error_count("ValidationError", "POST", "/videos/upload"), 1);
}

#[tokio::test]
async fn test_upload_forwards_one_to_three_files() {
    let app = spawn_app().await;

    for count in 1..=3 {
        let response = app
            .client
            .post(app.url("/videos/upload"))
            .bearer_auth(VALID_TOKEN)
            .multipart(form_with_files("videos", count))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 201);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["files"], count);
        assert_eq!(body["queuePosition"], 2);
    }

    let uploads = app.video.uploads();
    assert_eq!(uploads.len(), 3);
    assert_eq!(app.video.calls(), 3);

    let last = &uploads[2];
    assert_eq!(last.path, "/api/v1/videos/upload");
    assert_eq!(last.user_id.as_deref(), Some("user-42"));

    let names: Vec<_> = last
        .files
        .iter()
        .map(|f| f.file_name.clone().unwrap_or_default())
        .collect();
    assert_eq!(names, ["clip_1.mp4", "clip_2.mp4", "clip_3.mp4"]);

    for file in &last.files {
        assert_eq!(file.field, "videos");
        assert_eq!(file.content_type.as_deref(), Some("video/mp4"));
        assert_eq!(&file.data[..], b"\x00\x00\x00\x18ftypmp42");
    }
}

#[tokio::test]
async fn test_upload_single_uses_nested_identity() {
    let app = spawn_app().await;

    let form = Form::new().part("video", video_part("holiday.mov", b"moov-atom"));
    let response = app
        .client
        .post(app.url("/videos/upload-single"))
        .bearer_auth(NESTED_TOKEN)
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["zipFile"], "frames_1.zip");

    let uploads = app.video.uploads();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].path, "/api/v1/videos/upload-single");
    assert_eq!(uploads[0].user_id.as_deref(), Some("user-7"));
    assert_eq!(uploads[0].files.len(), 1);
    assert_eq!(uploads[0].files[0].field, "video");
    assert_eq!(uploads[0].files[0].file_name.as_deref(), Some("holiday.mov"));
}

#[tokio::test]
async fn test_upload_single_rejects_second_file() {
    let app = spawn_app().await;

    let response = app
        .client
        .post(app.url("/videos/upload-single"))
        .bearer_auth(VALID_TOKEN)
        .multipart(form_with_files("video", 2))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Only one file allowed");
    assert_eq!(app.video.calls(), 0);
}

#[tokio::test]
async fn test_download_sets_headers_and_relays_bytes() {
    let app = spawn_app().await;

    let response = app
        .client
        .get(app.url("/videos/download/frames_1.zip"))
        .bearer_auth(VALID_TOKEN)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["content-type"], "application/zip");
    assert_eq!(
        response.headers()["content-disposition"],
        "attachment; filename=frames_1.zip"
    );

    let body = response.bytes().await.unwrap();
    assert_eq!(&body[..], &DOWNLOAD_CHUNKS.concat()[..]);
}

#[tokio::test]
async fn test_download_streams_before_backend_finishes() {
    let app = spawn_app().await;

    // The backend holds its second chunk until released, so headers and the
    // first chunk can only arrive here if the gateway does not buffer.
    let mut response = timeout(
        Duration::from_secs(5),
        app.client
            .get(app.url("/videos/download/slow.zip"))
            .bearer_auth(VALID_TOKEN)
            .send(),
    )
    .await
    .expect("headers should arrive before the body completes")
    .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["content-type"], "application/zip");

    let first = timeout(Duration::from_secs(5), response.chunk())
        .await
        .expect("first chunk should arrive before the body completes")
        .unwrap()
        .unwrap();
    assert_eq!(&first[..], b"first-");

    app.video.release.notify_one();

    let mut rest = Vec::new();
    while let Some(chunk) = response.chunk().await.unwrap() {
        rest.extend_from_slice(&chunk);
    }
    assert_eq!(rest, b"second");
}

#[tokio::test]
async fn test_client_disconnect_releases_backend_stream() {
    let app = spawn_app().await;

    let mut response = app
        .client
        .get(app.url("/videos/download/slow.zip"))
        .bearer_auth(VALID_TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let first = timeout(Duration::from_secs(5), response.chunk())
        .await
        .expect("first chunk should arrive")
        .unwrap()
        .unwrap();
    assert_eq!(&first[..], b"first-");
    assert!(!app.video.stream_dropped());

    // Walk away mid-download; the second chunk is never released
    drop(response);

    let released = timeout(Duration::from_secs(5), async {
        while !app.video.stream_dropped() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(released.is_ok(), "backend stream still held after disconnect");

    assert_eq!(app.context.metrics.http_requests_in_flight.get(), 0);
    assert_eq!(
        app.request_count("GET", "/videos/download/:filename", "200"),
        1
    );
}

#[tokio::test]
async fn test_upload_outlasting_call_timeout_succeeds() {
    let auth = spawn_mock_auth_service().await;
    let video = spawn_mock_video_service().await;
    let services = ServicesConfig {
        auth_service_url: auth.url.clone(),
        video_service_url: video.url.clone(),
        timeout_secs: 1,
        upload_timeout_secs: 10,
        ..ServicesConfig::default()
    };
    assert!(SLOW_UPLOAD_DELAY > services.timeout());
    let app = spawn_app_with_services(auth, video, services).await;

    let form = Form::new().part("videos", video_part(SLOW_UPLOAD_NAME, b"slow-moov"));
    let response = app
        .client
        .post(app.url("/videos/upload"))
        .bearer_auth(VALID_TOKEN)
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 201);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["files"], 1);
    assert_eq!(app.video.uploads().len(), 1);
}

#[tokio::test]
async fn test_download_relays_backend_not_found() {
    let app = spawn_app().await;

    let response = app
        .client
        .get(app.url("/videos/download/missing.zip"))
        .bearer_auth(VALID_TOKEN)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 404);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["message"], "File not found");
    assert_eq!(
        app.error_count("BackendError", "GET", "/videos/download/:filename"),
        1
    );
}

#[tokio::test]
async fn test_list_forwards_query_user_and_request_id() {
    let app = spawn_app().await;

    let response = app
        .client
        .get(app.url("/videos?page=2&limit=10"))
        .bearer_auth(VALID_TOKEN)
        .header("X-Request-Id", "req-123")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["x-request-id"], "req-123");

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["userId"], "user-42");
    assert_eq!(body["requestId"], "req-123");
    assert_eq!(body["query"], "page=2&limit=10");
    assert_eq!(body["videos"][0]["filename"], "frames_1.zip");
}

#[tokio::test]
async fn test_request_id_generated_when_absent() {
    let app = spawn_app().await;

    let response = app
        .client
        .get(app.url("/videos/status"))
        .bearer_auth(VALID_TOKEN)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let request_id = response.headers()["x-request-id"]
        .to_str()
        .unwrap()
        .to_string();
    assert!(!request_id.is_empty());

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["userId"], "user-42");
    assert_eq!(body["queued"], 3);
}

#[tokio::test]
async fn test_backend_error_status_relayed() {
    let app = spawn_app().await;

    let response = app
        .client
        .get(app.url("/videos/queue/stats"))
        .bearer_auth(VALID_TOKEN)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 503);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["message"], "Queue unavailable");
}
