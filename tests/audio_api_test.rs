mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use common::{
    EchoTranscoder, FAKE_MP3_HEADER, FailingTranscoder, multipart_body, multipart_content_type,
    setup_app, setup_app_with,
};
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tower::ServiceExt;

fn upload_request(uri: &str, body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", multipart_content_type())
        .body(Body::from(body))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_health() {
    let test = setup_app(Arc::new(EchoTranscoder::default()));

    let response = test
        .app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "ok");
    let timestamp = json["timestamp"].as_str().unwrap();
    assert!(chrono::DateTime::parse_from_rfc3339(timestamp).is_ok());
}

#[tokio::test]
async fn test_process_audio_success_cleans_scratch() {
    let transcoder = Arc::new(EchoTranscoder::default());
    let test = setup_app(transcoder.clone());

    let body = multipart_body("file", Some("voice.ogg"), "audio/ogg", b"OggS-voice-note");
    let response = test
        .app
        .clone()
        .oneshot(upload_request("/process-audio", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/mpeg");
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"processed_audio.mp3\""
    );

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert!(bytes.starts_with(FAKE_MP3_HEADER));
    assert!(bytes.ends_with(b"OggS-voice-note"));

    assert_eq!(transcoder.calls.load(Ordering::SeqCst), 1);
    assert!(test.scratch_entries().is_empty(), "{:?}", test.scratch_entries());
}

#[tokio::test]
async fn test_missing_file_field() {
    let test = setup_app(Arc::new(EchoTranscoder::default()));

    let body = multipart_body("comment", None, "text/plain", b"no file here");
    let response = test
        .app
        .clone()
        .oneshot(upload_request("/process-audio", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert_eq!(json["error"], "No audio file provided");
    assert!(test.scratch_entries().is_empty());
}

#[tokio::test]
async fn test_non_multipart_body_has_no_file() {
    let test = setup_app(Arc::new(EchoTranscoder::default()));

    let response = test
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/process-audio")
                .header("Content-Type", "application/json")
                .body(Body::from(r#"{"file": "nope"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert_eq!(json["error"], "No audio file provided");
}

#[tokio::test]
async fn test_unsupported_type_creates_no_files() {
    let transcoder = Arc::new(EchoTranscoder::default());
    let test = setup_app(transcoder.clone());

    let body = multipart_body("file", Some("notes.txt"), "text/plain", b"hello");
    let response = test
        .app
        .clone()
        .oneshot(upload_request("/process-audio", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert_eq!(
        json["error"],
        "Invalid file type. Expected audio file or .oga format"
    );
    assert_eq!(transcoder.calls.load(Ordering::SeqCst), 0);
    assert!(test.scratch_entries().is_empty());
}

#[tokio::test]
async fn test_oga_extension_with_generic_mime_accepted() {
    let test = setup_app(Arc::new(EchoTranscoder::default()));

    let body = multipart_body(
        "file",
        Some("clip.oga"),
        "application/octet-stream",
        b"OggS-clip",
    );
    let response = test
        .app
        .clone()
        .oneshot(upload_request("/process-audio", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(test.scratch_entries().is_empty());
}

#[tokio::test]
async fn test_oversized_upload_rejected_and_cleaned() {
    let transcoder = Arc::new(EchoTranscoder::default());
    let test = setup_app_with(transcoder.clone(), |config| config.max_file_size = 1024);

    let body = multipart_body("file", Some("long.oga"), "audio/ogg", &vec![7u8; 64 * 1024]);
    let response = test
        .app
        .clone()
        .oneshot(upload_request("/process-audio", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let json = json_body(response).await;
    assert!(json["error"].as_str().unwrap().starts_with("File too large"));
    assert_eq!(transcoder.calls.load(Ordering::SeqCst), 0);
    assert!(test.scratch_entries().is_empty(), "{:?}", test.scratch_entries());
}

#[tokio::test]
async fn test_engine_failure_reports_details_and_cleans() {
    let test = setup_app(Arc::new(FailingTranscoder));
    let scratch_dir = test.scratch.path().display().to_string();

    let body = multipart_body("file", Some("broken.oga"), "audio/ogg", b"not really ogg");
    let response = test
        .app
        .clone()
        .oneshot(upload_request("/process-audio", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = json_body(response).await;
    assert_eq!(json["error"], "Failed to process audio");
    let details = json["details"].as_str().unwrap();
    assert!(details.contains("Invalid data found when processing input"));
    assert!(!details.contains(&scratch_dir), "scratch path leaked: {details}");
    assert!(test.scratch_entries().is_empty(), "{:?}", test.scratch_entries());
}

#[tokio::test]
async fn test_concurrent_requests_are_isolated() {
    let test = setup_app(Arc::new(EchoTranscoder::default()));

    let mut handles = Vec::new();
    for i in 0..10 {
        let app = test.app.clone();
        handles.push(tokio::spawn(async move {
            let payload = format!("payload-{i}-{}", "x".repeat(i * 100));
            let body = multipart_body("file", Some("clip.oga"), "audio/ogg", payload.as_bytes());
            let response = app.oneshot(upload_request("/process-audio", body)).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let bytes = response.into_body().collect().await.unwrap().to_bytes();
            (payload, bytes)
        }));
    }

    for handle in handles {
        let (payload, bytes) = handle.await.unwrap();
        let mut expected = FAKE_MP3_HEADER.to_vec();
        expected.extend_from_slice(payload.as_bytes());
        assert_eq!(bytes.as_ref(), expected.as_slice());
    }

    assert!(test.scratch_entries().is_empty());
}

#[tokio::test]
async fn test_invalid_options_rejected() {
    let transcoder = Arc::new(EchoTranscoder::default());
    let test = setup_app(transcoder.clone());

    for uri in [
        "/process-audio?bitrate=loud",
        "/process-audio?threshold=-50dB:stop_periods=0",
        "/process-audio?min_silence=999",
        "/process-audio?min_silence=abc",
    ] {
        let body = multipart_body("file", Some("clip.oga"), "audio/ogg", b"OggS");
        let response = test
            .app
            .clone()
            .oneshot(upload_request(uri, body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
        let json = json_body(response).await;
        assert!(
            json["error"]
                .as_str()
                .unwrap()
                .starts_with("Invalid processing options"),
            "{uri}: {json}"
        );
    }

    assert_eq!(transcoder.calls.load(Ordering::SeqCst), 0);
    assert!(test.scratch_entries().is_empty());
}

#[tokio::test]
async fn test_valid_options_accepted() {
    let test = setup_app(Arc::new(EchoTranscoder::default()));

    let body = multipart_body("file", Some("clip.oga"), "audio/ogg", b"OggS");
    let response = test
        .app
        .clone()
        .oneshot(upload_request(
            "/process-audio?bitrate=192k&min_silence=0.25&threshold=-40dB",
            body,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let test = setup_app(Arc::new(EchoTranscoder::default()));

    let response = test
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/health")
                .header("x-request-id", "trace-abc-123")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.headers()["x-request-id"], "trace-abc-123");

    let response = test
        .app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let generated = response.headers()["x-request-id"].to_str().unwrap();
    assert!(uuid::Uuid::parse_str(generated).is_ok());
}

#[tokio::test]
async fn test_audio_info() {
    let test = setup_app(Arc::new(EchoTranscoder::default()));

    let body = multipart_body("file", Some("clip.oga"), "audio/ogg", b"OggS-12345");
    let response = test
        .app
        .clone()
        .oneshot(upload_request("/audio-info", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["codec"], "vorbis");
    assert_eq!(json["size"], 10);
    assert_eq!(json["streams"][0]["sample_rate"], 48000);
    assert!(test.scratch_entries().is_empty());
}

#[tokio::test]
async fn test_audio_info_probe_failure() {
    let test = setup_app(Arc::new(FailingTranscoder));

    let body = multipart_body("file", Some("clip.oga"), "audio/ogg", b"garbage");
    let response = test
        .app
        .clone()
        .oneshot(upload_request("/audio-info", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = json_body(response).await;
    assert_eq!(json["error"], "Failed to process audio");
    assert!(test.scratch_entries().is_empty());
}

#[tokio::test]
async fn test_openapi_document_lists_endpoints() {
    let test = setup_app(Arc::new(EchoTranscoder::default()));

    let response = test
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api-docs/openapi.json")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert!(json["paths"]["/process-audio"].is_object());
    assert!(json["paths"]["/audio-info"].is_object());
    assert!(json["paths"]["/health"].is_object());
}
