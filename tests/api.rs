//! API endpoint integration tests

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use tower::ServiceExt;
use vox_relay::AudioFormat;
use vox_relay::api::ApiServer;
use vox_relay::pipeline::NO_SPEECH_MESSAGE;

mod common;
use common::{MockLlm, MockStt, MockTts, pipeline};

const BOUNDARY: &str = "vox-test-boundary";

/// Build a test API router over scripted gateways
fn build_test_router(
    dir: &std::path::Path,
    stt: Arc<MockStt>,
    tts: Option<Arc<MockTts>>,
) -> axum::Router {
    let pipeline = pipeline(dir, Some(stt), Some(MockLlm::replies("hi there")), tts, None);
    ApiServer::new(Arc::new(pipeline), "127.0.0.1", 0).router()
}

fn default_router(dir: &std::path::Path) -> axum::Router {
    build_test_router(
        dir,
        MockStt::hears("hello"),
        Some(MockTts::returns("https://cdn.example/a.mp3")),
    )
}

/// Encode a multipart form with an optional audio file and session id
fn multipart_body(audio: Option<&[u8]>, session_id: Option<&str>) -> Vec<u8> {
    let mut body = Vec::new();
    if let Some(audio) = audio {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"recording.webm\"\r\nContent-Type: audio/webm\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(audio);
        body.extend_from_slice(b"\r\n");
    }
    if let Some(id) = session_id {
        body.extend_from_slice(
            format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"session_id\"\r\n\r\n{id}\r\n")
                .as_bytes(),
        );
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn upload(uri: &str, audio: Option<&[u8]>, session_id: Option<&str>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(audio, session_id)))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, json: &serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let dir = tempfile::tempdir().unwrap();
    let app = build_test_router(dir.path(), MockStt::hears("hello"), None);

    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = json_body(response).await;
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
    assert_eq!(json["providers"]["stt"], true);
    assert_eq!(json["providers"]["llm"], true);
    assert_eq!(json["providers"]["tts"], false);
}

#[tokio::test]
async fn test_conversation_query() {
    let dir = tempfile::tempdir().unwrap();
    let app = default_router(dir.path());

    let response = app
        .oneshot(upload("/conversation/query", Some(b"webm-audio"), Some("session_1")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = json_body(response).await;
    assert_eq!(json["status"], "success");
    assert_eq!(json["user_query"], "hello");
    assert_eq!(json["ai_response"], "hi there");
    assert_eq!(json["audioFile"], "https://cdn.example/a.mp3");
    assert_eq!(json["session_id"], "session_1");
    assert_eq!(json["stages"]["stt"], true);
    assert_eq!(json["stages"]["llm"], true);
    assert_eq!(json["stages"]["tts"], true);
}

#[tokio::test]
async fn test_empty_audio_is_bad_request() {
    let dir = tempfile::tempdir().unwrap();
    let app = default_router(dir.path());

    let response = app
        .oneshot(upload("/conversation/query", Some(b""), Some("session_1")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = json_body(response).await;
    assert_eq!(json["error"]["code"], "bad_request");
    assert!(json["error"]["message"].is_string());
}

#[tokio::test]
async fn test_missing_file_is_bad_request() {
    let dir = tempfile::tempdir().unwrap();
    let app = default_router(dir.path());

    let response = app
        .oneshot(upload("/llm/query", None, Some("session_1")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_no_speech_is_a_normal_response() {
    let dir = tempfile::tempdir().unwrap();
    let app = build_test_router(dir.path(), MockStt::hears(""), None);

    let response = app
        .oneshot(upload("/llm/query", Some(b"silence"), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = json_body(response).await;
    assert_eq!(json["status"], "error");
    assert_eq!(json["ai_response"], NO_SPEECH_MESSAGE);
    // No fallback tiers configured
    assert!(json["audioFile"].as_str().unwrap().starts_with("web-speech:"));
}

#[tokio::test]
async fn test_history_after_query() {
    let dir = tempfile::tempdir().unwrap();
    let app = default_router(dir.path());

    let response = app
        .clone()
        .oneshot(upload("/conversation/query", Some(b"webm-audio"), Some("session_1")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(get("/conversation/session_1/history"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = json_body(response).await;
    assert_eq!(json["session_id"], "session_1");
    let messages = json["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["role"], "user");
    assert_eq!(messages[0]["content"], "hello");
    assert_eq!(messages[1]["role"], "assistant");
    assert_eq!(messages[1]["content"], "hi there");
}

#[tokio::test]
async fn test_history_of_unknown_session_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let app = default_router(dir.path());

    let response = app
        .oneshot(get("/conversation/never-seen/history"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = json_body(response).await;
    assert_eq!(json["messages"], serde_json::json!([]));
}

#[tokio::test]
async fn test_stateless_query_keeps_no_history() {
    let dir = tempfile::tempdir().unwrap();
    let app = default_router(dir.path());

    let response = app
        .clone()
        .oneshot(upload("/llm/query", Some(b"webm-audio"), Some("session_1")))
        .await
        .unwrap();
    let json = json_body(response).await;
    assert_eq!(json["status"], "success");
    assert!(json.get("session_id").is_none());

    let response = app
        .oneshot(get("/conversation/session_1/history"))
        .await
        .unwrap();
    let json = json_body(response).await;
    assert_eq!(json["messages"], serde_json::json!([]));
}

#[tokio::test]
async fn test_generate_audio() {
    let dir = tempfile::tempdir().unwrap();
    let tts = MockTts::returns("https://cdn.example/direct.mp3");
    let app = build_test_router(dir.path(), MockStt::hears("hello"), Some(tts.clone()));

    let response = app
        .oneshot(post_json(
            "/generate-audio",
            &serde_json::json!({ "text": "Good morning", "voiceId": "en-US-ken" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = json_body(response).await;
    assert_eq!(json["audioFile"], "https://cdn.example/direct.mp3");
    assert_eq!(tts.texts(), ["Good morning"]);
    assert_eq!(tts.formats(), [AudioFormat::Mp3]);
}

#[tokio::test]
async fn test_generate_audio_passes_format_through() {
    let dir = tempfile::tempdir().unwrap();
    let tts = MockTts::returns("https://cdn.example/direct.wav");
    let app = build_test_router(dir.path(), MockStt::hears("hello"), Some(tts.clone()));

    let response = app
        .clone()
        .oneshot(post_json(
            "/generate-audio",
            &serde_json::json!({ "text": "Good morning", "format": "wav" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(tts.formats(), [AudioFormat::Wav]);

    let response = app
        .oneshot(post_json(
            "/generate-audio",
            &serde_json::json!({ "text": "Good morning", "format": "aiff" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(tts.calls(), 1);
}

#[tokio::test]
async fn test_generate_audio_rejects_empty_text() {
    let dir = tempfile::tempdir().unwrap();
    let app = default_router(dir.path());

    let response = app
        .oneshot(post_json("/generate-audio", &serde_json::json!({ "text": "  " })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_generate_audio_without_tts() {
    let dir = tempfile::tempdir().unwrap();
    let app = build_test_router(dir.path(), MockStt::hears("hello"), None);

    let response = app
        .oneshot(post_json("/generate-audio", &serde_json::json!({ "text": "hi" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let json = json_body(response).await;
    assert_eq!(json["error"]["code"], "not_configured");
}

#[tokio::test]
async fn test_fallback_audio_is_served() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("gtts_abc.mp3"), common::MP3_BYTES).unwrap();
    let app = default_router(dir.path());

    let response = app
        .oneshot(get("/static/fallback/gtts_abc.mp3"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&body[..], common::MP3_BYTES);
}
