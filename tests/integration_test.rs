use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
};
use serde_json::{json, Value};
use tower::ServiceExt;
use voice_agent::config::Config;
use voice_agent::handlers::AppState;

const BOUNDARY: &str = "test-boundary-7MA4YWxkTrZu0gW";

/// Config pointing every upstream at one mock server.
fn mock_config(base_url: &str) -> Config {
    let mut config = Config::default();
    config.stt.base_url = base_url.to_string();
    config.stt.api_key = Some("stt-key".to_string());
    config.stt.poll_interval_ms = 10;
    config.stt.max_poll_attempts = 5;
    config.llm.base_url = base_url.to_string();
    config.llm.api_key = Some("llm-key".to_string());
    config.tts.base_url = base_url.to_string();
    config.tts.api_key = Some("tts-key".to_string());
    config.retry.max_attempts = 1;
    config.retry.base_delay_ms = 10;
    config
}

fn chat_request(audio: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        b"Content-Disposition: form-data; name=\"file\"; filename=\"clip.webm\"\r\n",
    );
    body.extend_from_slice(b"Content-Type: audio/webm\r\n\r\n");
    body.extend_from_slice(audio);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri("/agent/chat/e2e")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn response_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

async fn mock_stt(server: &mut mockito::ServerGuard) {
    server
        .mock("POST", "/v2/upload")
        .with_status(200)
        .with_body(json!({"upload_url": "https://cdn.example/u1"}).to_string())
        .create_async()
        .await;
    server
        .mock("POST", "/v2/transcript")
        .with_status(200)
        .with_body(json!({"id": "t1", "status": "queued"}).to_string())
        .create_async()
        .await;
    server
        .mock("GET", "/v2/transcript/t1")
        .with_status(200)
        .with_body(json!({"id": "t1", "status": "completed", "text": "hello"}).to_string())
        .create_async()
        .await;
}

#[tokio::test]
async fn full_turn_against_mock_upstreams() {
    let mut server = mockito::Server::new_async().await;
    mock_stt(&mut server).await;

    server
        .mock("POST", "/v1beta/models/gemini-1.5-flash:generateContent")
        .match_query(mockito::Matcher::Any)
        .with_status(200)
        .with_body(
            json!({"candidates": [{"content": {"parts": [{"text": "hi there"}]}}]}).to_string(),
        )
        .create_async()
        .await;
    server
        .mock("POST", "/v1/speech/generate")
        .with_status(200)
        .with_body(json!({"audioFile": "https://cdn.example/a.mp3"}).to_string())
        .create_async()
        .await;

    let app = voice_agent::create_app(AppState::new(mock_config(&server.url())));

    let response = app.clone().oneshot(chat_request(b"audio")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let chat = response_json(response).await;
    assert_eq!(chat["transcription"], "hello");
    assert_eq!(chat["llm_response"], "hi there");
    assert_eq!(chat["audio_url"], "https://cdn.example/a.mp3");
    assert_eq!(chat["is_fallback"], false);
    assert_eq!(chat["message_count"], 2);

    // The stored history comes back through the API.
    let request = Request::builder()
        .uri("/agent/chat/e2e/history")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    let history = response_json(response).await;
    assert_eq!(history["message_count"], 2);
    assert_eq!(history["history"][0]["text"], "hello");
    assert_eq!(history["history"][1]["text"], "hi there");
}

#[tokio::test]
async fn llm_quota_failure_becomes_a_spoken_quota_fallback() {
    let mut server = mockito::Server::new_async().await;
    mock_stt(&mut server).await;

    server
        .mock("POST", "/v1beta/models/gemini-1.5-flash:generateContent")
        .match_query(mockito::Matcher::Any)
        .with_status(429)
        .with_body("rate limited")
        .create_async()
        .await;
    server
        .mock("POST", "/v1/speech/generate")
        .with_status(200)
        .with_body(json!({"audioFile": "https://cdn.example/fallback.mp3"}).to_string())
        .create_async()
        .await;

    let app = voice_agent::create_app(AppState::new(mock_config(&server.url())));

    let response = app.oneshot(chat_request(b"audio")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let chat = response_json(response).await;
    assert_eq!(chat["is_fallback"], true);
    assert_eq!(chat["error_type"], "QUOTA_ERROR");
    assert_eq!(chat["transcription"], "hello");
    assert_eq!(chat["audio_url"], "https://cdn.example/fallback.mp3");
    assert_eq!(chat["message_count"], 0);
}

#[tokio::test]
async fn tts_outage_degrades_the_turn_to_text() {
    let mut server = mockito::Server::new_async().await;
    mock_stt(&mut server).await;

    server
        .mock("POST", "/v1beta/models/gemini-1.5-flash:generateContent")
        .match_query(mockito::Matcher::Any)
        .with_status(200)
        .with_body(
            json!({"candidates": [{"content": {"parts": [{"text": "hi there"}]}}]}).to_string(),
        )
        .create_async()
        .await;
    server
        .mock("POST", "/v1/speech/generate")
        .with_status(503)
        .with_body("upstream down")
        .create_async()
        .await;

    let app = voice_agent::create_app(AppState::new(mock_config(&server.url())));

    let response = app.oneshot(chat_request(b"audio")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let chat = response_json(response).await;
    assert_eq!(chat["is_fallback"], false);
    assert_eq!(chat["llm_response"], "hi there");
    assert!(chat
        .get("audio_url")
        .map(Value::is_null)
        .unwrap_or(true));
    assert_eq!(chat["error_type"], "TTS_ERROR");
    assert_eq!(chat["message_count"], 2);
}

#[tokio::test]
async fn total_outage_returns_error_contract() {
    // No mocks at all: STT fails, and fallback TTS fails too.
    let server = mockito::Server::new_async().await;

    let app = voice_agent::create_app(AppState::new(mock_config(&server.url())));

    let response = app.oneshot(chat_request(b"audio")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let error = response_json(response).await;
    assert!(error["error"].is_string());
    assert!(error["error_type"].is_string());
    assert_eq!(error["service_unavailable"], true);
    assert!(error["fallback_text"].is_string());
    assert!(error["timestamp"].is_number());
}
