use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;
use voice_agent::config::Config;
use voice_agent::error::ServiceError;
use voice_agent::handlers::AppState;
use voice_agent::llm::GenerationParams;
use voice_agent::models::ChatTurn;
use voice_agent::pipeline::{ChatModel, SpeechSynthesizer, Transcriber, VoiceAgent};
use voice_agent::retry::RetryPolicy;
use voice_agent::session::SessionStore;
use voice_agent::stt::Transcription;

const BOUNDARY: &str = "test-boundary-7MA4YWxkTrZu0gW";

struct FakeStt {
    configured: bool,
    fail: bool,
}

#[async_trait]
impl Transcriber for FakeStt {
    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn transcribe(&self, _audio_data: Vec<u8>) -> Result<Transcription, ServiceError> {
        if self.fail {
            return Err(ServiceError::new("transcription job failed"));
        }
        Ok(Transcription {
            text: "hello".to_string(),
            audio_duration: None,
        })
    }
}

struct FakeLlm {
    configured: bool,
    fail: bool,
}

#[async_trait]
impl ChatModel for FakeLlm {
    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn generate_reply(
        &self,
        _history: &[ChatTurn],
        _params: &GenerationParams,
    ) -> Result<String, ServiceError> {
        if self.fail {
            return Err(ServiceError::with_status("quota exceeded", 429));
        }
        Ok("hi there".to_string())
    }
}

struct FakeTts {
    configured: bool,
    fail: bool,
}

#[async_trait]
impl SpeechSynthesizer for FakeTts {
    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn synthesize(&self, _text: &str, _voice_id: &str) -> Result<String, ServiceError> {
        if self.fail {
            return Err(ServiceError::new("speech generation failed"));
        }
        Ok("https://cdn.example/audio.mp3".to_string())
    }

    async fn synthesize_fallback(
        &self,
        text: &str,
        voice_id: &str,
    ) -> Result<String, ServiceError> {
        self.synthesize(text, voice_id).await
    }
}

fn working_state() -> AppState {
    state_with(
        FakeStt {
            configured: true,
            fail: false,
        },
        FakeLlm {
            configured: true,
            fail: false,
        },
        FakeTts {
            configured: true,
            fail: false,
        },
    )
}

fn state_with(stt: FakeStt, llm: FakeLlm, tts: FakeTts) -> AppState {
    let agent = Arc::new(VoiceAgent::new(
        Arc::new(stt),
        Arc::new(llm),
        Arc::new(tts),
        Arc::new(SessionStore::new()),
        RetryPolicy::single_attempt(),
    ));
    AppState::with_agent(Config::default(), agent)
}

fn multipart_audio_request(uri: &str, audio: &[u8]) -> Request<Body> {
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
        .uri(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

fn multipart_text_request(uri: &str, fields: &[(&str, &str)]) -> Request<Body> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
        );
        body.extend_from_slice(value.as_bytes());
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri(uri)
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

#[tokio::test]
async fn test_index_page() {
    let app = voice_agent::create_app(working_state());

    let request = Request::builder().uri("/").body(Body::empty()).unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = voice_agent::create_app(working_state());

    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = response_json(response).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["services"]["llm"], true);
    assert_eq!(json["all_services_configured"], true);
    assert!(json["chat_statistics"].is_object());
}

#[tokio::test]
async fn test_api_info_lists_endpoints() {
    let app = voice_agent::create_app(working_state());

    let request = Request::builder()
        .uri("/api/info")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = response_json(response).await;
    assert!(json["endpoints"].is_object());
}

#[tokio::test]
async fn test_chat_turn_success() {
    let app = voice_agent::create_app(working_state());

    let request = multipart_audio_request("/agent/chat/s1", b"fake audio bytes");
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = response_json(response).await;
    assert_eq!(json["session_id"], "s1");
    assert_eq!(json["transcription"], "hello");
    assert_eq!(json["llm_response"], "hi there");
    assert_eq!(json["audio_url"], "https://cdn.example/audio.mp3");
    assert_eq!(json["is_fallback"], false);
    assert_eq!(json["message_count"], 2);
    assert!(json.get("error_type").is_none());
}

#[tokio::test]
async fn test_chat_rejects_empty_file() {
    let app = voice_agent::create_app(working_state());

    let request = multipart_audio_request("/agent/chat/s1", b"");
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = response_json(response).await;
    assert_eq!(json["error_type"], "GENERAL_ERROR");
    assert!(json["timestamp"].is_number());
}

#[tokio::test]
async fn test_chat_without_llm_key_returns_503() {
    let state = state_with(
        FakeStt {
            configured: true,
            fail: false,
        },
        FakeLlm {
            configured: false,
            fail: false,
        },
        FakeTts {
            configured: true,
            fail: false,
        },
    );
    let app = voice_agent::create_app(state);

    let request = multipart_audio_request("/agent/chat/s1", b"fake audio bytes");
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let json = response_json(response).await;
    assert_eq!(json["error_type"], "LLM_ERROR");
    assert_eq!(json["service_unavailable"], true);
    assert!(json["retry_suggestion"].is_string());
    assert!(json["timestamp"].is_number());
}

#[tokio::test]
async fn test_unspoken_fallback_surfaces_as_503_with_fallback_text() {
    // STT fails hard and the fallback cannot be spoken either.
    let state = state_with(
        FakeStt {
            configured: true,
            fail: true,
        },
        FakeLlm {
            configured: true,
            fail: false,
        },
        FakeTts {
            configured: true,
            fail: true,
        },
    );
    let app = voice_agent::create_app(state);

    let request = multipart_audio_request("/agent/chat/s1", b"fake audio bytes");
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let json = response_json(response).await;
    assert_eq!(json["error_type"], "STT_ERROR");
    assert_eq!(json["service_unavailable"], true);
    assert!(json["fallback_text"].is_string());
    assert_eq!(json["error"], json["fallback_text"]);
}

#[tokio::test]
async fn test_spoken_fallback_is_a_usable_turn() {
    // STT fails but the fallback is spoken, so the client gets a 200.
    let state = state_with(
        FakeStt {
            configured: true,
            fail: true,
        },
        FakeLlm {
            configured: true,
            fail: false,
        },
        FakeTts {
            configured: true,
            fail: false,
        },
    );
    let app = voice_agent::create_app(state);

    let request = multipart_audio_request("/agent/chat/s1", b"fake audio bytes");
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = response_json(response).await;
    assert_eq!(json["is_fallback"], true);
    assert_eq!(json["error_type"], "STT_ERROR");
    assert!(json["audio_url"].is_string());
    assert_eq!(json["message_count"], 0);
}

#[tokio::test]
async fn test_tts_soft_failure_returns_200_with_tts_error() {
    let state = state_with(
        FakeStt {
            configured: true,
            fail: false,
        },
        FakeLlm {
            configured: true,
            fail: false,
        },
        FakeTts {
            configured: true,
            fail: true,
        },
    );
    let app = voice_agent::create_app(state);

    let request = multipart_audio_request("/agent/chat/s1", b"fake audio bytes");
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = response_json(response).await;
    assert_eq!(json["is_fallback"], false);
    assert_eq!(json["llm_response"], "hi there");
    assert!(json.get("audio_url").map(Value::is_null).unwrap_or(true));
    assert_eq!(json["error_type"], "TTS_ERROR");
    assert!(json["tts_error"].is_string());
}

#[tokio::test]
async fn test_history_roundtrip_and_clear() {
    let state = working_state();
    let app = voice_agent::create_app(state);

    // Empty history before any turn.
    let request = Request::builder()
        .uri("/agent/chat/s1/history")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = response_json(response).await;
    assert_eq!(json["message_count"], 0);

    // One successful turn stores the exchange.
    let request = multipart_audio_request("/agent/chat/s1", b"fake audio bytes");
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let request = Request::builder()
        .uri("/agent/chat/s1/history")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let json = response_json(response).await;
    assert_eq!(json["message_count"], 2);
    assert_eq!(json["history"][0]["role"], "user");
    assert_eq!(json["history"][1]["role"], "assistant");

    // Clearing removes the session; clearing again is a 404.
    let request = Request::builder()
        .method(Method::DELETE)
        .uri("/agent/chat/s1")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let request = Request::builder()
        .method(Method::DELETE)
        .uri("/agent/chat/s1")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_stats_endpoint_counts_requests() {
    let app = voice_agent::create_app(working_state());

    let request = multipart_audio_request("/agent/chat/s1", b"fake audio bytes");
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let request = Request::builder()
        .uri("/agent/stats")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = response_json(response).await;
    assert_eq!(json["server"]["total_requests"], 1);
    assert_eq!(json["server"]["successful_turns"], 1);
    assert_eq!(json["statistics"]["total_sessions"], 1);
    assert_eq!(json["statistics"]["total_messages"], 2);
    assert_eq!(json["active_sessions"][0], "s1");
}

#[tokio::test]
async fn test_tts_endpoint_validates_text() {
    let app = voice_agent::create_app(working_state());

    let request = Request::builder()
        .method(Method::POST)
        .uri("/tts/generate")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"text": "   "}"#))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_tts_endpoint_unconfigured_returns_fallback_text() {
    let state = state_with(
        FakeStt {
            configured: true,
            fail: false,
        },
        FakeLlm {
            configured: true,
            fail: false,
        },
        FakeTts {
            configured: false,
            fail: false,
        },
    );
    let app = voice_agent::create_app(state);

    let request = Request::builder()
        .method(Method::POST)
        .uri("/tts/generate")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"text": "read this aloud"}"#))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let json = response_json(response).await;
    assert_eq!(json["error_type"], "TTS_ERROR");
    assert_eq!(json["fallback_text"], "read this aloud");
}

#[tokio::test]
async fn test_llm_query_with_text_input() {
    let app = voice_agent::create_app(working_state());

    let request = multipart_text_request(
        "/llm/query",
        &[
            ("text", "what is the weather"),
            ("system_instruction", "Answer only in haiku."),
        ],
    );
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = response_json(response).await;
    assert_eq!(json["llm_response"], "hi there");
    assert_eq!(json["audio_url"], "https://cdn.example/audio.mp3");
    // Text input: nothing was transcribed.
    assert!(json["transcription"].is_null());
    assert!(json["filename"].is_null());
    assert!(json.get("tts_error").is_none());
}

#[tokio::test]
async fn test_llm_query_with_audio_input() {
    let app = voice_agent::create_app(working_state());

    let request = multipart_audio_request("/llm/query", b"fake audio bytes");
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = response_json(response).await;
    assert_eq!(json["transcription"], "hello");
    assert_eq!(json["llm_response"], "hi there");
    assert_eq!(json["filename"], "clip.webm");
}

#[tokio::test]
async fn test_llm_query_requires_some_input() {
    let app = voice_agent::create_app(working_state());

    let request = multipart_text_request("/llm/query", &[("model", "gemini-1.5-flash")]);
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = response_json(response).await;
    assert_eq!(json["error_type"], "GENERAL_ERROR");
}

#[tokio::test]
async fn test_llm_query_reports_tts_error_without_audio() {
    let state = state_with(
        FakeStt {
            configured: true,
            fail: false,
        },
        FakeLlm {
            configured: true,
            fail: false,
        },
        FakeTts {
            configured: true,
            fail: true,
        },
    );
    let app = voice_agent::create_app(state);

    let request = multipart_text_request("/llm/query", &[("text", "hello")]);
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = response_json(response).await;
    assert_eq!(json["llm_response"], "hi there");
    assert!(json["audio_url"].is_null());
    assert!(json["tts_error"].is_string());
}

#[tokio::test]
async fn test_transcribe_endpoint() {
    let app = voice_agent::create_app(working_state());

    let request = multipart_audio_request("/stt/transcribe", b"fake audio bytes");
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = response_json(response).await;
    assert_eq!(json["transcription"], "hello");
    assert_eq!(json["filename"], "clip.webm");
}
