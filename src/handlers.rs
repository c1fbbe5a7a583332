use crate::config::Config;
use crate::error::{ErrorCategory, PipelineStep};
use crate::llm::{GenerationParams, LlmClient};
use crate::models::*;
use crate::pipeline::{TurnParams, VoiceAgent};
use crate::retry::RetryPolicy;
use crate::session::SessionStore;
use crate::stt::SttClient;
use crate::tts::TtsClient;
use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{Html, Json},
};
use chrono::Utc;
use log::{error, info, warn};
use std::sync::{Arc, Mutex};
use std::time::Instant;

// =============================================================================
// Application State
// =============================================================================

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub agent: Arc<VoiceAgent>,
    pub stats: Arc<Mutex<ServerStats>>,
    pub start_time: Arc<Instant>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let transcriber = Arc::new(SttClient::new(&config.stt));
        let chat_model = Arc::new(LlmClient::new(&config.llm));
        let synthesizer = Arc::new(TtsClient::new(&config.tts));
        let sessions = Arc::new(SessionStore::new());
        let retry = RetryPolicy::from_config(&config.retry);

        let agent = Arc::new(VoiceAgent::new(
            transcriber,
            chat_model,
            synthesizer,
            sessions,
            retry,
        ));

        Self::with_agent(config, agent)
    }

    /// State with a pre-built agent; tests inject fakes through this.
    pub fn with_agent(config: Config, agent: Arc<VoiceAgent>) -> Self {
        Self {
            config: Arc::new(config),
            agent,
            stats: Arc::new(Mutex::new(ServerStats::default())),
            start_time: Arc::new(Instant::now()),
        }
    }
}

// =============================================================================
// Error Handling
// - Bit-exact error payload: { error, error_type, fallback_text?,
//   service_unavailable?, original_error?, retry_suggestion?, timestamp }
// =============================================================================

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub error: String,
    pub error_type: ErrorCategory,
    pub fallback_text: Option<String>,
    pub service_unavailable: Option<bool>,
    pub original_error: Option<String>,
    pub retry_suggestion: Option<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, error_type: ErrorCategory, error: impl Into<String>) -> Self {
        Self {
            status,
            error: error.into(),
            error_type,
            fallback_text: None,
            service_unavailable: None,
            original_error: None,
            retry_suggestion: Some(error_type.retry_suggestion().to_string()),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        let mut error = Self::new(StatusCode::BAD_REQUEST, ErrorCategory::GeneralError, message);
        error.retry_suggestion = None;
        error
    }

    pub fn payload_too_large(message: impl Into<String>) -> Self {
        let mut error = Self::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            ErrorCategory::GeneralError,
            message,
        );
        error.retry_suggestion = None;
        error
    }

    pub fn service_unavailable(error_type: ErrorCategory, message: impl Into<String>) -> Self {
        let mut error = Self::new(StatusCode::SERVICE_UNAVAILABLE, error_type, message);
        error.service_unavailable = Some(true);
        error
    }

    pub fn with_fallback_text(mut self, text: impl Into<String>) -> Self {
        self.fallback_text = Some(text.into());
        self
    }

    pub fn with_original_error(mut self, detail: impl Into<String>) -> Self {
        self.original_error = Some(detail.into());
        self
    }
}

impl axum::response::IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let response = ErrorResponse {
            error: self.error,
            error_type: self.error_type,
            fallback_text: self.fallback_text,
            service_unavailable: self.service_unavailable,
            original_error: self.original_error,
            retry_suggestion: self.retry_suggestion,
            timestamp: Utc::now().timestamp_millis(),
        };

        (self.status, Json(response)).into_response()
    }
}

// =============================================================================
// Multipart Parsing
// =============================================================================

struct ChatForm {
    file_data: Vec<u8>,
    filename: String,
    content_type: Option<String>,
    text: Option<String>,
    model: Option<String>,
    temperature: Option<f32>,
    system_instruction: Option<String>,
    voice_id: Option<String>,
}

async fn read_chat_form(mut multipart: Multipart) -> Result<ChatForm, ApiError> {
    let mut file_data = Vec::new();
    let mut filename = String::new();
    let mut content_type = None;
    let mut text = None;
    let mut model = None;
    let mut temperature = None;
    let mut system_instruction = None;
    let mut voice_id = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("failed to parse multipart data: {}", e)))?
    {
        let field_name = field.name().unwrap_or("").to_string();

        match field_name.as_str() {
            "file" => {
                filename = field.file_name().unwrap_or("audio").to_string();
                content_type = field.content_type().map(|s| s.to_string());
                file_data = field
                    .bytes()
                    .await
                    .map_err(|e| {
                        ApiError::bad_request(format!("failed to read audio data: {}", e))
                    })?
                    .to_vec();
            }
            "text" => {
                let value = field.text().await.map_err(|e| {
                    ApiError::bad_request(format!("failed to read text field: {}", e))
                })?;
                if !value.trim().is_empty() {
                    text = Some(value);
                }
            }
            "model" => {
                let value = field.text().await.map_err(|e| {
                    ApiError::bad_request(format!("failed to read model field: {}", e))
                })?;
                if !value.trim().is_empty() {
                    model = Some(value);
                }
            }
            "system_instruction" => {
                let value = field.text().await.map_err(|e| {
                    ApiError::bad_request(format!("failed to read system_instruction field: {}", e))
                })?;
                if !value.trim().is_empty() {
                    system_instruction = Some(value);
                }
            }
            "temperature" => {
                let value = field.text().await.map_err(|e| {
                    ApiError::bad_request(format!("failed to read temperature field: {}", e))
                })?;
                if !value.trim().is_empty() {
                    let parsed: f32 = value.parse().map_err(|_| {
                        ApiError::bad_request(format!("invalid temperature: {}", value))
                    })?;
                    if !(0.0..=2.0).contains(&parsed) {
                        return Err(ApiError::bad_request(
                            "temperature must be between 0.0 and 2.0",
                        ));
                    }
                    temperature = Some(parsed);
                }
            }
            "voiceId" => {
                let value = field.text().await.map_err(|e| {
                    ApiError::bad_request(format!("failed to read voiceId field: {}", e))
                })?;
                if !value.trim().is_empty() {
                    voice_id = Some(value);
                }
            }
            _ => {} // Unknown fields are ignored
        }
    }

    Ok(ChatForm {
        file_data,
        filename,
        content_type,
        text,
        model,
        temperature,
        system_instruction,
        voice_id,
    })
}

fn validate_audio_upload(state: &AppState, form: &ChatForm) -> Result<(), ApiError> {
    if form.file_data.is_empty() {
        return Err(ApiError::bad_request("no audio file provided"));
    }

    if form.file_data.len() > state.config.max_file_size_bytes() {
        return Err(ApiError::payload_too_large(format!(
            "audio file exceeds the {} MB limit",
            state.config.agent.max_file_size_mb
        )));
    }

    if let Some(content_type) = &form.content_type {
        if !state.config.is_allowed_audio_type(content_type) {
            return Err(ApiError::bad_request(format!(
                "unsupported audio type: {}. Allowed types: {}",
                content_type,
                state.config.agent.allowed_audio_types.join(", ")
            )));
        }
    }

    Ok(())
}

// =============================================================================
// Chat Endpoints
// =============================================================================

/// One full conversation turn: audio in, transcription + reply + audio out.
pub async fn chat_with_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    multipart: Multipart,
) -> ApiResult<Json<ChatResponse>> {
    state.stats.lock().unwrap().record_request();

    info!("Processing chat request for session: {}", session_id);

    let form = read_chat_form(multipart).await?;
    validate_audio_upload(&state, &form)?;

    if !state.agent.chat_model().is_configured() {
        error!("LLM service not configured");
        state.stats.lock().unwrap().record_failure();
        return Err(ApiError::service_unavailable(
            ErrorCategory::LlmError,
            "LLM service unavailable - API key not configured",
        ));
    }

    let params = TurnParams {
        model: form
            .model
            .clone()
            .unwrap_or_else(|| state.config.llm.default_model.clone()),
        temperature: form.temperature.unwrap_or(0.7),
        voice_id: form
            .voice_id
            .clone()
            .unwrap_or_else(|| state.config.tts.default_voice.clone()),
    };

    let result = state
        .agent
        .run_turn(&session_id, form.file_data, &params)
        .await;

    {
        let mut stats = state.stats.lock().unwrap();
        if result.is_fallback {
            stats.record_fallback();
        } else {
            stats.record_success();
        }
    }

    // A fallback that could not be spoken is a plain service failure for the
    // client; a spoken fallback still counts as a usable turn.
    if result.is_fallback && result.audio_url.is_none() {
        let category = result.error_category.unwrap_or(ErrorCategory::GeneralError);
        return Err(ApiError::service_unavailable(category, result.llm_response.clone())
            .with_fallback_text(result.llm_response));
    }

    let message_count = state.agent.sessions().message_count(&session_id);

    Ok(Json(ChatResponse {
        session_id,
        model: params.model,
        transcription: result.transcription,
        llm_response: result.llm_response,
        audio_url: result.audio_url,
        voice_id: params.voice_id,
        filename: Some(form.filename),
        message_count,
        is_fallback: result.is_fallback,
        error_type: result.error_category,
        tts_error: result.tts_error,
    }))
}

pub async fn session_history(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Json<SessionHistoryResponse> {
    let history = state.agent.sessions().history(&session_id);

    Json(SessionHistoryResponse {
        message_count: history.len(),
        session_id,
        history,
    })
}

pub async fn clear_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    if state.agent.sessions().clear(&session_id) {
        Ok(Json(serde_json::json!({
            "message": format!("Session {} cleared successfully", session_id)
        })))
    } else {
        let mut error = ApiError::new(
            StatusCode::NOT_FOUND,
            ErrorCategory::GeneralError,
            "Session not found",
        );
        error.retry_suggestion = None;
        Err(error)
    }
}

pub async fn agent_stats(State(state): State<AppState>) -> Json<serde_json::Value> {
    let mut server_stats = state.stats.lock().unwrap().clone();
    server_stats.uptime_seconds = state.start_time.elapsed().as_secs();

    Json(serde_json::json!({
        "statistics": state.agent.sessions().stats(),
        "active_sessions": state.agent.sessions().active_sessions(),
        "server": server_stats,
    }))
}

/// Sessionless LLM query: direct text, or audio that is transcribed first.
/// No history is read or written; TTS of the reply is best-effort.
pub async fn llm_query(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Json<LlmQueryResponse>> {
    let form = read_chat_form(multipart).await?;

    if !state.agent.chat_model().is_configured() {
        error!("LLM service not configured");
        return Err(ApiError::service_unavailable(
            ErrorCategory::LlmError,
            "LLM service unavailable - API key not configured",
        ));
    }

    let has_audio = !form.file_data.is_empty();
    let (user_text, filename) = if has_audio {
        if !state.agent.transcriber().is_configured() {
            return Err(ApiError::service_unavailable(
                ErrorCategory::SttError,
                "Transcription service unavailable for audio input",
            ));
        }
        validate_audio_upload(&state, &form)?;

        info!(
            "LLM query with audio input: {} ({} bytes)",
            form.filename,
            form.file_data.len()
        );
        let transcription = state
            .agent
            .transcriber()
            .transcribe(form.file_data)
            .await
            .map_err(|e| {
                error!("Transcription failed for LLM query: {}", e);
                let category = e.categorize_for(PipelineStep::Transcribe);
                ApiError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    category,
                    "Transcription failed",
                )
                .with_original_error(e.to_string())
            })?;
        (transcription.text, Some(form.filename))
    } else {
        match form.text.as_deref().map(str::trim) {
            Some(text) if !text.is_empty() => (text.to_string(), None),
            _ => {
                return Err(ApiError::bad_request(
                    "either an audio file or a text field is required",
                ))
            }
        }
    };

    let params = GenerationParams {
        model: form
            .model
            .clone()
            .unwrap_or_else(|| state.config.llm.default_model.clone()),
        temperature: form.temperature.unwrap_or(0.7),
        system_instruction: form.system_instruction.clone(),
    };
    let voice_id = form
        .voice_id
        .clone()
        .unwrap_or_else(|| state.config.tts.default_voice.clone());

    let prompt = vec![ChatTurn::user(user_text.clone())];
    let reply = match state.agent.chat_model().generate_reply(&prompt, &params).await {
        Ok(reply) => reply,
        Err(e) => {
            error!("LLM query failed: {}", e);
            let category = e.categorize_for(PipelineStep::Generate);
            return Err(ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                category,
                category.fallback_message(),
            )
            .with_original_error(e.to_string()));
        }
    };

    let (audio_url, tts_error) = if state.agent.synthesizer().is_configured() {
        match state.agent.synthesizer().synthesize(&reply, &voice_id).await {
            Ok(url) => (Some(url), None),
            Err(e) => {
                warn!("TTS failed for LLM query: {}", e);
                (None, Some(e.to_string()))
            }
        }
    } else {
        (None, Some("TTS service not configured".to_string()))
    };

    Ok(Json(LlmQueryResponse {
        transcription: has_audio.then_some(user_text),
        llm_response: reply,
        audio_url,
        model: params.model,
        voice_id,
        filename,
        tts_error,
    }))
}

// =============================================================================
// STT / TTS Endpoints
// =============================================================================

pub async fn transcribe_audio(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Json<TranscriptionResponse>> {
    let form = read_chat_form(multipart).await?;
    validate_audio_upload(&state, &form)?;

    if !state.agent.transcriber().is_configured() {
        return Err(ApiError::service_unavailable(
            ErrorCategory::SttError,
            "Transcription service unavailable - API key not configured",
        ));
    }

    let size_bytes = form.file_data.len();
    info!("Transcribing audio file: {} ({} bytes)", form.filename, size_bytes);

    match state.agent.transcriber().transcribe(form.file_data).await {
        Ok(transcription) => Ok(Json(TranscriptionResponse {
            transcription: transcription.text,
            filename: form.filename,
            content_type: form.content_type.unwrap_or_else(|| "audio/webm".to_string()),
            size_bytes,
            audio_duration: transcription.audio_duration,
        })),
        Err(e) => {
            error!("Transcription failed: {}", e);
            let category = e.categorize_for(PipelineStep::Transcribe);
            Err(
                ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, category, "Transcription failed")
                    .with_original_error(e.to_string()),
            )
        }
    }
}

pub async fn generate_audio(
    State(state): State<AppState>,
    Json(request): Json<TtsRequest>,
) -> ApiResult<Json<TtsResponse>> {
    if request.text.trim().is_empty() {
        return Err(ApiError::bad_request("text must not be empty"));
    }

    if request.text.chars().count() > state.config.agent.max_text_length {
        return Err(ApiError::bad_request(format!(
            "text exceeds the {} character limit",
            state.config.agent.max_text_length
        )));
    }

    if !state.agent.synthesizer().is_configured() {
        return Err(ApiError::service_unavailable(
            ErrorCategory::TtsError,
            "TTS service unavailable - API key not configured",
        )
        .with_fallback_text(request.text));
    }

    let voice_id = request
        .voice_id
        .unwrap_or_else(|| state.config.tts.default_voice.clone());

    info!("TTS request for {} characters", request.text.chars().count());

    match state
        .agent
        .synthesizer()
        .synthesize(&request.text, &voice_id)
        .await
    {
        Ok(audio_url) => Ok(Json(TtsResponse {
            audio_url,
            text: request.text,
            voice_id,
        })),
        Err(e) => {
            error!("TTS generation failed: {}", e);
            let category = e.categorize_for(PipelineStep::Synthesize);
            Err(ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                category,
                "Failed to generate audio",
            )
            .with_fallback_text(request.text)
            .with_original_error(e.to_string()))
        }
    }
}

// =============================================================================
// System Endpoints
// =============================================================================

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let services = ServicesStatus {
        stt: state.agent.transcriber().is_configured(),
        llm: state.agent.chat_model().is_configured(),
        tts: state.agent.synthesizer().is_configured(),
    };
    let all_services_configured = services.stt && services.llm && services.tts;

    if !all_services_configured {
        warn!("Health check: some services are not configured");
    }

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        services,
        chat_statistics: state.agent.sessions().stats(),
        all_services_configured,
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
}

pub async fn api_info(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "app_name": state.config.agent.title,
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "chat": "/agent/chat/{session_id}",
            "llm": "/llm/query",
            "tts": "/tts/generate",
            "stt": "/stt/transcribe",
            "health": "/health",
        },
        "supported_audio_formats": state.config.agent.allowed_audio_types,
        "max_file_size_mb": state.config.agent.max_file_size_mb,
        "max_text_length": state.config.agent.max_text_length,
    }))
}

pub async fn index(State(state): State<AppState>) -> Html<String> {
    let title = &state.config.agent.title;

    let html = format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{}</title>
    <link rel="stylesheet" href="/static/css/style.css">
</head>
<body>
    <div class="container">
        <header>
            <h1>{}</h1>
            <div class="status-panel">
                <span class="status-label">Services:</span>
                <span id="service-status" class="status-value">checking...</span>
            </div>
        </header>

        <main>
            <div class="recorder-section">
                <button id="record-btn" class="btn btn-primary" type="button"
                        data-label="Start Recording" data-stop-label="Stop Recording">
                    Start Recording
                </button>
                <button id="clear-btn" class="btn btn-secondary" type="button">
                    New Conversation
                </button>
                <p id="recorder-status" class="recorder-status" aria-live="polite"></p>
            </div>

            <div class="conversation-section">
                <div id="conversation" class="conversation"></div>
                <audio id="reply-audio" autoplay hidden></audio>
            </div>

            <div id="error-banner" class="error-banner" style="display: none;">
                <span id="error-icon" class="error-icon"></span>
                <span id="error-text" class="error-text"></span>
            </div>
        </main>
    </div>

    <script src="/static/js/app.js"></script>
</body>
</html>
"#,
        title, title
    );

    Html(html)
}
