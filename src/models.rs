use crate::error::ErrorCategory;
use chrono::Utc;
use serde::{Deserialize, Serialize};

// =============================================================================
// Conversation Model
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub text: String,
    pub timestamp: i64,
}

impl ChatTurn {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }
}

// =============================================================================
// Pipeline Result
// - One per orchestrator invocation; either a real reply or a fallback with
//   its error category, never neither
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult {
    pub transcription: Option<String>,
    pub llm_response: String,
    pub audio_url: Option<String>,
    pub is_fallback: bool,
    pub error_category: Option<ErrorCategory>,
    pub tts_error: Option<String>,
}

impl PipelineResult {
    pub fn success(transcription: String, llm_response: String, audio_url: Option<String>) -> Self {
        Self {
            transcription: Some(transcription),
            llm_response,
            audio_url,
            is_fallback: false,
            error_category: None,
            tts_error: None,
        }
    }
}

// =============================================================================
// API Request/Response Models
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct TtsRequest {
    pub text: String,
    #[serde(rename = "voiceId", default)]
    pub voice_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TtsResponse {
    pub audio_url: String,
    pub text: String,
    #[serde(rename = "voiceId")]
    pub voice_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TranscriptionResponse {
    pub transcription: String,
    pub filename: String,
    pub content_type: String,
    pub size_bytes: usize,
    pub audio_duration: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub session_id: String,
    pub model: String,
    pub transcription: Option<String>,
    pub llm_response: String,
    pub audio_url: Option<String>,
    #[serde(rename = "voiceId")]
    pub voice_id: String,
    pub filename: Option<String>,
    pub message_count: usize,
    pub is_fallback: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<ErrorCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tts_error: Option<String>,
}

/// Sessionless LLM query: one prompt in (text or audio), one reply out.
#[derive(Debug, Serialize, Deserialize)]
pub struct LlmQueryResponse {
    pub transcription: Option<String>,
    pub llm_response: String,
    pub audio_url: Option<String>,
    pub model: String,
    #[serde(rename = "voiceId")]
    pub voice_id: String,
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tts_error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionHistoryResponse {
    pub session_id: String,
    pub message_count: usize,
    pub history: Vec<ChatTurn>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub services: ServicesStatus,
    pub chat_statistics: SessionStats,
    pub all_services_configured: bool,
    pub uptime_seconds: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ServicesStatus {
    pub stt: bool,
    pub llm: bool,
    pub tts: bool,
}

/// Bit-exact error payload contract shared with the browser client.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_type: ErrorCategory,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_unavailable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_suggestion: Option<String>,
    pub timestamp: i64,
}

// =============================================================================
// Session and Server Statistics
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionStats {
    pub total_sessions: usize,
    pub total_messages: usize,
    pub average_messages_per_session: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerStats {
    pub total_requests: u64,
    pub successful_turns: u64,
    pub fallback_turns: u64,
    pub failed_requests: u64,
    pub uptime_seconds: u64,
}

impl Default for ServerStats {
    fn default() -> Self {
        Self {
            total_requests: 0,
            successful_turns: 0,
            fallback_turns: 0,
            failed_requests: 0,
            uptime_seconds: 0,
        }
    }
}

impl ServerStats {
    pub fn record_request(&mut self) {
        self.total_requests += 1;
    }

    pub fn record_success(&mut self) {
        self.successful_turns += 1;
    }

    pub fn record_fallback(&mut self) {
        self.fallback_turns += 1;
    }

    pub fn record_failure(&mut self) {
        self.failed_requests += 1;
    }
}
