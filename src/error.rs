use chrono::Utc;
use serde::{Deserialize, Serialize};

// =============================================================================
// Error Categories
// - Fixed taxonomy shared by the pipeline, the API error shape, and the client
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    SttError,
    LlmError,
    TtsError,
    NetworkError,
    AuthError,
    QuotaError,
    TimeoutError,
    GeneralError,
}

impl ErrorCategory {
    pub const ALL: [ErrorCategory; 8] = [
        ErrorCategory::SttError,
        ErrorCategory::LlmError,
        ErrorCategory::TtsError,
        ErrorCategory::NetworkError,
        ErrorCategory::AuthError,
        ErrorCategory::QuotaError,
        ErrorCategory::TimeoutError,
        ErrorCategory::GeneralError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::SttError => "STT_ERROR",
            ErrorCategory::LlmError => "LLM_ERROR",
            ErrorCategory::TtsError => "TTS_ERROR",
            ErrorCategory::NetworkError => "NETWORK_ERROR",
            ErrorCategory::AuthError => "AUTH_ERROR",
            ErrorCategory::QuotaError => "QUOTA_ERROR",
            ErrorCategory::TimeoutError => "TIMEOUT_ERROR",
            ErrorCategory::GeneralError => "GENERAL_ERROR",
        }
    }

    /// Classify a raw upstream failure. Status code wins when conclusive,
    /// keyword matching on the error text is the fallback, GENERAL_ERROR the
    /// default. Pure and total.
    pub fn classify(error_text: &str, status_code: Option<u16>) -> ErrorCategory {
        if let Some(status) = status_code {
            match status {
                401 | 403 => return ErrorCategory::AuthError,
                429 => return ErrorCategory::QuotaError,
                s if s >= 500 => return ErrorCategory::NetworkError,
                _ => {}
            }
        }

        let text = error_text.to_lowercase();

        if text.contains("timeout") || text.contains("timed out") || text.contains("deadline") {
            ErrorCategory::TimeoutError
        } else if text.contains("api key")
            || text.contains("auth")
            || text.contains("unauthorized")
            || text.contains("forbidden")
            || text.contains("permission")
        {
            ErrorCategory::AuthError
        } else if text.contains("quota")
            || text.contains("rate limit")
            || text.contains("too many requests")
        {
            ErrorCategory::QuotaError
        } else if text.contains("network")
            || text.contains("connection")
            || text.contains("unreachable")
            || text.contains("dns")
        {
            ErrorCategory::NetworkError
        } else {
            ErrorCategory::GeneralError
        }
    }

    /// AUTH and QUOTA failures cannot be fixed by retrying; everything else
    /// is worth another attempt.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ErrorCategory::AuthError | ErrorCategory::QuotaError)
    }

    /// Canned user-facing message spoken/shown when this category triggers a
    /// fallback response. Always non-empty.
    pub fn fallback_message(&self) -> &'static str {
        match self {
            ErrorCategory::SttError => {
                "I'm having trouble understanding your audio right now. \
                 Please try speaking again or check your microphone."
            }
            ErrorCategory::LlmError => {
                "I'm experiencing some technical difficulties right now. \
                 Please try asking your question again!"
            }
            ErrorCategory::TtsError => {
                "I came up with a response but couldn't turn it into speech. \
                 Here it is as text instead."
            }
            ErrorCategory::NetworkError => {
                "I'm having trouble connecting to my AI brain right now. \
                 Please try again in a moment!"
            }
            ErrorCategory::AuthError => {
                "I'm having authentication issues right now. \
                 Please try again in a few moments."
            }
            ErrorCategory::QuotaError => {
                "I've reached my conversation limit for now. \
                 Please try again a little later!"
            }
            ErrorCategory::TimeoutError => {
                "That took longer than expected and I had to give up. \
                 Please try again with a shorter message."
            }
            ErrorCategory::GeneralError => {
                "Something went wrong on my end. Please try again!"
            }
        }
    }

    pub fn retry_suggestion(&self) -> &'static str {
        match self {
            ErrorCategory::SttError => "Re-record your message and try again.",
            ErrorCategory::LlmError => "Wait a moment, then resend your message.",
            ErrorCategory::TtsError => "The text response is available; retry for audio.",
            ErrorCategory::NetworkError => "Check your connection and try again.",
            ErrorCategory::AuthError => "Verify the service API keys on the server.",
            ErrorCategory::QuotaError => "Wait for the usage quota to reset.",
            ErrorCategory::TimeoutError => "Try again; the service may be under load.",
            ErrorCategory::GeneralError => "Try again in a few seconds.",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Error Info
// - Snapshot of one classified failure, surfaced to the caller and discarded
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub category: ErrorCategory,
    pub user_message: String,
    pub original_error: Option<String>,
    pub retryable: bool,
    pub suggestion: String,
    pub timestamp: i64,
}

impl ErrorInfo {
    pub fn new(category: ErrorCategory, original_error: Option<String>) -> Self {
        Self {
            category,
            user_message: category.fallback_message().to_string(),
            original_error,
            retryable: category.is_retryable(),
            suggestion: category.retry_suggestion().to_string(),
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    pub fn from_service_error(step: PipelineStep, error: &ServiceError) -> Self {
        let category = error.categorize_for(step);
        ErrorInfo::new(category, Some(error.to_string()))
    }
}

// =============================================================================
// Pipeline Steps / Service Errors
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStep {
    Transcribe,
    Generate,
    Synthesize,
}

impl PipelineStep {
    pub fn own_category(&self) -> ErrorCategory {
        match self {
            PipelineStep::Transcribe => ErrorCategory::SttError,
            PipelineStep::Generate => ErrorCategory::LlmError,
            PipelineStep::Synthesize => ErrorCategory::TtsError,
        }
    }
}

/// Failure of one upstream service call, carrying enough context for
/// classification. The HTTP status is the upstream's, when one was received.
#[derive(Debug, Clone)]
pub struct ServiceError {
    pub message: String,
    pub status_code: Option<u16>,
}

impl ServiceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status_code: None,
        }
    }

    pub fn with_status(message: impl Into<String>, status_code: u16) -> Self {
        Self {
            message: message.into(),
            status_code: Some(status_code),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        let mut message = message.into();
        if !message.to_lowercase().contains("timeout") {
            message.push_str(" (timeout)");
        }
        Self {
            message,
            status_code: None,
        }
    }

    /// Classify, substituting the failing step's own category when the
    /// generic classifier is inconclusive.
    pub fn categorize_for(&self, step: PipelineStep) -> ErrorCategory {
        match ErrorCategory::classify(&self.message, self.status_code) {
            ErrorCategory::GeneralError => step.own_category(),
            category => category,
        }
    }
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status_code {
            Some(status) => write!(f, "HTTP {}: {}", status, self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for ServiceError {}

impl From<reqwest::Error> for ServiceError {
    fn from(error: reqwest::Error) -> Self {
        let status = error.status().map(|s| s.as_u16());
        let message = if error.is_timeout() {
            format!("request timed out: {}", error)
        } else if error.is_connect() {
            format!("connection error: {}", error)
        } else {
            error.to_string()
        };

        Self {
            message,
            status_code: status,
        }
    }
}
