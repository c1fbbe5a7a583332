use crate::error::{ErrorCategory, ErrorInfo, PipelineStep, ServiceError};
use crate::llm::GenerationParams;
use crate::models::{ChatTurn, PipelineResult};
use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::session::SessionStore;
use crate::stt::Transcription;
use async_trait::async_trait;
use log::{info, warn};
use std::sync::Arc;

// =============================================================================
// Upstream Service Seams
// - Trait objects so the orchestrator can be exercised with fakes
// =============================================================================

#[async_trait]
pub trait Transcriber: Send + Sync {
    fn is_configured(&self) -> bool;
    async fn transcribe(&self, audio_data: Vec<u8>) -> Result<Transcription, ServiceError>;
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    fn is_configured(&self) -> bool;
    async fn generate_reply(
        &self,
        history: &[ChatTurn],
        params: &GenerationParams,
    ) -> Result<String, ServiceError>;
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    fn is_configured(&self) -> bool;
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<String, ServiceError>;
    async fn synthesize_fallback(
        &self,
        text: &str,
        voice_id: &str,
    ) -> Result<String, ServiceError>;
}

/// Per-turn progress, for log lines only; transitions are strictly linear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TurnPhase {
    Transcribing,
    Thinking,
    Speaking,
}

#[derive(Debug, Clone)]
pub struct TurnParams {
    pub model: String,
    pub temperature: f32,
    pub voice_id: String,
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Sequential STT → LLM → TTS pipeline with per-step failure handling.
///
/// STT and LLM failures substitute a scripted fallback reply and
/// short-circuit the rest of the turn; a TTS failure after a successful
/// reply only degrades to text. Speech output is the least essential
/// modality, so that asymmetry is deliberate.
pub struct VoiceAgent {
    transcriber: Arc<dyn Transcriber>,
    chat_model: Arc<dyn ChatModel>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    sessions: Arc<SessionStore>,
    retry: RetryPolicy,
}

impl VoiceAgent {
    pub fn new(
        transcriber: Arc<dyn Transcriber>,
        chat_model: Arc<dyn ChatModel>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        sessions: Arc<SessionStore>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            transcriber,
            chat_model,
            synthesizer,
            sessions,
            retry,
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn transcriber(&self) -> &dyn Transcriber {
        self.transcriber.as_ref()
    }

    pub fn chat_model(&self) -> &dyn ChatModel {
        self.chat_model.as_ref()
    }

    pub fn synthesizer(&self) -> &dyn SpeechSynthesizer {
        self.synthesizer.as_ref()
    }

    /// Run one conversation turn. Always returns a well-formed result:
    /// either a real reply or a fallback carrying its error category.
    pub async fn run_turn(
        &self,
        session_id: &str,
        audio_data: Vec<u8>,
        params: &TurnParams,
    ) -> PipelineResult {
        info!("Turn {:?} for session {}", TurnPhase::Transcribing, session_id);

        let transcription = match self.transcribe_with_retry(audio_data).await {
            Ok(transcription) => transcription,
            Err(error) => {
                warn!(
                    "STT failed for session {}: {} ({})",
                    session_id,
                    error.original_error.as_deref().unwrap_or("unknown"),
                    error.category
                );
                return self
                    .generate_fallback(session_id, None, error.category, &params.voice_id)
                    .await;
            }
        };

        info!("Turn {:?} for session {}", TurnPhase::Thinking, session_id);

        // Snapshot plus the turn in flight; nothing is committed to the
        // store until the whole turn succeeds.
        let mut history = self.sessions.history(session_id);
        history.push(ChatTurn::user(transcription.text.clone()));

        let reply = match self.generate_with_retry(&history, params).await {
            Ok(reply) => reply,
            Err(error) => {
                warn!(
                    "LLM failed for session {}: {} ({})",
                    session_id,
                    error.original_error.as_deref().unwrap_or("unknown"),
                    error.category
                );
                // The transcription survived; the UI still shows it.
                return self
                    .generate_fallback(
                        session_id,
                        Some(transcription.text),
                        error.category,
                        &params.voice_id,
                    )
                    .await;
            }
        };

        info!("Turn {:?} for session {}", TurnPhase::Speaking, session_id);

        let (audio_url, tts_error) = match self
            .synthesizer
            .synthesize(&reply, &params.voice_id)
            .await
        {
            Ok(url) => (Some(url), None),
            Err(error) => {
                // Soft failure: the reply stands, only the audio is lost.
                warn!("TTS failed for session {}: {}", session_id, error);
                (None, Some(error.to_string()))
            }
        };

        let message_count = self.sessions.append_turns(
            session_id,
            vec![
                ChatTurn::user(transcription.text.clone()),
                ChatTurn::assistant(reply.clone()),
            ],
        );
        info!(
            "Turn complete for session {} ({} messages stored)",
            session_id, message_count
        );

        let mut result = PipelineResult::success(transcription.text, reply, audio_url);
        if let Some(detail) = tts_error {
            result.error_category = Some(ErrorCategory::TtsError);
            result.tts_error = Some(detail);
        }
        result
    }

    /// Scripted substitute reply for a failed turn. Tries to speak the
    /// canned message too, but a second-level TTS failure just degrades to
    /// text; it is never retried.
    pub async fn generate_fallback(
        &self,
        session_id: &str,
        transcription: Option<String>,
        category: ErrorCategory,
        voice_id: &str,
    ) -> PipelineResult {
        info!(
            "Generating {} fallback for session {}",
            category, session_id
        );

        let message = category.fallback_message().to_string();

        let audio_url = if self.synthesizer.is_configured() {
            match self.synthesizer.synthesize_fallback(&message, voice_id).await {
                Ok(url) => {
                    info!("Fallback TTS generated for session {}", session_id);
                    Some(url)
                }
                Err(error) => {
                    warn!("Fallback TTS failed for session {}: {}", session_id, error);
                    None
                }
            }
        } else {
            None
        };

        PipelineResult {
            transcription,
            llm_response: message,
            audio_url,
            is_fallback: true,
            error_category: Some(category),
            tts_error: None,
        }
    }

    async fn transcribe_with_retry(&self, audio_data: Vec<u8>) -> Result<Transcription, ErrorInfo> {
        retry_with_backoff(&self.retry, || {
            let audio = audio_data.clone();
            async move {
                self.transcriber
                    .transcribe(audio)
                    .await
                    .map_err(|e| ErrorInfo::from_service_error(PipelineStep::Transcribe, &e))
            }
        })
        .await
    }

    async fn generate_with_retry(
        &self,
        history: &[ChatTurn],
        params: &TurnParams,
    ) -> Result<String, ErrorInfo> {
        let generation = GenerationParams {
            model: params.model.clone(),
            temperature: params.temperature,
            system_instruction: None,
        };

        retry_with_backoff(&self.retry, || async {
            self.chat_model
                .generate_reply(history, &generation)
                .await
                .map_err(|e| ErrorInfo::from_service_error(PipelineStep::Generate, &e))
        })
        .await
    }
}
