use crate::config::SttConfig;
use crate::error::ServiceError;
use crate::pipeline::Transcriber;
use async_trait::async_trait;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Speech-to-text over an AssemblyAI-shaped REST API: upload the raw audio,
/// create a transcript job, then poll it to completion.
#[derive(Debug, Clone)]
pub struct SttClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    poll_interval: Duration,
    max_poll_attempts: u32,
}

#[derive(Debug, Clone)]
pub struct Transcription {
    pub text: String,
    pub audio_duration: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    upload_url: String,
}

#[derive(Debug, Serialize)]
struct TranscriptRequest<'a> {
    audio_url: &'a str,
}

#[derive(Debug, Deserialize)]
struct TranscriptResponse {
    id: String,
    status: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    audio_duration: Option<f64>,
}

impl SttClient {
    pub fn new(config: &SttConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .expect("failed to build HTTP client");

        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            max_poll_attempts: config.max_poll_attempts,
        }
    }

    fn api_key(&self) -> Result<&str, ServiceError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| ServiceError::new("STT service not configured - missing API key"))
    }

    async fn upload(&self, audio_data: Vec<u8>) -> Result<String, ServiceError> {
        let url = format!("{}/v2/upload", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("authorization", self.api_key()?)
            .header("content-type", "application/octet-stream")
            .body(audio_data)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::with_status(
                format!("audio upload failed: {}", body),
                status,
            ));
        }

        let upload: UploadResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::new(format!("invalid upload response: {}", e)))?;

        Ok(upload.upload_url)
    }

    async fn create_transcript(&self, audio_url: &str) -> Result<TranscriptResponse, ServiceError> {
        let url = format!("{}/v2/transcript", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("authorization", self.api_key()?)
            .json(&TranscriptRequest { audio_url })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::with_status(
                format!("transcript request failed: {}", body),
                status,
            ));
        }

        response
            .json()
            .await
            .map_err(|e| ServiceError::new(format!("invalid transcript response: {}", e)))
    }

    async fn poll_transcript(&self, id: &str) -> Result<TranscriptResponse, ServiceError> {
        let url = format!("{}/v2/transcript/{}", self.base_url, id);

        for attempt in 0..self.max_poll_attempts {
            if attempt > 0 {
                tokio::time::sleep(self.poll_interval).await;
            }

            let response = self
                .client
                .get(&url)
                .header("authorization", self.api_key()?)
                .send()
                .await?;

            if !response.status().is_success() {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                return Err(ServiceError::with_status(
                    format!("transcript polling failed: {}", body),
                    status,
                ));
            }

            let transcript: TranscriptResponse = response
                .json()
                .await
                .map_err(|e| ServiceError::new(format!("invalid transcript response: {}", e)))?;

            match transcript.status.as_str() {
                "completed" => return Ok(transcript),
                "error" => {
                    return Err(ServiceError::new(format!(
                        "transcription failed: {}",
                        transcript.error.unwrap_or_else(|| "unknown error".to_string())
                    )))
                }
                status => {
                    debug!("Transcript {} still {}, polling again", id, status);
                }
            }
        }

        Err(ServiceError::timeout(format!(
            "transcript {} not ready after {} polls",
            id, self.max_poll_attempts
        )))
    }
}

#[async_trait]
impl Transcriber for SttClient {
    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn transcribe(&self, audio_data: Vec<u8>) -> Result<Transcription, ServiceError> {
        info!("Transcribing audio data ({} bytes)", audio_data.len());

        let upload_url = self.upload(audio_data).await?;
        let transcript = self.create_transcript(&upload_url).await?;
        let transcript = self.poll_transcript(&transcript.id).await?;

        let text = transcript
            .text
            .map(|t| t.trim().to_string())
            .unwrap_or_default();

        if text.is_empty() {
            warn!("Transcription returned empty result");
            return Err(ServiceError::new("transcription returned empty result"));
        }

        info!("Transcription successful ({} chars)", text.len());
        Ok(Transcription {
            text,
            audio_duration: transcript.audio_duration,
        })
    }
}
