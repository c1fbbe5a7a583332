use crate::config::TtsConfig;
use crate::error::ServiceError;
use crate::pipeline::SpeechSynthesizer;
use async_trait::async_trait;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Text-to-speech over a Murf-shaped `speech/generate` REST API. Two HTTP
/// clients with different timeouts: the fallback path gets a short one, so a
/// struggling TTS service cannot stall an already-failing turn.
#[derive(Debug, Clone)]
pub struct TtsClient {
    client: reqwest::Client,
    fallback_client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    max_chars: usize,
}

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    text: &'a str,
    #[serde(rename = "voiceId")]
    voice_id: &'a str,
    format: &'a str,
}

#[derive(Debug, Deserialize)]
struct SpeechResponse {
    #[serde(rename = "audioFile", default)]
    audio_file: Option<String>,
}

impl TtsClient {
    pub fn new(config: &TtsConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .expect("failed to build HTTP client");

        let fallback_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.fallback_timeout_seconds))
            .build()
            .expect("failed to build HTTP client");

        Self {
            client,
            fallback_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            max_chars: config.max_chars,
        }
    }

    /// The upstream rejects oversized payloads outright, so long replies are
    /// cut at the character limit with a marker.
    fn truncate(&self, text: &str) -> String {
        let chars = text.chars().count();
        if chars <= self.max_chars {
            return text.to_string();
        }

        let keep = self.max_chars.saturating_sub(20);
        let truncated: String = text.chars().take(keep).collect();
        warn!("Text truncated from {} to {} chars for TTS", chars, keep);
        format!("{}... (truncated)", truncated)
    }

    async fn request_speech(
        &self,
        client: &reqwest::Client,
        text: &str,
        voice_id: &str,
    ) -> Result<String, ServiceError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ServiceError::new("TTS service not configured - missing API key"))?;

        let url = format!("{}/v1/speech/generate", self.base_url);
        let text = self.truncate(text);

        let response = client
            .post(&url)
            .header("api-key", api_key)
            .json(&SpeechRequest {
                text: &text,
                voice_id,
                format: "mp3",
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::with_status(
                format!("speech generation failed: {}", body),
                status,
            ));
        }

        let payload: SpeechResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::new(format!("invalid speech response: {}", e)))?;

        payload
            .audio_file
            .ok_or_else(|| ServiceError::new("TTS API did not return an audio URL"))
    }
}

#[async_trait]
impl SpeechSynthesizer for TtsClient {
    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<String, ServiceError> {
        info!(
            "Generating TTS for {} chars with voice {}",
            text.chars().count(),
            voice_id
        );
        let audio_url = self.request_speech(&self.client, text, voice_id).await?;
        info!("TTS generation successful");
        Ok(audio_url)
    }

    async fn synthesize_fallback(
        &self,
        text: &str,
        voice_id: &str,
    ) -> Result<String, ServiceError> {
        info!("Generating fallback TTS with voice {}", voice_id);
        self.request_speech(&self.fallback_client, text, voice_id)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TtsConfig;

    fn client_with_max_chars(max_chars: usize) -> TtsClient {
        let config = TtsConfig {
            base_url: "http://localhost".to_string(),
            api_key: Some("test-key".to_string()),
            default_voice: "en-US-natalie".to_string(),
            timeout_seconds: 10,
            fallback_timeout_seconds: 5,
            max_chars,
        };
        TtsClient::new(&config)
    }

    #[test]
    fn short_text_is_untouched() {
        let client = client_with_max_chars(100);
        assert_eq!(client.truncate("hello"), "hello");
    }

    #[test]
    fn long_text_is_cut_with_marker() {
        let client = client_with_max_chars(50);
        let text = "x".repeat(120);

        let truncated = client.truncate(&text);

        assert!(truncated.ends_with("... (truncated)"));
        assert_eq!(truncated.chars().count(), 30 + "... (truncated)".len());
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let client = client_with_max_chars(25);
        let text = "ありがとうございました".repeat(10);

        // Must not panic on multi-byte characters.
        let truncated = client.truncate(&text);
        assert!(truncated.ends_with("... (truncated)"));
    }
}
