use crate::config::LlmConfig;
use crate::error::ServiceError;
use crate::models::{ChatTurn, Role};
use crate::pipeline::ChatModel;
use async_trait::async_trait;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const SYSTEM_INSTRUCTION: &str =
    "You are a helpful AI assistant. Respond naturally and remember the conversation context.";

/// Conversational reply generation over a Gemini-shaped `generateContent`
/// REST API.
#[derive(Debug, Clone)]
pub struct LlmClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GenerationParams {
    pub model: String,
    pub temperature: f32,
    pub system_instruction: Option<String>,
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    system_instruction: Content,
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    role: Option<String>,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

impl LlmClient {
    pub fn new(config: &LlmConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .expect("failed to build HTTP client");

        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        }
    }

    fn build_request(history: &[ChatTurn], params: &GenerationParams) -> GenerateRequest {
        let contents = history
            .iter()
            .map(|turn| Content {
                role: Some(
                    match turn.role {
                        Role::User => "user",
                        Role::Assistant => "model",
                    }
                    .to_string(),
                ),
                parts: vec![Part {
                    text: turn.text.clone(),
                }],
            })
            .collect();

        let instruction = params
            .system_instruction
            .clone()
            .unwrap_or_else(|| SYSTEM_INSTRUCTION.to_string());

        GenerateRequest {
            system_instruction: Content {
                role: None,
                parts: vec![Part { text: instruction }],
            },
            contents,
            generation_config: GenerationConfig {
                temperature: params.temperature,
            },
        }
    }

    /// Join the first candidate's parts; different API revisions split the
    /// reply across parts.
    fn extract_text(response: GenerateResponse) -> Option<String> {
        let text = response
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .map(|part| part.text)
                    .collect::<Vec<_>>()
                    .join("")
            })?;

        let text = text.trim().to_string();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

#[async_trait]
impl ChatModel for LlmClient {
    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn generate_reply(
        &self,
        history: &[ChatTurn],
        params: &GenerationParams,
    ) -> Result<String, ServiceError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ServiceError::new("LLM service not configured - missing API key"))?;

        info!(
            "Generating reply with model {} ({} messages in history)",
            params.model,
            history.len()
        );

        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, params.model
        );
        let request = Self::build_request(history, params);

        let response = self
            .client
            .post(&url)
            .query(&[("key", api_key)])
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::with_status(
                format!("generation failed: {}", body),
                status,
            ));
        }

        let payload: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::new(format!("invalid generation response: {}", e)))?;

        match Self::extract_text(payload) {
            Some(text) => {
                debug!("LLM reply generated ({} chars)", text.len());
                Ok(text)
            }
            None => Err(ServiceError::new("LLM returned empty response")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_maps_to_gemini_roles() {
        let history = vec![ChatTurn::user("hello"), ChatTurn::assistant("hi there")];
        let params = GenerationParams {
            model: "gemini-1.5-flash".to_string(),
            temperature: 0.7,
            system_instruction: None,
        };

        let request = LlmClient::build_request(&history, &params);

        assert_eq!(request.contents.len(), 2);
        assert_eq!(request.contents[0].role.as_deref(), Some("user"));
        assert_eq!(request.contents[1].role.as_deref(), Some("model"));
        assert_eq!(request.contents[1].parts[0].text, "hi there");
        assert_eq!(request.system_instruction.parts[0].text, SYSTEM_INSTRUCTION);
    }

    #[test]
    fn custom_system_instruction_replaces_the_default() {
        let params = GenerationParams {
            model: "gemini-1.5-flash".to_string(),
            temperature: 0.7,
            system_instruction: Some("Answer only in haiku.".to_string()),
        };

        let request = LlmClient::build_request(&[ChatTurn::user("hello")], &params);

        assert_eq!(
            request.system_instruction.parts[0].text,
            "Answer only in haiku."
        );
    }

    #[test]
    fn extract_text_joins_parts_and_rejects_empty() {
        let response: GenerateResponse = serde_json::from_value(serde_json::json!({
            "candidates": [{"content": {"parts": [{"text": "hi "}, {"text": "there"}]}}]
        }))
        .unwrap();
        assert_eq!(LlmClient::extract_text(response).as_deref(), Some("hi there"));

        let empty: GenerateResponse = serde_json::from_value(serde_json::json!({
            "candidates": [{"content": {"parts": [{"text": "  "}]}}]
        }))
        .unwrap();
        assert!(LlmClient::extract_text(empty).is_none());

        let none: GenerateResponse =
            serde_json::from_value(serde_json::json!({"candidates": []})).unwrap();
        assert!(LlmClient::extract_text(none).is_none());
    }
}
