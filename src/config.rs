use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub stt: SttConfig,
    pub llm: LlmConfig,
    pub tts: TtsConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "ServerConfig::default_max_request_size_mb")]
    pub max_request_size_mb: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SttConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "SttConfig::default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "SttConfig::default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "SttConfig::default_max_poll_attempts")]
    pub max_poll_attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "LlmConfig::default_model")]
    pub default_model: String,
    #[serde(default = "LlmConfig::default_timeout_seconds")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "TtsConfig::default_voice")]
    pub default_voice: String,
    #[serde(default = "TtsConfig::default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "TtsConfig::default_fallback_timeout_seconds")]
    pub fallback_timeout_seconds: u64,
    #[serde(default = "TtsConfig::default_max_chars")]
    pub max_chars: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "AgentConfig::default_title")]
    pub title: String,
    #[serde(default = "AgentConfig::default_max_file_size_mb")]
    pub max_file_size_mb: u64,
    #[serde(default = "AgentConfig::default_allowed_audio_types")]
    pub allowed_audio_types: Vec<String>,
    #[serde(default = "AgentConfig::default_max_text_length")]
    pub max_text_length: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "RetryConfig::default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "RetryConfig::default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "RetryConfig::default_backoff_factor")]
    pub backoff_factor: f64,
    #[serde(default = "RetryConfig::default_attempt_timeout_seconds")]
    pub attempt_timeout_seconds: u64,
}

impl ServerConfig {
    const fn default_max_request_size_mb() -> u64 {
        60
    }
}

impl SttConfig {
    const fn default_timeout_seconds() -> u64 {
        30
    }

    const fn default_poll_interval_ms() -> u64 {
        1_000
    }

    // Keeps a full poll cycle under the 30 s retry attempt timeout.
    const fn default_max_poll_attempts() -> u32 {
        25
    }
}

impl LlmConfig {
    fn default_model() -> String {
        "gemini-1.5-flash".to_string()
    }

    const fn default_timeout_seconds() -> u64 {
        30
    }
}

impl TtsConfig {
    fn default_voice() -> String {
        "en-US-natalie".to_string()
    }

    const fn default_timeout_seconds() -> u64 {
        10
    }

    const fn default_fallback_timeout_seconds() -> u64 {
        5
    }

    const fn default_max_chars() -> usize {
        3_000
    }
}

impl AgentConfig {
    fn default_title() -> String {
        "AI Voice Agent".to_string()
    }

    const fn default_max_file_size_mb() -> u64 {
        50
    }

    fn default_allowed_audio_types() -> Vec<String> {
        [
            "audio/webm",
            "audio/wav",
            "audio/mp3",
            "audio/mpeg",
            "audio/m4a",
            "audio/ogg",
            "audio/opus",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    const fn default_max_text_length() -> usize {
        5_000
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            title: Self::default_title(),
            max_file_size_mb: Self::default_max_file_size_mb(),
            allowed_audio_types: Self::default_allowed_audio_types(),
            max_text_length: Self::default_max_text_length(),
        }
    }
}

impl RetryConfig {
    const fn default_max_attempts() -> u32 {
        3
    }

    const fn default_base_delay_ms() -> u64 {
        2_000
    }

    fn default_backoff_factor() -> f64 {
        1.5
    }

    const fn default_attempt_timeout_seconds() -> u64 {
        30
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: Self::default_max_attempts(),
            base_delay_ms: Self::default_base_delay_ms(),
            backoff_factor: Self::default_backoff_factor(),
            attempt_timeout_seconds: Self::default_attempt_timeout_seconds(),
        }
    }
}

impl Config {
    pub fn load_or_create_default<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();

        let mut config = if path.exists() {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        } else {
            let default_config = Self::default();
            let content = toml::to_string(&default_config)?;
            fs::write(path, content)?;
            println!("Created default config file: {}", path.display());
            default_config
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// API keys are deployment secrets; environment variables beat whatever
    /// the config file carries.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("ASSEMBLYAI_API_KEY") {
            if !key.trim().is_empty() {
                self.stt.api_key = Some(key);
            }
        }
        let llm_key =
            std::env::var("GEMINI_API_KEY").or_else(|_| std::env::var("GOOGLE_API_KEY"));
        if let Ok(key) = llm_key {
            if !key.trim().is_empty() {
                self.llm.api_key = Some(key);
            }
        }
        if let Ok(key) = std::env::var("MURF_API_KEY") {
            if !key.trim().is_empty() {
                self.tts.api_key = Some(key);
            }
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("server port is invalid"));
        }

        if self.server.max_request_size_mb == 0 {
            return Err(anyhow::anyhow!("max request size is invalid"));
        }

        if self.server.max_request_size_mb < self.agent.max_file_size_mb {
            return Err(anyhow::anyhow!(
                "max request size must be at least the max upload size"
            ));
        }

        for (name, url) in [
            ("stt", &self.stt.base_url),
            ("llm", &self.llm.base_url),
            ("tts", &self.tts.base_url),
        ] {
            if url.trim().is_empty() {
                return Err(anyhow::anyhow!("{} base_url is not configured", name));
            }
        }

        if self.stt.poll_interval_ms == 0 || self.stt.max_poll_attempts == 0 {
            return Err(anyhow::anyhow!("stt polling configuration is invalid"));
        }

        if self.agent.max_file_size_mb == 0 {
            return Err(anyhow::anyhow!("max upload size is invalid"));
        }

        if self.agent.allowed_audio_types.is_empty() {
            return Err(anyhow::anyhow!("allowed audio types are not configured"));
        }

        if self.agent.max_text_length == 0 {
            return Err(anyhow::anyhow!("max text length is invalid"));
        }

        if self.tts.max_chars == 0 {
            return Err(anyhow::anyhow!("tts max_chars is invalid"));
        }

        if self.retry.max_attempts == 0 {
            return Err(anyhow::anyhow!("retry max_attempts must be at least 1"));
        }

        if self.retry.backoff_factor < 1.0 {
            return Err(anyhow::anyhow!("retry backoff_factor must be >= 1.0"));
        }

        Ok(())
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn max_file_size_bytes(&self) -> usize {
        (self.agent.max_file_size_mb * 1024 * 1024) as usize
    }

    pub fn max_request_size_bytes(&self) -> usize {
        (self.server.max_request_size_mb * 1024 * 1024) as usize
    }

    /// Browsers send parameters like `audio/webm;codecs=opus`; only the
    /// media type itself is matched.
    pub fn is_allowed_audio_type(&self, content_type: &str) -> bool {
        let media_type = content_type
            .split(';')
            .next()
            .unwrap_or(content_type)
            .trim();
        self.agent
            .allowed_audio_types
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(media_type))
    }

    pub fn stt_timeout(&self) -> Duration {
        Duration::from_secs(self.stt.timeout_seconds)
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm.timeout_seconds)
    }

    pub fn tts_timeout(&self) -> Duration {
        Duration::from_secs(self.tts.timeout_seconds)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8000,
                max_request_size_mb: ServerConfig::default_max_request_size_mb(),
            },
            stt: SttConfig {
                base_url: "https://api.assemblyai.com".to_string(),
                api_key: None,
                timeout_seconds: SttConfig::default_timeout_seconds(),
                poll_interval_ms: SttConfig::default_poll_interval_ms(),
                max_poll_attempts: SttConfig::default_max_poll_attempts(),
            },
            llm: LlmConfig {
                base_url: "https://generativelanguage.googleapis.com".to_string(),
                api_key: None,
                default_model: LlmConfig::default_model(),
                timeout_seconds: LlmConfig::default_timeout_seconds(),
            },
            tts: TtsConfig {
                base_url: "https://api.murf.ai".to_string(),
                api_key: None,
                default_voice: TtsConfig::default_voice(),
                timeout_seconds: TtsConfig::default_timeout_seconds(),
                fallback_timeout_seconds: TtsConfig::default_fallback_timeout_seconds(),
                max_chars: TtsConfig::default_max_chars(),
            },
            agent: AgentConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}
