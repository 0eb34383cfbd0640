//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::ConfigError;

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Chat completion endpoint
    #[serde(default)]
    pub chat: ChatSettings,

    /// Speech synthesis endpoint
    #[serde(default)]
    pub tts: TtsSettings,

    /// Speech-to-text endpoint
    #[serde(default)]
    pub stt: SttSettings,

    /// Sentence chunking thresholds
    #[serde(default)]
    pub chunker: ChunkerSettings,

    /// Local audio output
    #[serde(default)]
    pub playback: PlaybackSettings,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Settings {
    /// Create default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings
    ///
    /// Missing API keys are not errors: chat falls back to offline replies
    /// and speech goes silent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_endpoints()?;
        self.validate_tts()?;
        self.validate_chunker()?;
        Ok(())
    }

    fn validate_endpoints(&self) -> Result<(), ConfigError> {
        validate_url("chat.api_url", &self.chat.api_url)?;
        validate_url("tts.base_url", &self.tts.base_url)?;
        validate_url("stt.api_url", &self.stt.api_url)?;
        Ok(())
    }

    fn validate_tts(&self) -> Result<(), ConfigError> {
        validate_unit_interval("tts.stability", self.tts.stability)?;
        validate_unit_interval("tts.similarity_boost", self.tts.similarity_boost)?;

        if self.tts.max_chars == 0 {
            return Err(ConfigError::InvalidValue {
                field: "tts.max_chars".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }

        if self.tts.fetch_timeout_secs == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "tts.fetch_timeout_secs".to_string(),
                message: "must be greater than 0 when set".to_string(),
            });
        }

        Ok(())
    }

    fn validate_chunker(&self) -> Result<(), ConfigError> {
        let chunker = &self.chunker;

        if chunker.min_sentence_chars == 0 {
            return Err(ConfigError::InvalidValue {
                field: "chunker.min_sentence_chars".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }

        if chunker.max_buffer_chars <= chunker.min_break_position {
            return Err(ConfigError::InvalidValue {
                field: "chunker.max_buffer_chars".to_string(),
                message: format!(
                    "must be greater than chunker.min_break_position ({})",
                    chunker.min_break_position
                ),
            });
        }

        Ok(())
    }
}

fn validate_url(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.starts_with("http://") || value.starts_with("https://") {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue {
            field: field.to_string(),
            message: format!("'{}' is not an http(s) URL", value),
        })
    }
}

fn validate_unit_interval(field: &str, value: f32) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue {
            field: field.to_string(),
            message: format!("must be between 0.0 and 1.0, got {}", value),
        })
    }
}

/// Chat completion endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSettings {
    #[serde(default = "default_chat_url")]
    pub api_url: String,

    /// Sent as `X-API-Key`; empty means offline replies only
    #[serde(default)]
    pub api_key: String,

    #[serde(default)]
    pub space_id: String,

    #[serde(default)]
    pub bot_id: String,

    #[serde(default = "default_user_id")]
    pub user_id: String,

    /// Ask the endpoint for an SSE stream instead of a single JSON reply
    #[serde(default = "default_true")]
    pub stream: bool,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_chat_url() -> String {
    "https://api.mia21.com/api/v1/chat".to_string()
}

fn default_user_id() -> String {
    "anonymous".to_string()
}

fn default_true() -> bool {
    true
}

fn default_request_timeout() -> u64 {
    60
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            api_url: default_chat_url(),
            api_key: String::new(),
            space_id: String::new(),
            bot_id: String::new(),
            user_id: default_user_id(),
            stream: true,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl ChatSettings {
    pub fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

/// Speech synthesis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsSettings {
    #[serde(default = "default_tts_url")]
    pub base_url: String,

    #[serde(default)]
    pub api_key: String,

    #[serde(default)]
    pub voice_id: String,

    #[serde(default = "default_tts_model")]
    pub model_id: String,

    #[serde(default = "default_stability")]
    pub stability: f32,

    #[serde(default = "default_similarity_boost")]
    pub similarity_boost: f32,

    /// Longer sentences are truncated before synthesis
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,

    /// Per-sentence fetch timeout; unset waits indefinitely
    #[serde(default)]
    pub fetch_timeout_secs: Option<u64>,
}

fn default_tts_url() -> String {
    "https://api.elevenlabs.io".to_string()
}

fn default_tts_model() -> String {
    "eleven_flash_v2_5".to_string()
}

fn default_stability() -> f32 {
    0.5
}

fn default_similarity_boost() -> f32 {
    0.75
}

fn default_max_chars() -> usize {
    5000
}

impl Default for TtsSettings {
    fn default() -> Self {
        Self {
            base_url: default_tts_url(),
            api_key: String::new(),
            voice_id: String::new(),
            model_id: default_tts_model(),
            stability: default_stability(),
            similarity_boost: default_similarity_boost(),
            max_chars: default_max_chars(),
            fetch_timeout_secs: None,
        }
    }
}

impl TtsSettings {
    pub fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty() && !self.voice_id.trim().is_empty()
    }
}

/// Speech-to-text configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SttSettings {
    #[serde(default = "default_stt_url")]
    pub api_url: String,

    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_stt_model")]
    pub model: String,
}

fn default_stt_url() -> String {
    "https://api.openai.com/v1/audio/transcriptions".to_string()
}

fn default_stt_model() -> String {
    "whisper-1".to_string()
}

impl Default for SttSettings {
    fn default() -> Self {
        Self {
            api_url: default_stt_url(),
            api_key: String::new(),
            model: default_stt_model(),
        }
    }
}

/// Sentence chunking thresholds, counted in characters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkerSettings {
    /// Candidates shorter than this stay buffered
    #[serde(default = "default_min_sentence_chars")]
    pub min_sentence_chars: usize,

    /// Buffer length that triggers a forced break at a comma or semicolon
    #[serde(default = "default_max_buffer_chars")]
    pub max_buffer_chars: usize,

    /// A forced break must land after this position
    #[serde(default = "default_min_break_position")]
    pub min_break_position: usize,
}

fn default_min_sentence_chars() -> usize {
    10
}

fn default_max_buffer_chars() -> usize {
    200
}

fn default_min_break_position() -> usize {
    20
}

impl Default for ChunkerSettings {
    fn default() -> Self {
        Self {
            min_sentence_chars: default_min_sentence_chars(),
            max_buffer_chars: default_max_buffer_chars(),
            min_break_position: default_min_break_position(),
        }
    }
}

/// Local audio output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackSettings {
    /// Player command reading MPEG audio on stdin; empty plays nothing
    #[serde(default = "default_player_command")]
    pub command: Vec<String>,
}

fn default_player_command() -> Vec<String> {
    ["mpv", "--no-terminal", "--really-quiet", "-"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            command: default_player_command(),
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub log_json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
        }
    }
}

/// Load settings from `config/` and the process environment
///
/// Priority: env vars > config/{env} > config/default > defaults
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    load_settings_from(Path::new("config"), env)
}

/// Load settings from a specific config directory
pub fn load_settings_from(dir: &Path, env: Option<&str>) -> Result<Settings, ConfigError> {
    build_settings(dir, env, None)
}

fn build_settings(
    dir: &Path,
    env: Option<&str>,
    env_vars: Option<HashMap<String, String>>,
) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    // Load default config
    builder = builder.add_source(File::from(dir.join("default")).required(false));

    // Load environment-specific config
    if let Some(env_name) = env {
        builder = builder.add_source(File::from(dir.join(env_name)).required(false));
    }

    // Load from environment variables
    builder = builder.add_source(
        Environment::with_prefix("COMPANION")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .source(env_vars),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    // Validate
    settings.validate()?;

    Ok(settings)
}
