//! Configuration management for the companion
//!
//! Supports loading configuration from:
//! - TOML/YAML/JSON files under `config/`
//! - Environment variables (COMPANION_ prefix, `__` between section and key)
//!
//! ```text
//! COMPANION_CHAT__API_KEY=...      → chat.api_key
//! COMPANION_TTS__VOICE_ID=...      → tts.voice_id
//! COMPANION_OBSERVABILITY__LOG_JSON=true
//! ```

pub mod settings;

pub use settings::{
    load_settings, load_settings_from, ChatSettings, ChunkerSettings, ObservabilityConfig,
    PlaybackSettings, Settings, SttSettings, TtsSettings,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}
