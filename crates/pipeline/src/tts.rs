//! ElevenLabs speech synthesis
//!
//! One POST per sentence to the streaming endpoint; the whole MPEG body is
//! collected before it is handed to the player. Every failure is reported as
//! a [`Skipped`] reason rather than an error.

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::Client;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use companion_config::TtsSettings;
use companion_core::{AudioPayload, Skipped, SpeechSynthesizer, MIME_MPEG};

use crate::PipelineError;

/// ElevenLabs text-to-speech client
pub struct ElevenLabsSynthesizer {
    config: TtsSettings,
    client: Client,
}

impl ElevenLabsSynthesizer {
    /// Create a new synthesizer
    ///
    /// Missing credentials are allowed; the synthesizer then reports itself
    /// unconfigured and the speech queue stays silent.
    pub fn new(config: TtsSettings) -> Result<Self, PipelineError> {
        let client = Client::builder()
            .build()
            .map_err(|e| PipelineError::Tts(format!("Failed to create HTTP client: {}", e)))?;

        if config.is_configured() {
            tracing::info!(voice = %config.voice_id, model = %config.model_id, "Speech synthesis enabled");
        } else {
            tracing::info!("Speech synthesis disabled: API key or voice ID missing");
        }

        Ok(Self { config, client })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1/text-to-speech/{}/stream",
            self.config.base_url.trim_end_matches('/'),
            self.config.voice_id
        )
    }

    fn request_body<'a>(&'a self, text: &'a str) -> SynthesisRequest<'a> {
        SynthesisRequest {
            text: truncate_chars(text, self.config.max_chars),
            model_id: &self.config.model_id,
            voice_settings: VoiceSettings {
                stability: self.config.stability,
                similarity_boost: self.config.similarity_boost,
            },
        }
    }

    async fn fetch(&self, text: &str) -> Result<AudioPayload, Skipped> {
        let response = self
            .client
            .post(self.endpoint())
            .header("xi-api-key", &self.config.api_key)
            .header(ACCEPT, MIME_MPEG)
            .json(&self.request_body(text))
            .send()
            .await
            .map_err(|e| Skipped::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "Speech synthesis request rejected");
            return Err(Skipped::HttpStatus(status.as_u16()));
        }

        let data = response
            .bytes()
            .await
            .map_err(|e| Skipped::Transport(e.to_string()))?;

        Ok(AudioPayload::mpeg(data))
    }
}

#[async_trait]
impl SpeechSynthesizer for ElevenLabsSynthesizer {
    async fn synthesize(
        &self,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<AudioPayload, Skipped> {
        if !self.is_configured() {
            return Err(Skipped::NotConfigured);
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Skipped::Cancelled),
            result = self.fetch(text) => result,
        }
    }

    fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    fn name(&self) -> &str {
        "elevenlabs"
    }
}

/// Longest prefix of `text` with at most `max` characters
fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[derive(Debug, Serialize)]
struct SynthesisRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

#[derive(Debug, Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
}
