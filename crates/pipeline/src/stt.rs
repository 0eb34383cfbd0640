//! Whisper speech-to-text over HTTP

use std::path::Path;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;

use companion_config::SttSettings;
use companion_core::{AudioPayload, SpeechToText};

use crate::PipelineError;

const DEFAULT_FILE_NAME: &str = "recording.webm";

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    #[serde(default)]
    text: Option<String>,
}

/// Transcribes recorded clips with the OpenAI transcription endpoint
pub struct WhisperTranscriber {
    config: SttSettings,
    client: Client,
}

impl WhisperTranscriber {
    pub fn new(config: SttSettings) -> Result<Self, PipelineError> {
        let client = Client::builder()
            .build()
            .map_err(|e| PipelineError::Stt(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    pub fn is_configured(&self) -> bool {
        !self.config.api_key.trim().is_empty()
    }

    /// Transcribe an encoded clip
    pub async fn transcribe_bytes(
        &self,
        audio: AudioPayload,
        file_name: &str,
    ) -> Result<String, PipelineError> {
        if !self.is_configured() {
            return Err(PipelineError::Configuration(
                "speech-to-text API key not set".to_string(),
            ));
        }

        let file_name = if file_name.is_empty() {
            DEFAULT_FILE_NAME
        } else {
            file_name
        };

        let part = Part::bytes(audio.data.to_vec())
            .file_name(file_name.to_string())
            .mime_str(&audio.mime)
            .map_err(|e| PipelineError::Stt(format!("Invalid audio MIME type: {}", e)))?;

        let form = Form::new()
            .part("file", part)
            .text("model", self.config.model.clone())
            .text("response_format", "json");

        let started = std::time::Instant::now();
        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| PipelineError::Stt(format!("Whisper request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::Stt(format!(
                "Whisper API error {}: {}",
                status.as_u16(),
                body
            )));
        }

        let result: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::Stt(format!("Invalid Whisper response: {}", e)))?;
        let text = result.text.unwrap_or_default();

        tracing::info!(
            chars = text.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Transcription complete"
        );
        Ok(text)
    }

    /// Read an audio file and transcribe it
    pub async fn transcribe_file(&self, path: &Path) -> Result<String, PipelineError> {
        let data = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(DEFAULT_FILE_NAME);

        self.transcribe_bytes(AudioPayload::new(data, mime_for(path)), file_name)
            .await
    }
}

#[async_trait]
impl SpeechToText for WhisperTranscriber {
    async fn transcribe(&self, audio: AudioPayload, file_name: &str) -> companion_core::Result<String> {
        Ok(self.transcribe_bytes(audio, file_name).await?)
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

/// MIME type guessed from the file extension
fn mime_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
        Some("wav") => "audio/wav",
        Some("mp3") | Some("mpeg") => "audio/mpeg",
        Some("m4a") | Some("mp4") => "audio/mp4",
        Some("ogg") | Some("oga") => "audio/ogg",
        Some("flac") => "audio/flac",
        _ => "audio/webm",
    }
}
