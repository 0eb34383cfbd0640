//! Speech processing traits

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::{AudioPayload, PlaybackOutcome, Result, Skipped};

/// Text-to-Speech interface used by the speech queue
///
/// # Example
///
/// ```ignore
/// let tts: Arc<dyn SpeechSynthesizer> = Arc::new(ElevenLabsSynthesizer::new(settings.tts)?);
/// let cancel = CancellationToken::new();
/// match tts.synthesize("Take a slow breath.", &cancel).await {
///     Ok(audio) => player.play(audio, cancel.child_token()).await,
///     Err(skipped) => tracing::debug!(%skipped, "no audio"),
/// }
/// ```
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync + 'static {
    /// Fetch audio for one sentence
    ///
    /// # Arguments
    /// * `text` - Sentence to voice
    /// * `cancel` - Aborts the request when cancelled
    ///
    /// # Returns
    /// The audio payload, or the reason no audio was produced. Failures are
    /// never raised as errors.
    async fn synthesize(
        &self,
        text: &str,
        cancel: &CancellationToken,
    ) -> std::result::Result<AudioPayload, Skipped>;

    /// Whether credentials are present. An unconfigured synthesizer turns
    /// the speech queue into a silent no-op.
    fn is_configured(&self) -> bool {
        true
    }

    /// Name for logging
    fn name(&self) -> &str;
}

/// Audio output device
#[async_trait]
pub trait AudioPlayer: Send + Sync + 'static {
    /// Play one clip to completion
    ///
    /// Must return promptly with [`PlaybackOutcome::Stopped`] once `cancel`
    /// fires, and must not start output if it is already cancelled. The
    /// payload is owned by this call and released when it returns.
    async fn play(&self, audio: AudioPayload, cancel: CancellationToken) -> PlaybackOutcome;
}

/// Speech-to-Text interface
#[async_trait]
pub trait SpeechToText: Send + Sync + 'static {
    /// Transcribe a recorded clip
    ///
    /// # Arguments
    /// * `audio` - Encoded recording
    /// * `file_name` - Name reported to the endpoint, its extension hints the format
    async fn transcribe(&self, audio: AudioPayload, file_name: &str) -> Result<String>;

    /// Model name for logging
    fn model_name(&self) -> &str;
}
