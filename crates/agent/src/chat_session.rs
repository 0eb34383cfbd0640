//! Chat Session
//!
//! One conversation with the companion. Each call to [`ChatSession::send`]
//! is a turn:
//!
//! ```text
//! chat endpoint ──deltas──▶ SentenceChunker ──sentences──▶ SpeechQueue ──▶ player
//!        │
//!        └──deltas──▶ caller (display)
//! ```
//!
//! A turn never fails outright. Without credentials, or when the endpoint
//! fails before any text arrives, an offline reply is streamed instead.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::Instrument;
use uuid::Uuid;

use companion_config::Settings;
use companion_core::AudioPlayer;
use companion_llm::{ChatBackend, ChatClient, LlmError, MockResponder};
use companion_pipeline::{
    ChunkerConfig, CommandPlayer, ElevenLabsSynthesizer, NullPlayer, SentenceChunker, SpeechEvent,
    SpeechQueue, SpeechQueueConfig,
};

use crate::AgentError;

/// Where a reply's text came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplySource {
    Api,
    Mock,
}

/// Outcome of one turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatReply {
    /// Full reply text as shown to the user
    pub text: String,
    pub source: ReplySource,
    /// Set when the endpoint failed, even if text was recovered
    pub error: Option<String>,
}

/// Chat session
pub struct ChatSession {
    id: Uuid,
    backend: Arc<dyn ChatBackend>,
    mock: MockResponder,
    queue: SpeechQueue,
    chunker: ChunkerConfig,
    voice_enabled: bool,
    turns: u64,
}

impl ChatSession {
    pub fn new(backend: Arc<dyn ChatBackend>, queue: SpeechQueue, chunker: ChunkerConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            backend,
            mock: MockResponder::new(),
            queue,
            chunker,
            voice_enabled: true,
            turns: 0,
        }
    }

    /// Build a session from application settings
    ///
    /// An empty playback command selects a silent player.
    pub fn from_settings(settings: &Settings) -> Result<Self, AgentError> {
        let backend = Arc::new(ChatClient::new(settings.chat.clone())?);
        let synthesizer = Arc::new(ElevenLabsSynthesizer::new(settings.tts.clone())?);
        let player: Arc<dyn AudioPlayer> = if settings.playback.command.is_empty() {
            Arc::new(NullPlayer)
        } else {
            Arc::new(CommandPlayer::new(&settings.playback.command)?)
        };

        let queue = SpeechQueue::with_config(
            synthesizer,
            player,
            SpeechQueueConfig {
                fetch_timeout: settings.tts.fetch_timeout_secs.map(Duration::from_secs),
                ..Default::default()
            },
        );

        Ok(Self::new(backend, queue, ChunkerConfig::from(&settings.chunker)))
    }

    /// Replace the offline reply source
    pub fn with_mock(mut self, mock: MockResponder) -> Self {
        self.mock = mock;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn turns(&self) -> u64 {
        self.turns
    }

    pub fn voice_enabled(&self) -> bool {
        self.voice_enabled
    }

    pub fn set_voice_enabled(&mut self, enabled: bool) {
        if !enabled {
            self.queue.stop_all();
        }
        self.voice_enabled = enabled;
    }

    /// Speech queue playback events
    pub fn speech_events(&self) -> broadcast::Receiver<SpeechEvent> {
        self.queue.subscribe()
    }

    pub fn speech_queue(&self) -> &SpeechQueue {
        &self.queue
    }

    /// Stop speaking immediately and drop queued sentences
    pub fn interrupt(&self) {
        tracing::info!(session = %self.id, "Interrupting speech");
        self.queue.stop_all();
    }

    /// Resolve once every queued sentence has played or been skipped
    pub async fn wait_for_speech(&self) {
        self.queue.wait_idle().await;
    }

    /// Send a user message and stream the reply
    ///
    /// Deltas reach `on_delta` as they arrive; complete sentences are voiced
    /// while the rest of the reply is still streaming. Any audio left from
    /// the previous turn is stopped first.
    pub async fn send(
        &mut self,
        message: &str,
        on_delta: &mut (dyn for<'d> FnMut(&'d str) + Send),
    ) -> ChatReply {
        self.turns += 1;
        let span = tracing::info_span!("turn", session = %self.id, turn = self.turns);
        self.queue.stop_all();

        self.run_turn(message, on_delta).instrument(span).await
    }

    async fn run_turn(
        &self,
        message: &str,
        on_delta: &mut (dyn for<'d> FnMut(&'d str) + Send),
    ) -> ChatReply {
        let queue = self.queue.clone();
        let voice = self.voice_enabled;
        let mut chunker = SentenceChunker::new(self.chunker.clone(), move |sentence: String| {
            if voice {
                queue.enqueue(sentence);
            }
        });

        let mut partial = String::new();
        let result = if self.backend.is_configured() {
            let mut forward = |delta: &str| {
                partial.push_str(delta);
                on_delta(delta);
                chunker.add_delta(delta);
            };
            self.backend.stream_reply(message, &mut forward).await
        } else {
            Err(LlmError::Configuration("chat API key not set".to_string()))
        };

        let result = match result {
            Ok(text) if text.trim().is_empty() => Err(LlmError::InvalidResponse(
                "stream returned no content".to_string(),
            )),
            other => other,
        };

        match result {
            Ok(text) => {
                chunker.flush();
                tracing::info!(chars = text.len(), "Reply complete");
                ChatReply {
                    text,
                    source: ReplySource::Api,
                    error: None,
                }
            },
            Err(err) => {
                match &err {
                    LlmError::Configuration(_) => {
                        tracing::info!("Chat endpoint not configured, using offline reply")
                    },
                    _ if !partial.trim().is_empty() => {
                        tracing::warn!(
                            error = %err,
                            chars = partial.len(),
                            "Chat stream broke off, discarding partial reply"
                        );
                        self.queue.stop_all();
                    },
                    _ => tracing::warn!(error = %err, "Chat request failed, using offline reply"),
                }
                chunker.reset();
                let text = self
                    .mock
                    .stream_into(&mut |delta: &str| {
                        on_delta(delta);
                        chunker.add_delta(delta);
                    })
                    .await;
                chunker.flush();
                ChatReply {
                    text,
                    source: ReplySource::Mock,
                    error: Some(err.to_string()),
                }
            },
        }
    }
}
