//! Streaming speech pipeline
//!
//! Features:
//! - Sentence chunking of incremental text
//! - Ordered, pipelined speech playback with total cancellation
//! - HTTP speech synthesis and transcription backends
//! - Local audio players

pub mod chunker;
pub mod playback;
pub mod speech_queue;
pub mod stt;
pub mod tts;

pub use chunker::{ChunkerConfig, SentenceChunker};
pub use playback::{CommandPlayer, NullPlayer};
pub use speech_queue::{SpeechEvent, SpeechQueue, SpeechQueueConfig};
pub use stt::WhisperTranscriber;
pub use tts::ElevenLabsSynthesizer;

use thiserror::Error;

/// Pipeline errors
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("TTS error: {0}")]
    Tts(String),

    #[error("STT error: {0}")]
    Stt(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<PipelineError> for companion_core::Error {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Io(e) => companion_core::Error::Io(e),
            other => companion_core::Error::Pipeline(other.to_string()),
        }
    }
}
