//! Chat completion integration
//!
//! Features:
//! - Incremental server-sent-events decoding into ordered text deltas
//! - Chat endpoint client (streaming SSE or single JSON replies)
//! - Offline canned replies when the endpoint is unavailable

pub mod client;
pub mod mock;
pub mod sse;

pub use client::{ChatBackend, ChatClient};
pub use mock::{replay_words, word_chunks, MockResponder, MOCK_REPLIES};
pub use sse::{read_sse_stream, SseDecoder, SseFrame};

use thiserror::Error;

/// Chat errors
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout")]
    Timeout,

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

impl From<std::io::Error> for LlmError {
    fn from(err: std::io::Error) -> Self {
        LlmError::Network(err.to_string())
    }
}

impl From<LlmError> for companion_core::Error {
    fn from(err: LlmError) -> Self {
        companion_core::Error::Llm(err.to_string())
    }
}
