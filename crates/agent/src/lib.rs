//! Chat session orchestration
//!
//! Wires the chat endpoint's delta stream through the sentence chunker into
//! the speech queue, with offline fallback replies and interruption.

pub mod chat_session;

pub use chat_session::{ChatReply, ChatSession, ReplySource};

use thiserror::Error;

use companion_config::ConfigError;
use companion_llm::LlmError;
use companion_pipeline::PipelineError;

/// Agent errors
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Chat error: {0}")]
    Llm(#[from] LlmError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl From<AgentError> for companion_core::Error {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::Llm(e) => e.into(),
            AgentError::Pipeline(e) => e.into(),
            AgentError::Config(e) => companion_core::Error::Config(e.to_string()),
        }
    }
}
