//! Chat completion endpoint client
//!
//! The endpoint answers either with an SSE stream of completion chunks or,
//! when it decides not to stream, with one JSON object. Both are surfaced to
//! the caller as a sequence of text deltas.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::Client;
use serde::Serialize;

use companion_config::ChatSettings;

use crate::mock::replay_words;
use crate::sse::read_sse_stream;
use crate::LlmError;

/// Pause between simulated deltas when the endpoint replies in one piece
const REPLAY_DELAY: Duration = Duration::from_millis(30);

/// Source of streamed chat replies
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Send one user message and stream the reply
    ///
    /// # Arguments
    /// * `message` - User text
    /// * `on_delta` - Called with each text fragment, in order
    ///
    /// # Returns
    /// The full reply text
    async fn stream_reply(
        &self,
        message: &str,
        on_delta: &mut (dyn for<'d> FnMut(&'d str) + Send),
    ) -> Result<String, LlmError>;

    /// Whether credentials are present
    fn is_configured(&self) -> bool;
}

/// HTTP client for the chat endpoint
#[derive(Clone)]
pub struct ChatClient {
    client: Client,
    config: ChatSettings,
    replay_delay: Duration,
}

impl ChatClient {
    /// Create a new chat client
    pub fn new(config: ChatSettings) -> Result<Self, LlmError> {
        // Per-read limit so long replies keep streaming while chunks arrive
        let limit = Duration::from_secs(config.request_timeout_secs);
        let client = Client::builder()
            .connect_timeout(limit)
            .read_timeout(limit)
            .build()
            .map_err(|e| LlmError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            replay_delay: REPLAY_DELAY,
        })
    }

    /// Override the pause between simulated deltas of a non-streamed reply
    pub fn with_replay_delay(mut self, delay: Duration) -> Self {
        self.replay_delay = delay;
        self
    }

    pub fn config(&self) -> &ChatSettings {
        &self.config
    }

    fn build_headers(&self) -> Result<HeaderMap, LlmError> {
        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(&self.config.api_key)
            .map_err(|e| LlmError::Configuration(format!("Invalid API key header: {}", e)))?;
        headers.insert("X-API-Key", key);
        Ok(headers)
    }

    fn request_body<'a>(&'a self, message: &'a str) -> ChatRequest<'a> {
        ChatRequest {
            messages: vec![ChatMessage {
                role: "user",
                content: message,
            }],
            space_id: &self.config.space_id,
            bot_id: &self.config.bot_id,
            user_id: &self.config.user_id,
            stream: self.config.stream,
        }
    }
}

#[async_trait]
impl ChatBackend for ChatClient {
    async fn stream_reply(
        &self,
        message: &str,
        on_delta: &mut (dyn for<'d> FnMut(&'d str) + Send),
    ) -> Result<String, LlmError> {
        if !self.is_configured() {
            return Err(LlmError::Configuration("chat API key not set".to_string()));
        }

        tracing::debug!(url = %self.config.api_url, chars = message.len(), "Sending chat message");

        let response = self
            .client
            .post(&self.config.api_url)
            .headers(self.build_headers()?)
            .json(&self.request_body(message))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("HTTP {}: {}", status.as_u16(), body)));
        }

        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.contains("application/json"))
            .unwrap_or(false);

        if is_json {
            let value: serde_json::Value = response
                .json()
                .await
                .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
            let text = extract_reply_text(&value).ok_or_else(|| {
                LlmError::InvalidResponse("no reply text in JSON response".to_string())
            })?;
            tracing::debug!(chars = text.len(), "Chat endpoint replied without streaming");
            replay_words(&text, self.replay_delay, on_delta).await;
            return Ok(text);
        }

        read_sse_stream(response.bytes_stream(), |delta| on_delta(delta)).await
    }

    fn is_configured(&self) -> bool {
        self.config.is_configured()
    }
}

/// Reply text of a non-streamed response
///
/// Completion-shaped bodies carry it in `choices[0].message.content`; other
/// deployments use a top-level `response`, `message` or `text` string.
fn extract_reply_text(value: &serde_json::Value) -> Option<String> {
    let completion = value
        .pointer("/choices/0/message/content")
        .and_then(|v| v.as_str());

    completion
        .or_else(|| {
            ["response", "message", "text"]
                .iter()
                .find_map(|key| value.get(*key).and_then(|v| v.as_str()))
        })
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    messages: Vec<ChatMessage<'a>>,
    space_id: &'a str,
    bot_id: &'a str,
    user_id: &'a str,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}
