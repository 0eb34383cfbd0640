//! Offline replies
//!
//! Used when the chat endpoint has no credentials or fails before producing
//! any text. Replies are replayed word by word so the rest of the pipeline
//! sees the same delta shape as a live stream.

use std::time::Duration;

use rand::seq::SliceRandom;

/// Canned supportive replies
pub const MOCK_REPLIES: [&str; 7] = [
    "I hear you. Can you tell me more about how that makes you feel?",
    "That sounds challenging. How does that sensation affect your day?",
    "It's understandable to feel that way given what you're going through.",
    "Let's take a deep breath together. What is one small thing you can do for yourself right now?",
    "Thank you for sharing that with me. Have you noticed any patterns when this happens?",
    "You're doing a great job simply by being aware of these feelings.",
    "How does the tension in your body change when you talk about this?",
];

const DEFAULT_DELAY: Duration = Duration::from_millis(30);

/// Picks and replays offline replies
#[derive(Debug, Clone)]
pub struct MockResponder {
    replies: Vec<String>,
    delay: Duration,
}

impl Default for MockResponder {
    fn default() -> Self {
        Self::new()
    }
}

impl MockResponder {
    pub fn new() -> Self {
        Self::with_replies(MOCK_REPLIES.iter().map(|s| s.to_string()).collect())
    }

    /// Use a custom reply set; an empty set falls back to the defaults
    pub fn with_replies(replies: Vec<String>) -> Self {
        let replies = if replies.is_empty() {
            MOCK_REPLIES.iter().map(|s| s.to_string()).collect()
        } else {
            replies
        };
        Self {
            replies,
            delay: DEFAULT_DELAY,
        }
    }

    /// Pause between replayed words
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Choose a reply at random
    pub fn pick(&self) -> &str {
        self.replies
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
            .unwrap_or(MOCK_REPLIES[0])
    }

    /// Pick a reply and replay it through `on_delta`
    pub async fn stream_into(
        &self,
        on_delta: &mut (dyn for<'d> FnMut(&'d str) + Send),
    ) -> String {
        let text = self.pick().to_string();
        replay_words(&text, self.delay, on_delta).await;
        text
    }
}

/// Split text into word-plus-trailing-whitespace pieces
///
/// Concatenating the pieces yields the input unchanged.
pub fn word_chunks(text: &str) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut in_space = false;

    for (idx, ch) in text.char_indices() {
        if ch.is_whitespace() {
            in_space = true;
        } else if in_space {
            chunks.push(&text[start..idx]);
            start = idx;
            in_space = false;
        }
    }
    if start < text.len() {
        chunks.push(&text[start..]);
    }
    chunks
}

/// Feed `text` to `on_delta` one word at a time
pub async fn replay_words(
    text: &str,
    delay: Duration,
    on_delta: &mut (dyn for<'d> FnMut(&'d str) + Send),
) {
    let chunks = word_chunks(text);
    let last = chunks.len().saturating_sub(1);
    for (i, chunk) in chunks.into_iter().enumerate() {
        on_delta(chunk);
        if i < last && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}
