//! Sentence chunker for streaming text
//!
//! Buffers text deltas and emits complete, speakable sentences as soon as
//! they are recognized. A boundary is one or more of `.`, `!`, `?` followed
//! by whitespace. Short candidates stay buffered and merge with what follows;
//! an over-long unpunctuated run is force-split at its last comma or
//! semicolon.
//!
//! The chunker is single-owner: every operation takes `&mut self`, and it
//! never suspends or spawns.

use once_cell::sync::Lazy;
use regex::Regex;

use companion_config::ChunkerSettings;

static SENTENCE_END: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.!?]+\s").unwrap());

/// Chunker thresholds, counted in characters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkerConfig {
    /// Candidates shorter than this (after trimming) are not emitted
    pub min_sentence_chars: usize,
    /// Buffer length above which a forced break is attempted
    pub max_buffer_chars: usize,
    /// A forced break must land after this position
    pub min_break_position: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            min_sentence_chars: 10,
            max_buffer_chars: 200,
            min_break_position: 20,
        }
    }
}

impl From<&ChunkerSettings> for ChunkerConfig {
    fn from(settings: &ChunkerSettings) -> Self {
        Self {
            min_sentence_chars: settings.min_sentence_chars,
            max_buffer_chars: settings.max_buffer_chars,
            min_break_position: settings.min_break_position,
        }
    }
}

/// Sentence chunker
///
/// Each emitted sentence goes to the callback given at construction,
/// synchronously and in generation order.
pub struct SentenceChunker<F>
where
    F: FnMut(String),
{
    config: ChunkerConfig,
    buffer: String,
    on_sentence: F,
}

impl<F> SentenceChunker<F>
where
    F: FnMut(String),
{
    pub fn new(config: ChunkerConfig, on_sentence: F) -> Self {
        Self {
            config,
            buffer: String::new(),
            on_sentence,
        }
    }

    /// Text received but not yet emitted
    pub fn buffered(&self) -> &str {
        &self.buffer
    }

    pub fn is_idle(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Append a delta and emit every sentence it completes
    pub fn add_delta(&mut self, delta: &str) {
        self.buffer.push_str(delta);

        let mut consumed = 0;
        for boundary in SENTENCE_END.find_iter(&self.buffer) {
            let candidate = self.buffer[consumed..boundary.end()].trim();
            if candidate.chars().count() >= self.config.min_sentence_chars {
                (self.on_sentence)(candidate.to_string());
                consumed = boundary.end();
            }
        }
        if consumed > 0 {
            self.buffer.drain(..consumed);
        }

        if self.buffer.chars().count() > self.config.max_buffer_chars {
            self.force_break();
        }
    }

    /// Emit whatever remains, regardless of length or punctuation
    pub fn flush(&mut self) {
        let rest = std::mem::take(&mut self.buffer);
        let rest = rest.trim();
        if !rest.is_empty() {
            (self.on_sentence)(rest.to_string());
        }
    }

    /// Discard buffered text without emitting it
    pub fn reset(&mut self) {
        if !self.buffer.is_empty() {
            tracing::trace!(chars = self.buffer.len(), "Discarding buffered text");
        }
        self.buffer.clear();
    }

    fn force_break(&mut self) {
        let comma = self.buffer.rfind(", ");
        let semicolon = self.buffer.rfind("; ");
        let Some(at) = comma.max(semicolon) else {
            return;
        };

        if self.buffer[..at].chars().count() <= self.config.min_break_position {
            return;
        }

        let chunk = self.buffer[..=at].trim().to_string();
        // the mark and the space after it are both one byte
        self.buffer.drain(..at + 2);
        tracing::debug!(chars = chunk.len(), "Forced sentence break on long run");
        (self.on_sentence)(chunk);
    }
}
