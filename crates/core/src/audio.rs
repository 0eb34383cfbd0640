//! Audio payloads and the outcomes of fetching and playing them

use bytes::Bytes;
use thiserror::Error;

/// MIME type returned by the synthesis endpoint
pub const MIME_MPEG: &str = "audio/mpeg";

/// An encoded audio clip ready to hand to a player
///
/// The bytes are reference counted, so cloning a payload never copies audio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioPayload {
    pub data: Bytes,
    pub mime: String,
}

impl AudioPayload {
    pub fn new(data: impl Into<Bytes>, mime: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            mime: mime.into(),
        }
    }

    /// MPEG audio, the format the synthesis endpoint streams back
    pub fn mpeg(data: impl Into<Bytes>) -> Self {
        Self::new(data, MIME_MPEG)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Why a queued sentence produced no audio
///
/// A skip is an expected outcome of the voice feature, not an error: the
/// speech queue logs it, reports it to subscribers and moves on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Skipped {
    #[error("fetch cancelled")]
    Cancelled,

    #[error("synthesis endpoint returned HTTP {0}")]
    HttpStatus(u16),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("synthesis returned no audio")]
    EmptyPayload,

    #[error("synthesis timed out")]
    TimedOut,

    #[error("synthesis credentials not configured")]
    NotConfigured,
}

/// How a single play call ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// The clip played to the end
    Completed,
    /// Playback was cancelled before the end
    Stopped,
    /// The player could not play the clip
    Failed(String),
}

impl PlaybackOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mpeg_payload() {
        let payload = AudioPayload::mpeg(vec![1u8, 2, 3]);
        assert_eq!(payload.mime, MIME_MPEG);
        assert_eq!(payload.len(), 3);
        assert!(!payload.is_empty());
    }

    #[test]
    fn test_skip_reasons_display() {
        assert_eq!(
            Skipped::HttpStatus(401).to_string(),
            "synthesis endpoint returned HTTP 401"
        );
        assert_eq!(Skipped::Cancelled.to_string(), "fetch cancelled");
    }
}
