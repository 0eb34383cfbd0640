//! Core traits and types for the companion voice pipeline
//!
//! This crate provides foundational types used across all other crates:
//! - Audio payloads and per-entry synthesis outcomes
//! - Platform traits for synthesis, playback and transcription
//! - Error types

pub mod audio;
pub mod error;
pub mod traits;

pub use audio::{AudioPayload, PlaybackOutcome, Skipped, MIME_MPEG};
pub use error::{Error, Result};
pub use traits::{AudioPlayer, SpeechSynthesizer, SpeechToText};

pub use tokio_util::sync::CancellationToken;
