//! Platform traits for the speech pipeline
//!
//! The speech queue only sees these seams, so the same ordering and
//! cancellation logic runs against HTTP synthesis, a local player process,
//! or in-memory fakes in tests.
//!
//! ```text
//! SpeechSynthesizer: Text → AudioPayload (or a Skipped reason)
//! AudioPlayer:       AudioPayload → device output
//! SpeechToText:      AudioPayload → Text
//! ```

mod speech;

pub use speech::{AudioPlayer, SpeechSynthesizer, SpeechToText};
