//! Ordered speech playback
//!
//! Each enqueued sentence starts its audio fetch immediately, so the next
//! sentence downloads while the current one plays. A single driver task
//! walks the queue head-first: it waits for the head entry's fetch, plays it
//! to completion, and only then looks at the next entry. Sentence *i* never
//! starts before sentence *i-1* has finished or been skipped, whatever order
//! the fetches complete in.
//!
//! `stop_all` bumps a generation counter and cancels the current token.
//! The driver re-checks both under the state lock right before it starts
//! playback, so a fetch that resolves concurrently with a stop never plays.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use companion_core::{AudioPayload, AudioPlayer, PlaybackOutcome, Skipped, SpeechSynthesizer};

type FetchResult = Result<AudioPayload, Skipped>;

/// Speech queue configuration
#[derive(Debug, Clone)]
pub struct SpeechQueueConfig {
    /// Give up on a sentence whose audio takes longer than this
    pub fetch_timeout: Option<Duration>,
    /// Capacity of the event broadcast channel
    pub event_capacity: usize,
}

impl Default for SpeechQueueConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: None,
            event_capacity: 64,
        }
    }
}

/// Speech queue events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechEvent {
    /// Audio for a sentence began playing
    Started { index: u64, sentence: String },
    /// A sentence played to the end
    Finished { index: u64 },
    /// A sentence produced no audio and was passed over
    Skipped { index: u64, reason: Skipped },
    /// The player rejected a sentence's audio
    PlaybackFailed { index: u64, reason: String },
    /// `stop_all` ran; `discarded` entries never reached the driver
    Stopped { discarded: usize },
}

struct Entry {
    index: u64,
    sentence: String,
    audio: JoinHandle<FetchResult>,
}

struct QueueState {
    entries: VecDeque<Entry>,
    /// Incremented by every `stop_all`; a driver only serves its own generation
    generation: u64,
    /// Parent of every fetch and playback token of the current generation
    cancel: CancellationToken,
    driver_active: bool,
    next_index: u64,
}

struct Inner {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    player: Arc<dyn AudioPlayer>,
    config: SpeechQueueConfig,
    state: Mutex<QueueState>,
    events: broadcast::Sender<SpeechEvent>,
    idle: watch::Sender<bool>,
}

impl Inner {
    fn emit(&self, event: SpeechEvent) {
        let _ = self.events.send(event);
    }
}

/// Sequential, pipelined speech playback
///
/// Cheap to clone; clones share the same queue. Independent queues share
/// nothing. `enqueue` spawns tasks and must be called inside a Tokio runtime.
#[derive(Clone)]
pub struct SpeechQueue {
    inner: Arc<Inner>,
}

impl SpeechQueue {
    pub fn new(synthesizer: Arc<dyn SpeechSynthesizer>, player: Arc<dyn AudioPlayer>) -> Self {
        Self::with_config(synthesizer, player, SpeechQueueConfig::default())
    }

    pub fn with_config(
        synthesizer: Arc<dyn SpeechSynthesizer>,
        player: Arc<dyn AudioPlayer>,
        config: SpeechQueueConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let (idle, _) = watch::channel(true);

        Self {
            inner: Arc::new(Inner {
                synthesizer,
                player,
                config,
                state: Mutex::new(QueueState {
                    entries: VecDeque::new(),
                    generation: 0,
                    cancel: CancellationToken::new(),
                    driver_active: false,
                    next_index: 0,
                }),
                events,
                idle,
            }),
        }
    }

    /// Subscribe to playback events
    pub fn subscribe(&self) -> broadcast::Receiver<SpeechEvent> {
        self.inner.events.subscribe()
    }

    /// Whether sentences will actually be voiced
    pub fn is_enabled(&self) -> bool {
        self.inner.synthesizer.is_configured()
    }

    /// Queue a sentence and start fetching its audio right away
    ///
    /// Without synthesis credentials this is a silent no-op.
    pub fn enqueue(&self, sentence: impl Into<String>) {
        if !self.inner.synthesizer.is_configured() {
            tracing::trace!(synthesizer = self.inner.synthesizer.name(), "Speech disabled, sentence dropped");
            return;
        }

        let sentence = sentence.into();
        if sentence.trim().is_empty() {
            return;
        }

        let mut state = self.inner.state.lock();
        let index = state.next_index;
        state.next_index += 1;

        let audio = tokio::spawn(fetch_audio(
            Arc::clone(&self.inner.synthesizer),
            sentence.clone(),
            state.cancel.child_token(),
            self.inner.config.fetch_timeout,
        ));
        state.entries.push_back(Entry {
            index,
            sentence,
            audio,
        });
        tracing::debug!(index, pending = state.entries.len(), "Sentence queued for speech");

        if !state.driver_active {
            state.driver_active = true;
            self.inner.idle.send_replace(false);
            tokio::spawn(drive(Arc::clone(&self.inner), state.generation));
        }
    }

    /// Cancel the pending fetch, silence current playback and drop every
    /// queued entry
    ///
    /// Safe to call at any time, any number of times.
    pub fn stop_all(&self) {
        let discarded = {
            let mut state = self.inner.state.lock();
            state.generation += 1;
            state.cancel.cancel();
            state.cancel = CancellationToken::new();
            state.driver_active = false;

            let discarded = state.entries.len();
            for entry in state.entries.drain(..) {
                entry.audio.abort();
            }
            self.inner.idle.send_replace(true);
            discarded
        };

        tracing::debug!(discarded, "Speech stopped");
        self.inner.emit(SpeechEvent::Stopped { discarded });
    }

    /// No entry queued and nothing fetching or playing
    pub fn is_idle(&self) -> bool {
        let state = self.inner.state.lock();
        !state.driver_active && state.entries.is_empty()
    }

    /// Entries not yet taken up by the driver
    pub fn pending_len(&self) -> usize {
        self.inner.state.lock().entries.len()
    }

    /// Resolve once the queue has drained or been stopped
    pub async fn wait_idle(&self) {
        let mut idle = self.inner.idle.subscribe();
        let _ = idle.wait_for(|idle| *idle).await;
    }
}

async fn fetch_audio(
    synthesizer: Arc<dyn SpeechSynthesizer>,
    text: String,
    cancel: CancellationToken,
    timeout: Option<Duration>,
) -> FetchResult {
    let request = async {
        let fetch = synthesizer.synthesize(&text, &cancel);
        match timeout {
            Some(limit) => tokio::time::timeout(limit, fetch)
                .await
                .unwrap_or(Err(Skipped::TimedOut)),
            None => fetch.await,
        }
    };

    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Skipped::Cancelled),
        result = request => result,
    };

    match result {
        Ok(audio) if audio.is_empty() => Err(Skipped::EmptyPayload),
        other => other,
    }
}

async fn drive(inner: Arc<Inner>, generation: u64) {
    loop {
        let (entry, cancel) = {
            let mut state = inner.state.lock();
            if state.generation != generation {
                return;
            }
            match state.entries.pop_front() {
                Some(entry) => (entry, state.cancel.child_token()),
                None => {
                    state.driver_active = false;
                    inner.idle.send_replace(true);
                    return;
                },
            }
        };

        let Entry {
            index,
            sentence,
            mut audio,
        } = entry;

        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            joined = &mut audio => Some(joined),
        };

        let result = match fetched {
            None => {
                audio.abort();
                return;
            },
            Some(Ok(result)) => result,
            Some(Err(err)) if err.is_cancelled() => Err(Skipped::Cancelled),
            Some(Err(err)) => Err(Skipped::Transport(format!("fetch task failed: {}", err))),
        };

        let payload = match result {
            Ok(payload) => payload,
            Err(reason) => {
                if reason == Skipped::Cancelled {
                    tracing::debug!(index, "Fetch cancelled, skipping sentence");
                } else {
                    tracing::warn!(index, %reason, "No audio for sentence, skipping");
                }
                inner.emit(SpeechEvent::Skipped { index, reason });
                continue;
            },
        };

        {
            let state = inner.state.lock();
            if state.generation != generation || cancel.is_cancelled() {
                return;
            }
            tracing::debug!(index, bytes = payload.len(), "Playing sentence");
            inner.emit(SpeechEvent::Started { index, sentence });
        }

        match inner.player.play(payload, cancel).await {
            PlaybackOutcome::Completed => inner.emit(SpeechEvent::Finished { index }),
            PlaybackOutcome::Stopped => tracing::debug!(index, "Playback stopped"),
            PlaybackOutcome::Failed(reason) => {
                tracing::warn!(index, %reason, "Playback failed, continuing");
                inner.emit(SpeechEvent::PlaybackFailed { index, reason });
            },
        }
    }
}
