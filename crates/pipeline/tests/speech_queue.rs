//! Speech queue ordering, skipping and cancellation tests
//!
//! Fetch latency and playback length are simulated with tokio timers on a
//! paused clock, so the tests are deterministic.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::time::{sleep, timeout, Instant};
use tokio_util::sync::CancellationToken;

use companion_core::{AudioPayload, AudioPlayer, PlaybackOutcome, Skipped, SpeechSynthesizer};
use companion_pipeline::{SpeechEvent, SpeechQueue, SpeechQueueConfig};

/// Synthesizer whose latency and outcome are scripted per sentence
struct ScriptedSynth {
    script: HashMap<String, (Duration, Result<(), Skipped>)>,
    configured: bool,
    calls: AtomicUsize,
}

impl ScriptedSynth {
    fn new() -> Self {
        Self {
            script: HashMap::new(),
            configured: true,
            calls: AtomicUsize::new(0),
        }
    }

    fn with(mut self, text: &str, delay_ms: u64, outcome: Result<(), Skipped>) -> Self {
        self.script
            .insert(text.to_string(), (Duration::from_millis(delay_ms), outcome));
        self
    }

    fn unconfigured(mut self) -> Self {
        self.configured = false;
        self
    }
}

#[async_trait]
impl SpeechSynthesizer for ScriptedSynth {
    async fn synthesize(
        &self,
        text: &str,
        _cancel: &CancellationToken,
    ) -> Result<AudioPayload, Skipped> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (delay, outcome) = self
            .script
            .get(text)
            .cloned()
            .unwrap_or((Duration::from_millis(10), Ok(())));
        sleep(delay).await;
        outcome.map(|_| AudioPayload::mpeg(text.as_bytes().to_vec()))
    }

    fn is_configured(&self) -> bool {
        self.configured
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Player that records what it was asked to play
struct RecordingPlayer {
    duration: Duration,
    started: Mutex<Vec<String>>,
    completed: Mutex<Vec<String>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl RecordingPlayer {
    fn new(duration_ms: u64) -> Arc<Self> {
        Arc::new(Self {
            duration: Duration::from_millis(duration_ms),
            started: Mutex::new(Vec::new()),
            completed: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        })
    }

    fn started(&self) -> Vec<String> {
        self.started.lock().clone()
    }

    fn completed(&self) -> Vec<String> {
        self.completed.lock().clone()
    }
}

#[async_trait]
impl AudioPlayer for RecordingPlayer {
    async fn play(&self, audio: AudioPayload, cancel: CancellationToken) -> PlaybackOutcome {
        if cancel.is_cancelled() {
            return PlaybackOutcome::Stopped;
        }

        let text = String::from_utf8_lossy(&audio.data).into_owned();
        self.started.lock().push(text.clone());
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);

        let outcome = tokio::select! {
            _ = cancel.cancelled() => PlaybackOutcome::Stopped,
            _ = sleep(self.duration) => {
                self.completed.lock().push(text);
                PlaybackOutcome::Completed
            }
        };

        self.active.fetch_sub(1, Ordering::SeqCst);
        outcome
    }
}

fn queue_with(synth: ScriptedSynth, player: &Arc<RecordingPlayer>) -> (SpeechQueue, Arc<ScriptedSynth>) {
    let synth = Arc::new(synth);
    let queue = SpeechQueue::new(synth.clone(), player.clone());
    (queue, synth)
}

async fn drain(queue: &SpeechQueue) {
    timeout(Duration::from_secs(30), queue.wait_idle())
        .await
        .expect("queue should drain");
}

fn collect_events(rx: &mut broadcast::Receiver<SpeechEvent>) -> Vec<SpeechEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Playback follows enqueue order even when later fetches finish first
#[tokio::test(start_paused = true)]
async fn test_plays_in_order_under_inverted_latency() {
    let player = RecordingPlayer::new(50);
    let synth = ScriptedSynth::new()
        .with("Sentence A.", 300, Ok(()))
        .with("Sentence B.", 20, Ok(()))
        .with("Sentence C.", 100, Ok(()));
    let (queue, _) = queue_with(synth, &player);

    queue.enqueue("Sentence A.");
    queue.enqueue("Sentence B.");
    queue.enqueue("Sentence C.");
    drain(&queue).await;

    assert_eq!(player.started(), vec!["Sentence A.", "Sentence B.", "Sentence C."]);
    assert_eq!(player.completed(), player.started());
    assert!(queue.is_idle());
}

/// The next fetch runs while the current sentence plays
#[tokio::test(start_paused = true)]
async fn test_fetches_overlap_playback() {
    let player = RecordingPlayer::new(100);
    let synth = ScriptedSynth::new()
        .with("one", 100, Ok(()))
        .with("two", 100, Ok(()))
        .with("three", 100, Ok(()));
    let (queue, synth) = queue_with(synth, &player);

    let start = Instant::now();
    queue.enqueue("one");
    queue.enqueue("two");
    queue.enqueue("three");
    drain(&queue).await;
    let elapsed = start.elapsed();

    // serial fetch-then-play would take 600ms
    assert!(elapsed >= Duration::from_millis(400), "elapsed {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(450), "elapsed {:?}", elapsed);
    assert_eq!(synth.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_single_playback_at_a_time() {
    let player = RecordingPlayer::new(40);
    let synth = ScriptedSynth::new()
        .with("s0", 90, Ok(()))
        .with("s1", 10, Ok(()))
        .with("s2", 70, Ok(()))
        .with("s3", 5, Ok(()))
        .with("s4", 200, Ok(()));
    let (queue, _) = queue_with(synth, &player);

    for i in 0..5 {
        queue.enqueue(format!("s{}", i));
    }
    drain(&queue).await;

    assert_eq!(player.started(), vec!["s0", "s1", "s2", "s3", "s4"]);
    assert_eq!(player.max_active.load(Ordering::SeqCst), 1);
}

/// A failed fetch is skipped silently and the queue keeps going
#[tokio::test(start_paused = true)]
async fn test_failed_fetch_is_skipped() {
    let player = RecordingPlayer::new(30);
    let synth = ScriptedSynth::new()
        .with("broken", 10, Err(Skipped::HttpStatus(500)))
        .with("fine", 10, Ok(()));
    let (queue, _) = queue_with(synth, &player);
    let mut events = queue.subscribe();

    queue.enqueue("broken");
    queue.enqueue("fine");
    drain(&queue).await;

    assert_eq!(player.started(), vec!["fine"]);
    assert!(queue.is_idle());
    assert_eq!(queue.pending_len(), 0);

    let events = collect_events(&mut events);
    assert_eq!(
        events,
        vec![
            SpeechEvent::Skipped {
                index: 0,
                reason: Skipped::HttpStatus(500)
            },
            SpeechEvent::Started {
                index: 1,
                sentence: "fine".to_string()
            },
            SpeechEvent::Finished { index: 1 },
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_empty_audio_is_skipped() {
    struct SilentSynth;

    #[async_trait]
    impl SpeechSynthesizer for SilentSynth {
        async fn synthesize(
            &self,
            _text: &str,
            _cancel: &CancellationToken,
        ) -> Result<AudioPayload, Skipped> {
            Ok(AudioPayload::mpeg(Vec::new()))
        }

        fn name(&self) -> &str {
            "silent"
        }
    }

    let player = RecordingPlayer::new(10);
    let queue = SpeechQueue::new(Arc::new(SilentSynth), player.clone());
    let mut events = queue.subscribe();

    queue.enqueue("nothing to hear");
    drain(&queue).await;

    assert!(player.started().is_empty());
    assert_eq!(
        collect_events(&mut events),
        vec![SpeechEvent::Skipped {
            index: 0,
            reason: Skipped::EmptyPayload
        }]
    );
}

#[tokio::test(start_paused = true)]
async fn test_fetch_timeout_skips_sentence() {
    let player = RecordingPlayer::new(10);
    let synth = Arc::new(
        ScriptedSynth::new()
            .with("hung", 60_000, Ok(()))
            .with("quick", 10, Ok(())),
    );
    let queue = SpeechQueue::with_config(
        synth,
        player.clone(),
        SpeechQueueConfig {
            fetch_timeout: Some(Duration::from_millis(500)),
            ..Default::default()
        },
    );
    let mut events = queue.subscribe();

    let start = Instant::now();
    queue.enqueue("hung");
    queue.enqueue("quick");
    drain(&queue).await;

    assert_eq!(player.started(), vec!["quick"]);
    assert!(start.elapsed() < Duration::from_secs(1));
    assert!(collect_events(&mut events).contains(&SpeechEvent::Skipped {
        index: 0,
        reason: Skipped::TimedOut
    }));
}

#[tokio::test(start_paused = true)]
async fn test_stop_all_is_idempotent() {
    let player = RecordingPlayer::new(10);
    let (queue, _) = queue_with(ScriptedSynth::new(), &player);

    queue.stop_all();
    queue.stop_all();
    assert!(queue.is_idle());
    assert_eq!(queue.pending_len(), 0);

    queue.enqueue("first sentence");
    queue.enqueue("second sentence");
    queue.stop_all();
    queue.stop_all();
    assert!(queue.is_idle());
    assert_eq!(queue.pending_len(), 0);
    drain(&queue).await;
}

/// Audio fetched after a stop never plays
#[tokio::test(start_paused = true)]
async fn test_no_playback_after_stop() {
    let player = RecordingPlayer::new(10);
    let synth = ScriptedSynth::new().with("too late", 100, Ok(()));
    let (queue, _) = queue_with(synth, &player);
    let mut events = queue.subscribe();

    queue.enqueue("too late");
    queue.stop_all();

    sleep(Duration::from_secs(1)).await;

    assert!(player.started().is_empty());
    assert!(queue.is_idle());
    assert_eq!(
        collect_events(&mut events),
        vec![SpeechEvent::Stopped { discarded: 1 }]
    );
}

/// A stop that lands while the head fetch is in flight
#[tokio::test(start_paused = true)]
async fn test_stop_while_fetching() {
    let player = RecordingPlayer::new(10);
    let synth = ScriptedSynth::new()
        .with("first", 10, Ok(()))
        .with("slow second", 500, Ok(()));
    let (queue, _) = queue_with(synth, &player);

    queue.enqueue("first");
    queue.enqueue("slow second");
    sleep(Duration::from_millis(100)).await;
    assert_eq!(player.completed(), vec!["first"]);

    queue.stop_all();
    sleep(Duration::from_secs(1)).await;

    assert_eq!(player.started(), vec!["first"]);
    assert!(queue.is_idle());
}

#[tokio::test(start_paused = true)]
async fn test_stop_during_playback() {
    let player = RecordingPlayer::new(1_000);
    let synth = ScriptedSynth::new()
        .with("playing", 10, Ok(()))
        .with("waiting", 10, Ok(()));
    let (queue, _) = queue_with(synth, &player);
    let mut events = queue.subscribe();

    queue.enqueue("playing");
    queue.enqueue("waiting");

    timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(SpeechEvent::Started { index: 0, .. }) = events.recv().await {
                break;
            }
        }
    })
    .await
    .expect("first sentence should start");

    queue.stop_all();
    sleep(Duration::from_secs(3)).await;

    assert_eq!(player.started(), vec!["playing"]);
    assert!(player.completed().is_empty());
    assert_eq!(player.active.load(Ordering::SeqCst), 0);
    assert!(queue.is_idle());
}

#[tokio::test(start_paused = true)]
async fn test_queue_usable_after_stop() {
    let player = RecordingPlayer::new(10);
    let synth = ScriptedSynth::new()
        .with("discarded", 100, Ok(()))
        .with("kept", 10, Ok(()));
    let (queue, _) = queue_with(synth, &player);

    queue.enqueue("discarded");
    queue.stop_all();
    queue.enqueue("kept");
    drain(&queue).await;

    assert_eq!(player.started(), vec!["kept"]);
}

/// Without credentials the queue is a no-op
#[tokio::test(start_paused = true)]
async fn test_unconfigured_synthesizer_is_noop() {
    let player = RecordingPlayer::new(10);
    let (queue, synth) = queue_with(ScriptedSynth::new().unconfigured(), &player);

    assert!(!queue.is_enabled());
    queue.enqueue("Hello there friend.");
    assert_eq!(queue.pending_len(), 0);
    assert!(queue.is_idle());

    sleep(Duration::from_millis(100)).await;
    assert_eq!(synth.calls.load(Ordering::SeqCst), 0);
    assert!(player.started().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_blank_sentences_are_ignored() {
    let player = RecordingPlayer::new(10);
    let (queue, synth) = queue_with(ScriptedSynth::new(), &player);

    queue.enqueue("   ");
    assert!(queue.is_idle());
    sleep(Duration::from_millis(50)).await;
    assert_eq!(synth.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_playback_failure_does_not_halt_queue() {
    struct FlakyPlayer {
        played: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl AudioPlayer for FlakyPlayer {
        async fn play(&self, audio: AudioPayload, _cancel: CancellationToken) -> PlaybackOutcome {
            let text = String::from_utf8_lossy(&audio.data).into_owned();
            if text == "bad" {
                return PlaybackOutcome::Failed("decoder error".to_string());
            }
            self.played.lock().push(text);
            PlaybackOutcome::Completed
        }
    }

    let player = Arc::new(FlakyPlayer {
        played: Mutex::new(Vec::new()),
    });
    let queue = SpeechQueue::new(Arc::new(ScriptedSynth::new()), player.clone());
    let mut events = queue.subscribe();

    queue.enqueue("bad");
    queue.enqueue("good");
    drain(&queue).await;

    assert_eq!(*player.played.lock(), vec!["good".to_string()]);
    assert!(collect_events(&mut events).contains(&SpeechEvent::PlaybackFailed {
        index: 0,
        reason: "decoder error".to_string()
    }));
}

#[tokio::test(start_paused = true)]
async fn test_independent_queues() {
    let player_a = RecordingPlayer::new(10);
    let player_b = RecordingPlayer::new(10);
    let (queue_a, _) = queue_with(ScriptedSynth::new(), &player_a);
    let (queue_b, _) = queue_with(ScriptedSynth::new(), &player_b);

    queue_a.enqueue("for a");
    queue_b.enqueue("for b");
    queue_a.stop_all();
    drain(&queue_b).await;

    assert!(player_a.started().is_empty());
    assert_eq!(player_b.started(), vec!["for b"]);
}

/// Synthesizer that answers immediately
struct InstantSynth;

#[async_trait]
impl SpeechSynthesizer for InstantSynth {
    async fn synthesize(
        &self,
        text: &str,
        _cancel: &CancellationToken,
    ) -> Result<AudioPayload, Skipped> {
        Ok(AudioPayload::mpeg(text.as_bytes().to_vec()))
    }

    fn name(&self) -> &str {
        "instant"
    }
}

fn started_since(rx: &mut broadcast::Receiver<SpeechEvent>) -> Vec<u64> {
    let mut started = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(SpeechEvent::Started { index, .. }) => started.push(index),
            Ok(_) | Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(_) => return started,
        }
    }
}

/// Stops racing a resolved fetch on another worker never start playback late
///
/// `Started` is published under the queue lock, so everything emitted before
/// `stop_all` returns is already in the channel when it returns.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stop_racing_resolved_fetch_never_starts_playback() {
    let player = RecordingPlayer::new(1);
    let queue = SpeechQueue::new(Arc::new(InstantSynth), player.clone());
    let mut events = queue.subscribe();

    for round in 0..200u32 {
        queue.enqueue(format!("Sentence number {}.", round));
        for _ in 0..(round % 7) {
            tokio::task::yield_now().await;
        }
        queue.stop_all();
        started_since(&mut events);

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(
            started_since(&mut events),
            Vec::<u64>::new(),
            "playback started after stop in round {}",
            round
        );
    }

    assert!(queue.is_idle());
    assert!(player.max_active.load(Ordering::SeqCst) <= 1);
}
