//! End-to-end pipeline tests over a synthetic frame stream.
//!
//! A scripted recognizer stands in for Whisper so these run without models
//! or audio hardware; everything else — segmentation, conversion policy,
//! matching, grace gating, tick-scheduled dispatch — is the real pipeline.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use uuid::Uuid;

use watchword::capture::Frame;
use watchword::config::Config;
use watchword::pipeline::DetectionPipeline;
use watchword::punishment::PunishmentSink;
use watchword::recognizer::Recognizer;

/// Returns one scripted transcript per recognized utterance, in order.
struct ScriptedRecognizer {
    transcripts: Mutex<VecDeque<String>>,
}

impl ScriptedRecognizer {
    fn new(transcripts: &[&str]) -> Box<Self> {
        Box::new(Self {
            transcripts: Mutex::new(transcripts.iter().map(|s| s.to_string()).collect()),
        })
    }
}

impl Recognizer for ScriptedRecognizer {
    fn transcribe(&mut self, _samples: &[f32]) -> Result<Option<String>> {
        Ok(self.transcripts.lock().pop_front())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Event {
    Broadcast(String),
    Cue(String),
    Effect(String),
}

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<Event>>,
}

impl RecordingSink {
    fn snapshot(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    /// Poll until `predicate` holds or two seconds pass.
    fn wait_for(&self, predicate: impl Fn(&[Event]) -> bool) -> Vec<Event> {
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            let events = self.snapshot();
            if predicate(&events) || Instant::now() >= deadline {
                return events;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }
}

impl PunishmentSink for RecordingSink {
    fn broadcast(&self, _actor: Uuid, phrase: &str) {
        self.events.lock().push(Event::Broadcast(phrase.into()));
    }

    fn play_cue(&self, _actor: Uuid, clip_id: &str) {
        self.events.lock().push(Event::Cue(clip_id.into()));
    }

    fn apply_effect(&self, _actor: Uuid, phrase: &str) {
        self.events.lock().push(Event::Effect(phrase.into()));
    }
}

/// Tight VAD bounds so tests need little synthetic audio: 20 ms frames,
/// 3-frame minimum speech, 4-frame silence timeout, no inter-utterance gap.
fn test_config() -> Config {
    let mut config = Config::default();
    config.min_speech_ms = 60;
    config.silence_timeout_ms = 80;
    config.pre_speech_window_ms = 100;
    config.min_gap_between_utterances_ms = 0;
    config
}

fn loud_frame() -> Frame {
    (0..320).flat_map(|_| 8_000i16.to_le_bytes()).collect()
}

fn quiet_frame() -> Frame {
    vec![0u8; 640]
}

/// One spoken utterance: enough speech to clear the 0.3 s recognition skip
/// threshold (15 frames = 300 ms), then silence to close it.
fn speak_utterance(tx: &Sender<Frame>) {
    for _ in 0..15 {
        tx.send(loud_frame()).unwrap();
    }
    for _ in 0..4 {
        tx.send(quiet_frame()).unwrap();
    }
}

#[test]
fn detection_flows_from_frames_to_scheduled_effect() {
    let config = test_config();
    let sink = Arc::new(RecordingSink::default());
    let (tx, rx) = crossbeam_channel::bounded(500);

    let mut pipeline = DetectionPipeline::start_with_frames(
        &config,
        rx,
        Uuid::new_v4(),
        ScriptedRecognizer::new(&["the lava chicken ran"]),
        Arc::clone(&sink) as Arc<dyn PunishmentSink>,
    )
    .expect("pipeline start");

    speak_utterance(&tx);

    let events = sink.wait_for(|events| events.len() >= 2);
    assert_eq!(events[0], Event::Broadcast("lava chicken".into()));
    assert_eq!(events[1], Event::Cue("da_dog".into()));

    // The effect is tick-deferred: 2000 ms cue at 50 ms/tick = 40 ticks.
    let scheduler = pipeline.scheduler();
    for _ in 0..39 {
        scheduler.tick();
    }
    assert_eq!(sink.snapshot().len(), 2);
    scheduler.tick();
    assert_eq!(sink.snapshot()[2], Event::Effect("lava chicken".into()));

    drop(tx);
    pipeline.wait();
    pipeline.shutdown();
}

#[test]
fn second_detection_within_grace_period_is_suppressed() {
    let config = test_config();
    let sink = Arc::new(RecordingSink::default());
    let (tx, rx) = crossbeam_channel::bounded(500);

    let mut pipeline = DetectionPipeline::start_with_frames(
        &config,
        rx,
        Uuid::new_v4(),
        ScriptedRecognizer::new(&["chicken jockey", "chicken jockey again"]),
        Arc::clone(&sink) as Arc<dyn PunishmentSink>,
    )
    .expect("pipeline start");

    speak_utterance(&tx);
    sink.wait_for(|events| events.len() >= 2);

    // Both utterances transcribe to a banned phrase, but the second lands
    // inside the 5 s grace window.
    speak_utterance(&tx);
    drop(tx);
    pipeline.wait();

    let broadcasts = sink
        .snapshot()
        .iter()
        .filter(|e| matches!(e, Event::Broadcast(_)))
        .count();
    assert_eq!(broadcasts, 1);

    pipeline.shutdown();
}

#[test]
fn clean_transcripts_trigger_nothing() {
    let config = test_config();
    let sink = Arc::new(RecordingSink::default());
    let (tx, rx) = crossbeam_channel::bounded(500);

    let mut pipeline = DetectionPipeline::start_with_frames(
        &config,
        rx,
        Uuid::new_v4(),
        ScriptedRecognizer::new(&["a perfectly innocent sentence"]),
        Arc::clone(&sink) as Arc<dyn PunishmentSink>,
    )
    .expect("pipeline start");

    speak_utterance(&tx);
    drop(tx);
    pipeline.wait();

    assert!(sink.snapshot().is_empty());
    pipeline.shutdown();
}

#[test]
fn too_short_utterances_never_reach_the_recognizer() {
    let mut config = test_config();
    // Allow very short segments through the VAD so the sample-length policy
    // is what rejects them.
    config.min_speech_ms = 20;
    let sink = Arc::new(RecordingSink::default());
    let (tx, rx) = crossbeam_channel::bounded(500);

    let mut pipeline = DetectionPipeline::start_with_frames(
        &config,
        rx,
        Uuid::new_v4(),
        ScriptedRecognizer::new(&["lava chicken"]),
        Arc::clone(&sink) as Arc<dyn PunishmentSink>,
    )
    .expect("pipeline start");

    // 4 loud frames (80 ms) + silence: emitted by the VAD, rejected by the
    // recognition-window policy.
    for _ in 0..4 {
        tx.send(loud_frame()).unwrap();
    }
    for _ in 0..4 {
        tx.send(quiet_frame()).unwrap();
    }
    drop(tx);
    pipeline.wait();

    assert!(sink.snapshot().is_empty());
    pipeline.shutdown();
}

#[test]
fn shutdown_clears_pending_scheduled_effects() {
    let config = test_config();
    let sink = Arc::new(RecordingSink::default());
    let (tx, rx) = crossbeam_channel::bounded(500);

    let mut pipeline = DetectionPipeline::start_with_frames(
        &config,
        rx,
        Uuid::new_v4(),
        ScriptedRecognizer::new(&["i am steve"]),
        Arc::clone(&sink) as Arc<dyn PunishmentSink>,
    )
    .expect("pipeline start");

    speak_utterance(&tx);
    sink.wait_for(|events| events.len() >= 2);

    let scheduler = pipeline.scheduler();
    assert_eq!(scheduler.pending_tasks(), 1);

    drop(tx);
    pipeline.shutdown();
    assert_eq!(scheduler.pending_tasks(), 0);

    // The cleared effect never fires, even if ticks keep coming.
    for _ in 0..80 {
        scheduler.tick();
    }
    assert!(
        !sink
            .snapshot()
            .iter()
            .any(|e| matches!(e, Event::Effect(_)))
    );
}
