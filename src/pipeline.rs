//! End-to-end detection pipeline.
//!
//! This is the context object the rest of the crate plugs into: construct it
//! once at startup and pass handles where they are needed — there are no
//! ambient globals. It wires capture → segmentation → recognition →
//! detection → punishment and owns the threads involved:
//!
//! - the capture thread (device I/O, blocking push into the frame queue)
//! - the consumer thread (segmentation plus the synchronous recognizer call,
//!   which may take hundreds of milliseconds and blocks only this thread)
//! - the tick driver, which is *external*: the host simulation calls
//!   [`TickScheduler::tick`] through the shared scheduler handle.
//!
//! `shutdown()` stops capture, joins both owned threads with bounded
//! timeouts, and clears every buffer so no partial audio or pending task
//! leaks into a later session.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use tracing::{debug, info};

use crate::capture::{Frame, FrameCapture, join_with_timeout};
use crate::config::Config;
use crate::detector::PhraseDetector;
use crate::gate::ActorId;
use crate::punishment::{PunishmentDispatcher, PunishmentSink};
use crate::recognizer::{Recognizer, transcribe_utterance};
use crate::scheduler::TickScheduler;
use crate::segmenter::{SegmenterSettings, UtteranceSegmenter};

/// How long `shutdown()` waits for the consumer thread. The bound covers a
/// recognizer call already in flight.
const CONSUMER_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// A running detection pipeline for one actor's audio stream.
pub struct DetectionPipeline {
    capture: Option<FrameCapture>,
    consumer: Option<JoinHandle<()>>,
    scheduler: Arc<TickScheduler>,
    detector: Arc<PhraseDetector>,
}

impl DetectionPipeline {
    /// Open the default microphone and start detecting for `actor`.
    pub fn start(
        config: &Config,
        actor: ActorId,
        recognizer: Box<dyn Recognizer>,
        sink: Arc<dyn PunishmentSink>,
    ) -> crate::Result<Self> {
        let settings = SegmenterSettings::from_config(config);
        let (capture, frames) = FrameCapture::start(settings.frame_size_bytes)?;
        let mut pipeline = Self::start_with_frames(config, frames, actor, recognizer, sink)?;
        pipeline.capture = Some(capture);
        Ok(pipeline)
    }

    /// Start detecting over an externally produced frame stream (a WAV file,
    /// a test harness, a remote feed). The pipeline ends when the sender side
    /// of `frames` disconnects.
    pub fn start_with_frames(
        config: &Config,
        frames: Receiver<Frame>,
        actor: ActorId,
        mut recognizer: Box<dyn Recognizer>,
        sink: Arc<dyn PunishmentSink>,
    ) -> crate::Result<Self> {
        let scheduler = Arc::new(TickScheduler::new(config.ticks_per_second));
        let detector = Arc::new(PhraseDetector::from_config(config));
        let dispatcher = PunishmentDispatcher::new(sink, Arc::clone(&scheduler), config);

        let settings = SegmenterSettings::from_config(config);
        let consumer_detector = Arc::clone(&detector);

        let consumer = std::thread::Builder::new()
            .name("watchword-consumer".into())
            .spawn(move || {
                let mut segmenter = UtteranceSegmenter::new(frames, settings);

                while let Some(utterance) = segmenter.next_utterance() {
                    debug!(bytes = utterance.len(), "utterance ready");

                    let Some(transcript) =
                        transcribe_utterance(recognizer.as_mut(), &utterance)
                    else {
                        continue;
                    };
                    debug!(%transcript, "transcript ready");

                    if let Some(detection) =
                        consumer_detector.check(actor, &transcript, Instant::now())
                    {
                        dispatcher.dispatch(&detection);
                    }
                }

                segmenter.clear();
                debug!("consumer thread exiting");
            })
            .map_err(|err| crate::Error::msg(format!("failed to spawn consumer thread: {err}")))?;

        info!(%actor, "detection pipeline started");
        Ok(Self {
            capture: None,
            consumer: Some(consumer),
            scheduler,
            detector,
        })
    }

    /// Shared scheduler handle for the external tick driver.
    pub fn scheduler(&self) -> Arc<TickScheduler> {
        Arc::clone(&self.scheduler)
    }

    /// Shared detector handle, e.g. for diagnostics.
    pub fn detector(&self) -> Arc<PhraseDetector> {
        Arc::clone(&self.detector)
    }

    /// True while the consumer thread is still processing.
    pub fn is_running(&self) -> bool {
        self.consumer
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Block until the frame stream ends and the consumer drains. Intended
    /// for offline inputs; a live microphone stream never ends on its own.
    pub fn wait(&mut self) {
        if let Some(consumer) = self.consumer.take() {
            let _ = consumer.join();
        }
    }

    /// Stop capture, join worker threads with bounded timeouts, and clear
    /// all pending state.
    pub fn shutdown(&mut self) {
        if let Some(mut capture) = self.capture.take() {
            capture.stop();
        }
        if let Some(consumer) = self.consumer.take() {
            join_with_timeout(consumer, CONSUMER_JOIN_TIMEOUT, "consumer");
        }
        self.scheduler.clear();
        info!("detection pipeline stopped");
    }
}

impl Drop for DetectionPipeline {
    fn drop(&mut self) {
        if self.capture.is_some() || self.consumer.is_some() {
            self.shutdown();
        }
    }
}
