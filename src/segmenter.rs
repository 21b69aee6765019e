//! Utterance segmentation over a live frame stream.
//!
//! The segmenter consumes fixed-size PCM frames from the capture queue and
//! emits complete utterance byte buffers. Two modes exist, selected by
//! configuration only:
//!
//! - VAD mode: an Idle/Speaking state machine over per-frame RMS energy,
//!   with a pre-speech ring buffer so onset is not truncated, a silence
//!   timeout to close utterances, and bounds that discard noise blips and
//!   force-close runaway segments.
//! - Continuous mode: fixed-duration windows with overlap carry-over,
//!   emitted unconditionally. Predictable latency, no boundary precision.
//!
//! All buffers are cleared on `clear()` so a stopped capture session never
//! leaks partial audio into the next one.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use tracing::{debug, trace, warn};

use crate::capture::Frame;
use crate::config::Config;
use crate::samples::{SAMPLE_RATE, frame_rms};

/// How long one queue poll may block before the stall guard runs.
const POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Ceiling on a single utterance; continuous non-silent noise force-closes here.
const MAX_SEGMENT_MS: usize = 10_000;

/// Segmentation strategy, fixed for the lifetime of a capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentMode {
    Vad,
    Continuous,
}

/// Frame-count and duration bounds derived from [`Config`] once, so the hot
/// loop never recomputes them.
#[derive(Debug, Clone)]
pub struct SegmenterSettings {
    pub mode: SegmentMode,
    pub frame_size_bytes: usize,
    pub speech_threshold: f64,
    pub min_speech_frames: usize,
    pub silence_timeout_frames: usize,
    pub max_segment_frames: usize,
    pub pre_speech_window_frames: usize,
    pub min_gap: Duration,
    /// Stall guard: an in-flight utterance older than min speech plus the
    /// silence timeout is force-closed when the queue stops yielding frames.
    pub stall_close_after: Duration,
    pub continuous_segment_frames: usize,
    pub continuous_overlap_frames: usize,
}

impl SegmenterSettings {
    pub fn from_config(config: &Config) -> Self {
        let frame_ms = config.frame_size_ms.max(1) as usize;
        let frames_of = |ms: usize| ms / frame_ms;

        Self {
            mode: if config.continuous_mode {
                SegmentMode::Continuous
            } else {
                SegmentMode::Vad
            },
            frame_size_bytes: SAMPLE_RATE as usize / 1000 * frame_ms * 2,
            speech_threshold: config.speech_threshold,
            min_speech_frames: frames_of(config.min_speech_ms as usize).max(1),
            silence_timeout_frames: frames_of(config.silence_timeout_ms as usize).max(1),
            max_segment_frames: frames_of(MAX_SEGMENT_MS),
            pre_speech_window_frames: frames_of(config.pre_speech_window_ms as usize),
            min_gap: Duration::from_millis(config.min_gap_between_utterances_ms),
            stall_close_after: Duration::from_millis(
                (config.min_speech_ms + config.silence_timeout_ms) as u64,
            ),
            continuous_segment_frames: frames_of(config.continuous_segment_ms as usize).max(1),
            continuous_overlap_frames: frames_of(config.continuous_overlap_ms as usize),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VadState {
    Idle,
    Speaking,
}

/// Turns the frame stream into bounded utterance buffers.
///
/// Owned by the consumer thread; the only shared state is the frame channel
/// itself.
pub struct UtteranceSegmenter {
    frames: Receiver<Frame>,
    settings: SegmenterSettings,

    /// Recent silent frames, copied in, oldest evicted at capacity.
    pre_speech: VecDeque<Frame>,
    /// End time of the last emitted utterance, for the inter-utterance gap.
    last_utterance_end: Option<Instant>,
    /// Trailing frames of the last continuous window, replayed at the head
    /// of the next one.
    overlap_carry: Vec<Frame>,
}

impl UtteranceSegmenter {
    pub fn new(frames: Receiver<Frame>, settings: SegmenterSettings) -> Self {
        Self {
            frames,
            settings,
            pre_speech: VecDeque::new(),
            last_utterance_end: None,
            overlap_carry: Vec::new(),
        }
    }

    /// Read the next complete segment, blocking until one is available.
    ///
    /// Returns `None` once the frame channel disconnects (capture stopped)
    /// and any in-flight audio has been flushed or discarded.
    pub fn next_utterance(&mut self) -> Option<Vec<u8>> {
        match self.settings.mode {
            SegmentMode::Vad => self.read_vad_utterance(),
            SegmentMode::Continuous => self.read_continuous_window(),
        }
    }

    /// Drop all buffered audio. Called when a capture session ends so the
    /// next session starts clean.
    pub fn clear(&mut self) {
        self.pre_speech.clear();
        self.overlap_carry.clear();
        self.last_utterance_end = None;
    }

    fn read_vad_utterance(&mut self) -> Option<Vec<u8>> {
        let mut utterance: Vec<u8> = Vec::new();
        let mut state = VadState::Idle;
        let mut total_frames = 0usize;
        let mut consecutive_silence = 0usize;
        let mut segment_start = Instant::now();

        loop {
            let frame = match self.frames.recv_timeout(POLL_TIMEOUT) {
                Ok(frame) => frame,
                Err(RecvTimeoutError::Timeout) => {
                    // Capture stalled mid-utterance: close it as if silence
                    // had been observed, rather than holding audio forever.
                    if state == VadState::Speaking
                        && segment_start.elapsed() > self.settings.stall_close_after
                    {
                        warn!("frame queue stalled, force-closing utterance");
                        self.last_utterance_end = Some(Instant::now());
                        return Some(utterance);
                    }
                    continue;
                }
                Err(RecvTimeoutError::Disconnected) => {
                    if state == VadState::Speaking && total_frames >= self.settings.min_speech_frames
                    {
                        self.last_utterance_end = Some(Instant::now());
                        return Some(utterance);
                    }
                    return None;
                }
            };

            let energy = frame_rms(&frame);
            let is_speech = energy > self.settings.speech_threshold;

            match state {
                VadState::Idle if is_speech => {
                    let gap_ok = match self.last_utterance_end {
                        Some(end) => end.elapsed() >= self.settings.min_gap,
                        None => true,
                    };
                    if !gap_ok {
                        // Trailing echo of the previous utterance; drop it.
                        trace!(energy, "speech inside inter-utterance gap, ignored");
                        continue;
                    }

                    debug!(energy, "speech onset");
                    state = VadState::Speaking;
                    segment_start = Instant::now();
                    consecutive_silence = 0;

                    // Prepend buffered pre-speech so onset is not clipped.
                    for buffered in self.pre_speech.drain(..) {
                        utterance.extend_from_slice(&buffered);
                        total_frames += 1;
                    }
                    utterance.extend_from_slice(&frame);
                    total_frames += 1;
                }
                VadState::Idle => {
                    if self.settings.pre_speech_window_frames > 0 {
                        if self.pre_speech.len() >= self.settings.pre_speech_window_frames {
                            self.pre_speech.pop_front();
                        }
                        self.pre_speech.push_back(frame);
                    }
                }
                VadState::Speaking => {
                    // Every frame, speech or silence, belongs to the utterance.
                    utterance.extend_from_slice(&frame);
                    total_frames += 1;

                    if is_speech {
                        consecutive_silence = 0;
                    } else {
                        consecutive_silence += 1;
                        if consecutive_silence >= self.settings.silence_timeout_frames {
                            if total_frames >= self.settings.min_speech_frames {
                                debug!(total_frames, "utterance closed by silence timeout");
                                self.last_utterance_end = Some(Instant::now());
                                return Some(utterance);
                            }

                            // Too short to be speech; treat as noise.
                            trace!(total_frames, "segment below minimum speech, discarded");
                            utterance.clear();
                            state = VadState::Idle;
                            total_frames = 0;
                            consecutive_silence = 0;
                        }
                    }
                }
            }

            if state == VadState::Speaking && total_frames >= self.settings.max_segment_frames {
                warn!(total_frames, "utterance hit max segment size, force-closing");
                self.last_utterance_end = Some(Instant::now());
                return Some(utterance);
            }
        }
    }

    fn read_continuous_window(&mut self) -> Option<Vec<u8>> {
        let target = self.settings.continuous_segment_frames;
        let mut window: Vec<Frame> = std::mem::take(&mut self.overlap_carry);
        let started = Instant::now();

        // One extra second of slack beyond the nominal window duration
        // before giving up on a stalled queue.
        let deadline = Duration::from_millis(
            (target * self.settings.frame_size_bytes / 2 * 1000 / SAMPLE_RATE as usize) as u64,
        ) + Duration::from_secs(1);

        let carried = window.len();
        while window.len() < target {
            match self.frames.recv_timeout(POLL_TIMEOUT) {
                Ok(frame) => window.push(frame),
                Err(RecvTimeoutError::Timeout) => {
                    if started.elapsed() > deadline {
                        debug!(collected = window.len(), "continuous window timed out");
                        break;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        // Nothing new arrived: either the stream is empty or it ended and
        // only the replayed overlap remains. Don't re-emit stale audio.
        if window.len() == carried {
            return None;
        }

        // Seed the next window with the trailing overlap.
        let overlap = self.settings.continuous_overlap_frames.min(window.len());
        self.overlap_carry = window[window.len() - overlap..].to_vec();

        let bytes: Vec<u8> = window.into_iter().flatten().collect();
        trace!(len = bytes.len(), "continuous window emitted");
        Some(bytes)
    }
}
