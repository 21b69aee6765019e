//! Configuration surface for the detection pipeline.
//!
//! The library never reads ambient global state; a [`Config`] is loaded (or
//! defaulted) once at startup and handed into each component explicitly.
//! `load` creates the file with defaults when it is missing, so a first run
//! leaves an editable config behind.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Everything the detection pipeline can be tuned with.
///
/// Field defaults mirror a conservative live-chat setup: 20 ms analysis
/// frames, 300 ms minimum speech, 500 ms silence timeout, 5 s grace period.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Phrases to detect. Matched case-insensitively as contiguous substrings.
    pub banned_phrases: Vec<String>,

    /// Cooldown applied per actor after an accepted detection.
    pub grace_period_secs: u64,

    /// Audio cue clips the punishment dispatcher may pick from.
    pub audio_clip_ids: Vec<String>,

    /// Clip id -> playback duration in milliseconds. Drives the delay between
    /// the cue and the scheduled effect. Unknown ids fall back to
    /// [`Config::DEFAULT_CLIP_DURATION_MS`].
    pub audio_clip_durations_ms: HashMap<String, u64>,

    /// Simulation tick rate the scheduler is driven at.
    pub ticks_per_second: u32,

    // VAD parameters.
    /// Duration of each analysis frame in milliseconds.
    pub frame_size_ms: u32,
    /// Minimum continuous speech required before a segment counts as an utterance.
    pub min_speech_ms: u32,
    /// RMS energy threshold (0.0-1.0) above which a frame is considered speech.
    pub speech_threshold: f64,
    /// Silence duration after speech that ends an utterance.
    pub silence_timeout_ms: u32,
    /// Recent silent audio retained so speech onset is not truncated.
    pub pre_speech_window_ms: u32,
    /// Minimum gap between utterances; detections inside it are discarded as
    /// trailing echo of the previous utterance.
    pub min_gap_between_utterances_ms: u64,

    // Continuous mode (alternative to VAD, selected by configuration only).
    pub continuous_mode: bool,
    pub continuous_segment_ms: u32,
    pub continuous_overlap_ms: u32,

    // Recognizer tuning.
    pub whisper_model_path: String,
    pub whisper_language: String,
    /// Inference threads. Defaults to half the available cores, minimum 1.
    pub whisper_threads: usize,

    /// Default log directive applied when `WATCHWORD_LOG` is unset.
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            banned_phrases: [
                "crafting table",
                "the nether",
                "flint and steel",
                "lava chicken",
                "slime cube",
                "chicken jockey",
                "i am steve",
                "the villagers",
                "first we mine",
                "then we craft",
                "let's minecraft",
                "i yearned for the mines",
                "i think he's swedish",
                "vaya con dios",
                "do you have little knife",
            ]
            .into_iter()
            .map(str::to_owned)
            .collect(),
            grace_period_secs: 5,
            audio_clip_ids: vec!["da_dog".to_owned()],
            audio_clip_durations_ms: HashMap::from([("da_dog".to_owned(), 2000)]),
            ticks_per_second: 20,
            frame_size_ms: 20,
            min_speech_ms: 300,
            speech_threshold: 0.005,
            silence_timeout_ms: 500,
            pre_speech_window_ms: 300,
            min_gap_between_utterances_ms: 100,
            continuous_mode: false,
            continuous_segment_ms: 2000,
            continuous_overlap_ms: 500,
            whisper_model_path: "ggml-small.en-q8_0.bin".to_owned(),
            whisper_language: "en".to_owned(),
            whisper_threads: (num_cpus::get() / 2).max(1),
            log_level: "info".to_owned(),
        }
    }
}

impl Config {
    /// Fallback cue duration for clip ids missing from the duration table.
    pub const DEFAULT_CLIP_DURATION_MS: u64 = 2000;

    /// Load configuration from `path`, creating it with defaults when absent.
    ///
    /// A malformed file is reported and replaced by defaults rather than
    /// aborting startup; the broken file is left on disk untouched.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!(path = %path.display(), "config file not found, writing defaults");
            let config = Self::default();
            config.save(path)?;
            return Ok(config);
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config from '{}'", path.display()))?;

        match serde_json::from_str::<Self>(&raw) {
            Ok(config) => {
                info!(path = %path.display(), "config loaded");
                Ok(config)
            }
            Err(err) => {
                warn!(path = %path.display(), %err, "config file malformed, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Save the configuration as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let raw = serde_json::to_string_pretty(self).context("failed to serialize config")?;
        fs::write(path, raw)
            .with_context(|| format!("failed to write config to '{}'", path.display()))?;
        Ok(())
    }

    /// Cue duration for `clip_id`, falling back to the default when unknown.
    pub fn clip_duration_ms(&self, clip_id: &str) -> u64 {
        self.audio_clip_durations_ms
            .get(clip_id)
            .copied()
            .unwrap_or(Self::DEFAULT_CLIP_DURATION_MS)
    }

    /// Milliseconds per simulation tick (50 at the default 20 TPS).
    pub fn ms_per_tick(&self) -> u64 {
        1000 / self.ticks_per_second.max(1) as u64
    }
}
