//! Built-in recognizer powered by `whisper-rs` / `whisper.cpp`.
//!
//! Tuned for short live utterances: greedy sampling, no cross-call context,
//! blank suppression. The model is loaded once and reused for every
//! utterance; each call creates a fresh inference state.

use anyhow::{Context, Result};
use tracing::{debug, info};
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::config::Config;
use crate::recognizer::Recognizer;

pub struct WhisperRecognizer {
    ctx: WhisperContext,
    language: String,
    threads: i32,
}

impl WhisperRecognizer {
    /// Load a whisper.cpp model from disk.
    pub fn new(model_path: &str, language: impl Into<String>, threads: usize) -> Result<Self> {
        let ctx_params = WhisperContextParameters::default();
        let ctx = WhisperContext::new_with_params(model_path, ctx_params)
            .with_context(|| format!("failed to load model from path: {model_path}"))?;

        info!(model = model_path, "whisper model loaded");
        Ok(Self {
            ctx,
            language: language.into(),
            threads: threads.max(1) as i32,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            &config.whisper_model_path,
            config.whisper_language.clone(),
            config.whisper_threads,
        )
    }

    fn params(&self) -> FullParams<'_, '_> {
        // Greedy decode: lowest latency, good enough for phrase spotting.
        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        params.set_n_threads(self.threads);
        params.set_language(Some(self.language.as_str()));
        params.set_translate(false);
        params.set_no_context(true);
        params.set_suppress_blank(true);
        params.set_print_progress(false);
        params.set_print_special(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);
        params
    }
}

impl Recognizer for WhisperRecognizer {
    fn transcribe(&mut self, samples: &[f32]) -> Result<Option<String>> {
        let mut state = self
            .ctx
            .create_state()
            .context("failed to create whisper state")?;

        state
            .full(self.params(), samples)
            .context("failed to run whisper full()")?;

        let mut text = String::new();
        for segment in state.as_iter() {
            text.push_str(segment.to_str().context("failed to get segment text")?);
        }

        let text = text.trim().to_owned();
        debug!(chars = text.len(), "transcription complete");
        Ok(if text.is_empty() { None } else { Some(text) })
    }
}
