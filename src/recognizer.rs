//! The speech-recognition boundary.
//!
//! Recognition is an external collaborator: the pipeline hands it normalized
//! samples and gets text back, or nothing. Failure is a value here — a
//! recognizer that errors produces "no transcript this cycle", never a
//! pipeline-halting condition, so errors from a native engine stay contained
//! at this seam.

use anyhow::Result;
use tracing::{debug, warn};

use crate::samples::{PreparedAudio, bytes_to_samples, prepare_for_recognition};

/// Turns normalized mono 16 kHz samples into text.
///
/// Implementations must tolerate being called from a single dedicated
/// consumer thread; they are not required to be `Sync`.
pub trait Recognizer: Send {
    /// Transcribe `samples`. `Ok(None)` means the audio produced no usable
    /// text; `Err` is treated identically by callers and only adds a log.
    fn transcribe(&mut self, samples: &[f32]) -> Result<Option<String>>;
}

/// Apply the recognition-window policy to a raw utterance and run the
/// recognizer on it.
///
/// Returns `None` when there is nothing to scan: audio too short, skipped,
/// recognizer failure, or an empty transcript.
pub fn transcribe_utterance(
    recognizer: &mut dyn Recognizer,
    utterance: &[u8],
) -> Option<String> {
    let samples = bytes_to_samples(utterance);

    let prepared = match prepare_for_recognition(samples) {
        PreparedAudio::TooShort => {
            debug!(bytes = utterance.len(), "utterance too short to recognize");
            return None;
        }
        PreparedAudio::SkippedQuiet => {
            debug!(bytes = utterance.len(), "utterance below skip threshold");
            return None;
        }
        PreparedAudio::Ready(samples) => samples,
    };

    match recognizer.transcribe(&prepared) {
        Ok(Some(text)) => {
            let text = text.trim().to_owned();
            if text.is_empty() { None } else { Some(text) }
        }
        Ok(None) => None,
        Err(err) => {
            warn!(%err, "recognizer failed, treating as empty transcript");
            None
        }
    }
}
