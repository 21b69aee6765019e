//! PCM byte buffers → normalized recognizer input.
//!
//! Utterances arrive as 16-bit signed little-endian mono PCM at 16 kHz. The
//! recognizer wants `f32` in `[-1.0, 1.0]`, and only inside a duration band
//! it can do useful work on; everything outside that band is settled here so
//! the recognizer boundary stays a plain samples-in/text-out call.

/// Capture sample rate, fixed across the pipeline.
pub const SAMPLE_RATE: u32 = 16_000;

/// Below 100 ms there is nothing to recognize.
const MIN_SAMPLES: usize = 1_600;
/// Below ~0.3 s recognition is skipped outright and treated as silence.
const SKIP_SAMPLES: usize = 4_800;
/// Audio under one second is padded to this minimum-viable window (1.01 s).
const PAD_TO_SAMPLES: usize = 16_160;
/// Audio over five seconds is truncated to bound recognizer latency.
const MAX_SAMPLES: usize = 80_000;

/// Outcome of preparing an utterance for recognition.
#[derive(Debug, PartialEq)]
pub enum PreparedAudio {
    /// Under 100 ms; reject without involving the recognizer.
    TooShort,
    /// Under ~0.3 s; cheap early exit, behaves as an empty transcript.
    SkippedQuiet,
    /// Padded/truncated samples the recognizer should be called with.
    Ready(Vec<f32>),
}

/// Decode 16-bit little-endian PCM into normalized `f32` samples.
///
/// A trailing odd byte (half a sample) is ignored.
pub fn bytes_to_samples(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32_768.0)
        .collect()
}

/// Apply the recognition-window policy to an utterance's samples.
///
/// - `< 100 ms`: [`PreparedAudio::TooShort`]
/// - `< ~0.3 s`: [`PreparedAudio::SkippedQuiet`]
/// - `< 1.0 s`: zero-padded to 16 160 samples
/// - `> 5.0 s`: truncated to the first 80 000 samples
pub fn prepare_for_recognition(mut samples: Vec<f32>) -> PreparedAudio {
    if samples.len() < MIN_SAMPLES {
        return PreparedAudio::TooShort;
    }
    if samples.len() < SKIP_SAMPLES {
        return PreparedAudio::SkippedQuiet;
    }

    if samples.len() > MAX_SAMPLES {
        samples.truncate(MAX_SAMPLES);
    } else if samples.len() < PAD_TO_SAMPLES {
        samples.resize(PAD_TO_SAMPLES, 0.0);
    }

    PreparedAudio::Ready(samples)
}

/// RMS energy of a PCM16LE frame, normalized to `[0.0, 1.0]`.
///
/// Used as the loudness proxy for speech detection.
pub fn frame_rms(frame: &[u8]) -> f64 {
    let sample_count = frame.len() / 2;
    if sample_count == 0 {
        return 0.0;
    }

    let sum_of_squares: i64 = frame
        .chunks_exact(2)
        .map(|pair| {
            let s = i16::from_le_bytes([pair[0], pair[1]]) as i64;
            s * s
        })
        .sum();

    (sum_of_squares as f64 / sample_count as f64).sqrt() / 32_768.0
}
