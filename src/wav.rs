//! WAV input for offline runs.
//!
//! Feeds a recorded file through the same frame channel the microphone uses,
//! so the segmenter and everything downstream behave identically. Useful for
//! debugging detection settings against a known recording, and for tests.

use std::io::{Read, Seek};

use anyhow::{Context, Result, bail};
use crossbeam_channel::Sender;
use hound::WavReader;

use crate::capture::Frame;
use crate::samples::SAMPLE_RATE;

/// Read WAV audio from a reader and send it as fixed-size PCM frames.
///
/// Format requirements:
/// - Mono (1 channel)
/// - 16-bit integer samples
/// - The pipeline's fixed sample rate
///
/// Enforcing the capture format here keeps the downstream path identical for
/// live and recorded audio. The final partial frame, if any, is dropped.
pub fn send_wav_frames<R>(reader: R, frame_size_bytes: usize, tx: &Sender<Frame>) -> Result<()>
where
    R: Read + Seek,
{
    let mut reader = WavReader::new(reader).context("failed to read WAV data from reader")?;
    let spec = reader.spec();

    if spec.channels != 1 {
        bail!(
            "expected mono WAV (1 channel), got {} channels",
            spec.channels
        );
    }
    if spec.sample_rate != SAMPLE_RATE {
        bail!(
            "expected {} Hz sample rate, got {} Hz",
            SAMPLE_RATE,
            spec.sample_rate
        );
    }
    if spec.bits_per_sample != 16 {
        bail!(
            "expected 16-bit samples, got {}-bit",
            spec.bits_per_sample
        );
    }

    let mut frame = Vec::with_capacity(frame_size_bytes);
    for sample in reader.samples::<i16>() {
        let pcm = sample.context("failed to read WAV sample")?;
        frame.extend_from_slice(&pcm.to_le_bytes());

        if frame.len() >= frame_size_bytes {
            let full = std::mem::replace(&mut frame, Vec::with_capacity(frame_size_bytes));
            if tx.send(full).is_err() {
                // Consumer is gone; nothing left to feed.
                return Ok(());
            }
        }
    }

    Ok(())
}
