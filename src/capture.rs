//! Live microphone capture.
//!
//! One input device is opened at the pipeline's fixed format (mono, 16-bit,
//! 16 kHz) and its callback chops incoming PCM into fixed-duration frames,
//! pushed onto a bounded queue. A full queue blocks the producer rather than
//! dropping frames: memory stays bounded and a slow consumer is tolerated,
//! at the cost of capture overruns under sustained backlog.
//!
//! The device stream lives on a dedicated thread (cpal streams are not
//! `Send` on every host) which parks until `stop()` signals it. Device
//! unavailability is reported once from `start()`; there is no internal
//! retry.

use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use cpal::SampleFormat;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender, bounded};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::samples::SAMPLE_RATE;

/// One fixed-duration slice of mono 16-bit little-endian PCM.
pub type Frame = Vec<u8>;

/// Bounded frame queue capacity. At 20 ms frames this is ten seconds of
/// backlog before backpressure kicks in.
const FRAME_QUEUE_CAPACITY: usize = 500;

/// How long `stop()` waits for the capture thread before detaching it.
const JOIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Handle to a running capture session.
///
/// Dropping the handle stops capture; `stop()` does the same explicitly and
/// waits for the thread to wind down.
pub struct FrameCapture {
    stop_tx: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl FrameCapture {
    /// Open the default input device and start producing `frame_size_bytes`
    /// frames into the returned receiver.
    ///
    /// Fails fast when no device exists or the fixed format is unsupported.
    pub fn start(frame_size_bytes: usize) -> Result<(Self, Receiver<Frame>)> {
        let (frame_tx, frame_rx) = bounded::<Frame>(FRAME_QUEUE_CAPACITY);
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let (ready_tx, ready_rx) = bounded::<Result<()>>(1);

        let thread = std::thread::Builder::new()
            .name("watchword-capture".into())
            .spawn(move || {
                // The stream must be built and dropped on this thread.
                let stream = match build_input_stream(frame_tx, frame_size_bytes) {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(()));
                        stream
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };

                if let Err(err) = stream.play() {
                    warn!(%err, "failed to start input stream");
                    return;
                }

                // Park until stop() signals or the handle is dropped.
                let _ = stop_rx.recv();
                drop(stream);
                debug!("capture thread exiting");
            })
            .map_err(|err| Error::msg(format!("failed to spawn capture thread: {err}")))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                let _ = thread.join();
                return Err(err);
            }
            Err(_) => {
                let _ = thread.join();
                return Err(Error::CaptureUnavailable(
                    "capture thread exited during startup".into(),
                ));
            }
        }

        info!(frame_size_bytes, "microphone capture started");
        Ok((
            Self {
                stop_tx: Some(stop_tx),
                thread: Some(thread),
            },
            frame_rx,
        ))
    }

    /// Signal the capture thread and join it with a bounded timeout.
    pub fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            join_with_timeout(thread, JOIN_TIMEOUT, "capture");
        }
        info!("microphone capture stopped");
    }
}

impl Drop for FrameCapture {
    fn drop(&mut self) {
        if self.stop_tx.is_some() || self.thread.is_some() {
            self.stop();
        }
    }
}

/// Join `handle`, giving up (and detaching the thread) after `timeout`.
pub(crate) fn join_with_timeout(handle: JoinHandle<()>, timeout: Duration, name: &str) {
    let deadline = Instant::now() + timeout;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            warn!(thread = name, "thread did not stop within timeout, detaching");
            return;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    if handle.join().is_err() {
        warn!(thread = name, "thread panicked");
    }
}

fn build_input_stream(frame_tx: Sender<Frame>, frame_size_bytes: usize) -> Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| Error::CaptureUnavailable("no default input device".into()))?;

    let device_name = device.name().unwrap_or_else(|_| "unknown".into());
    info!(device = %device_name, "opening input device");

    let config = cpal::StreamConfig {
        channels: 1,
        sample_rate: cpal::SampleRate(SAMPLE_RATE),
        buffer_size: cpal::BufferSize::Default,
    };

    // The queue owns flow control; the callback only chops and forwards.
    let mut chopper = FrameChopper::new(frame_tx, frame_size_bytes);

    let err_fn = |err| warn!(%err, "input stream error");

    let sample_format = device
        .default_input_config()
        .map_err(|err| Error::CaptureUnavailable(format!("no input config: {err}")))?
        .sample_format();

    let stream = match sample_format {
        SampleFormat::I16 => device.build_input_stream(
            &config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| chopper.push_i16(data),
            err_fn,
            None,
        ),
        SampleFormat::F32 => device.build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| chopper.push_f32(data),
            err_fn,
            None,
        ),
        other => {
            return Err(Error::CaptureUnavailable(format!(
                "unsupported input sample format: {other:?}"
            )));
        }
    }
    .map_err(|err| Error::CaptureUnavailable(format!("failed to open input stream: {err}")))?;

    Ok(stream)
}

/// Accumulates callback buffers and emits exact fixed-size frames, in order,
/// never duplicating or splitting a sample across frames.
struct FrameChopper {
    frame_tx: Sender<Frame>,
    frame_size_bytes: usize,
    pending: Vec<u8>,
}

impl FrameChopper {
    fn new(frame_tx: Sender<Frame>, frame_size_bytes: usize) -> Self {
        Self {
            frame_tx,
            frame_size_bytes,
            pending: Vec::with_capacity(frame_size_bytes * 2),
        }
    }

    fn push_i16(&mut self, data: &[i16]) {
        for sample in data {
            self.pending.extend_from_slice(&sample.to_le_bytes());
        }
        self.flush_full_frames();
    }

    fn push_f32(&mut self, data: &[f32]) {
        for sample in data {
            let pcm = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            self.pending.extend_from_slice(&pcm.to_le_bytes());
        }
        self.flush_full_frames();
    }

    fn flush_full_frames(&mut self) {
        while self.pending.len() >= self.frame_size_bytes {
            let rest = self.pending.split_off(self.frame_size_bytes);
            let frame = std::mem::replace(&mut self.pending, rest);
            // Blocking send is the backpressure mechanism; an error only
            // means the consumer is gone and the frame can be dropped.
            if self.frame_tx.send(frame).is_err() {
                self.pending.clear();
                return;
            }
        }
    }
}
