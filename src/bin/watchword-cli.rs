use std::fs::File;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use uuid::Uuid;

use watchword::config::Config;
use watchword::gate::ActorId;
use watchword::pipeline::DetectionPipeline;
use watchword::punishment::PunishmentSink;
use watchword::segmenter::SegmenterSettings;
use watchword::wav::send_wav_frames;
use watchword::whisper::WhisperRecognizer;

#[derive(Parser, Debug)]
#[command(name = "watchword")]
#[command(about = "Live banned-phrase detection from a microphone or WAV file")]
struct Params {
    /// Config file; created with defaults when missing.
    #[arg(short = 'c', long = "config", default_value = "watchword.json")]
    pub config_path: String,

    /// Override the Whisper model path from the config.
    #[arg(short = 'm', long = "model")]
    pub model_path: Option<String>,

    /// Detect over a mono 16 kHz WAV file instead of the microphone.
    #[arg(short = 'a', long = "audio")]
    pub audio_path: Option<String>,

    /// Stop after this many seconds of live capture (runs until killed
    /// when omitted). Ignored for WAV input, which ends on its own.
    #[arg(short = 'd', long = "duration-secs")]
    pub duration_secs: Option<u64>,
}

/// Prints every sink call; the host-environment stand-in for a CLI run.
struct StdoutSink;

impl PunishmentSink for StdoutSink {
    fn broadcast(&self, actor: ActorId, phrase: &str) {
        println!("[watchword] {actor} said a banned phrase: {phrase}");
    }

    fn play_cue(&self, actor: ActorId, clip_id: &str) {
        println!("[watchword] playing cue '{clip_id}' for {actor}");
    }

    fn apply_effect(&self, actor: ActorId, phrase: &str) {
        println!("[watchword] effect applied to {actor} (phrase: {phrase})");
    }
}

fn main() -> Result<()> {
    let params = Params::parse();

    let mut config = Config::load(&params.config_path)?;
    if let Some(model_path) = &params.model_path {
        config.whisper_model_path = model_path.clone();
    }
    watchword::logging::init_with_default(&config.log_level);

    let recognizer = WhisperRecognizer::from_config(&config)?;
    let sink = Arc::new(StdoutSink);
    let actor = Uuid::new_v4();

    let mut feeder = None;
    let mut pipeline = match &params.audio_path {
        Some(audio_path) => {
            let file = File::open(audio_path)
                .with_context(|| format!("failed to open audio file '{audio_path}'"))?;
            let frame_size_bytes = SegmenterSettings::from_config(&config).frame_size_bytes;

            // Feed the recording through the same frame channel the mic uses.
            let (tx, rx) = crossbeam_channel::bounded(500);
            feeder = Some(std::thread::spawn(move || {
                send_wav_frames(file, frame_size_bytes, &tx)
            }));

            DetectionPipeline::start_with_frames(&config, rx, actor, Box::new(recognizer), sink)?
        }
        None => DetectionPipeline::start(&config, actor, Box::new(recognizer), sink)?,
    };

    // Stand-in for the host simulation's tick loop.
    let scheduler = pipeline.scheduler();
    let ms_per_tick = scheduler.ms_per_tick();
    let ticking = Arc::new(AtomicBool::new(true));
    let tick_driver = {
        let scheduler = Arc::clone(&scheduler);
        let ticking = Arc::clone(&ticking);
        std::thread::spawn(move || {
            while ticking.load(Ordering::Relaxed) {
                scheduler.tick();
                std::thread::sleep(Duration::from_millis(ms_per_tick));
            }
        })
    };

    if let Some(feeder) = feeder {
        // The stream ends with the file; drain the consumer, then let any
        // scheduled effects fire before exiting.
        feeder
            .join()
            .map_err(|_| anyhow::anyhow!("WAV feeder thread panicked"))??;
        pipeline.wait();
        while scheduler.pending_tasks() > 0 {
            std::thread::sleep(Duration::from_millis(ms_per_tick));
        }
    } else {
        match params.duration_secs {
            Some(secs) => std::thread::sleep(Duration::from_secs(secs)),
            None => {
                while pipeline.is_running() {
                    std::thread::sleep(Duration::from_millis(250));
                }
            }
        }
    }

    ticking.store(false, Ordering::Relaxed);
    let _ = tick_driver.join();
    pipeline.shutdown();
    Ok(())
}
