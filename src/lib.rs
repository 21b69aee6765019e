//! `watchword` — live banned-phrase detection over a microphone stream.
//!
//! This crate provides:
//! - Frame capture from an input device into a bounded, backpressured queue
//! - Voice-activity segmentation of the frame stream into utterances
//! - Transcription via a pluggable recognizer (Whisper built in)
//! - Multi-pattern phrase matching (Aho-Corasick) over transcripts
//! - Per-actor grace periods and tick-scheduled punishment dispatch
//!
//! The library is designed around an explicit context object
//! ([`DetectionPipeline`]): everything is constructed at startup and handed
//! down, with no ambient global state. Host-environment side effects live
//! behind the [`PunishmentSink`] trait.

// High-level API (most consumers should start here).
pub mod config;
pub mod pipeline;

// Audio input.
pub mod capture;
pub mod wav;

// Segmentation and sample preparation.
pub mod samples;
pub mod segmenter;

// Recognition boundary and the built-in Whisper implementation.
pub mod recognizer;
pub mod whisper;

// Detection and consequences.
pub mod automaton;
pub mod detector;
pub mod gate;
pub mod punishment;
pub mod scheduler;

// Crate-wide error type.
pub mod error;

// Logging configuration and control.
#[cfg(feature = "logging")]
pub mod logging;

pub use config::Config;
pub use detector::{Detection, PhraseDetector};
pub use error::{Error, Result};
pub use gate::ActorId;
pub use pipeline::DetectionPipeline;
pub use punishment::PunishmentSink;
pub use recognizer::Recognizer;
pub use scheduler::TickScheduler;
