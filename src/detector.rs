//! Transcript scanning with per-actor suppression.
//!
//! Composes the pattern automaton and the grace-period gate: a transcript is
//! scanned only when its actor is outside their grace window, and an accepted
//! detection opens a new window exactly once. The detection itself is a
//! returned value, not shared state.

use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::automaton::PatternAutomaton;
use crate::config::Config;
use crate::gate::{ActorId, GracePeriodGate};

/// An accepted, ungated match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub actor: ActorId,
    /// The first banned phrase found in the transcript.
    pub phrase: String,
}

/// Scans transcripts for banned phrases, one automaton pass per transcript.
pub struct PhraseDetector {
    automaton: PatternAutomaton,
    gate: GracePeriodGate,
}

impl PhraseDetector {
    pub fn new(patterns: &[String], grace: Duration) -> Self {
        let automaton = PatternAutomaton::from_patterns(patterns);
        info!(patterns = automaton.pattern_count(), "phrase detector ready");
        Self {
            automaton,
            gate: GracePeriodGate::new(grace),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.banned_phrases,
            Duration::from_secs(config.grace_period_secs),
        )
    }

    /// Check `transcript` for `actor` at time `now`.
    ///
    /// Returns the first matched phrase when the actor is outside their grace
    /// window and the transcript contains one; records the gate exactly once
    /// in that case. A suppressed actor's transcript is not acted on at all.
    pub fn check(&self, actor: ActorId, transcript: &str, now: Instant) -> Option<Detection> {
        if self.gate.is_suppressed(actor, now) {
            debug!(%actor, "actor in grace period, transcript ignored");
            return None;
        }

        let matches = self.automaton.find_all(transcript);
        let phrase = matches.first()?.to_string();

        self.gate.record(actor, now);
        info!(%actor, %phrase, "banned phrase detected");
        Some(Detection { actor, phrase })
    }

    /// All matches in a transcript, ignoring the gate. Diagnostics only.
    pub fn scan(&self, transcript: &str) -> Vec<&str> {
        self.automaton.find_all(transcript)
    }

    pub fn gate(&self) -> &GracePeriodGate {
        &self.gate
    }
}
