//! Punishment dispatch.
//!
//! What a punishment *is* — a chat broadcast, a sound, an in-world effect —
//! belongs to the host environment behind [`PunishmentSink`]. This module
//! only sequences it: announce, play a cue, and apply the effect once the
//! cue has had time to finish, deferred through the tick scheduler rather
//! than a wall-clock timer.

use std::collections::HashMap;
use std::sync::Arc;

use rand::Rng;
use tracing::{info, warn};

use crate::config::Config;
use crate::detector::Detection;
use crate::gate::ActorId;
use crate::scheduler::TickScheduler;

/// Host-environment side effects. Implementations must be callable from both
/// the detection thread and the tick-driver thread.
pub trait PunishmentSink: Send + Sync {
    /// Announce the detection to everyone.
    fn broadcast(&self, actor: ActorId, phrase: &str);

    /// Start an audio cue for the actor.
    fn play_cue(&self, actor: ActorId, clip_id: &str);

    /// Apply the punitive effect. Called at most once per detection.
    fn apply_effect(&self, actor: ActorId, phrase: &str);
}

/// Sequences sink calls for each detection and owns the clip table.
pub struct PunishmentDispatcher {
    sink: Arc<dyn PunishmentSink>,
    scheduler: Arc<TickScheduler>,
    clip_ids: Vec<String>,
    clip_durations_ms: HashMap<String, u64>,
}

impl PunishmentDispatcher {
    pub fn new(
        sink: Arc<dyn PunishmentSink>,
        scheduler: Arc<TickScheduler>,
        config: &Config,
    ) -> Self {
        Self {
            sink,
            scheduler,
            clip_ids: config.audio_clip_ids.clone(),
            clip_durations_ms: config.audio_clip_durations_ms.clone(),
        }
    }

    /// Run the punishment sequence for one accepted detection.
    ///
    /// With no clips configured the effect lands immediately; otherwise a
    /// random clip plays and the effect is scheduled for when it ends.
    pub fn dispatch(&self, detection: &Detection) {
        let Detection { actor, phrase } = detection;
        self.sink.broadcast(*actor, phrase);

        if self.clip_ids.is_empty() {
            warn!("no audio clips configured, applying effect immediately");
            self.sink.apply_effect(*actor, phrase);
            return;
        }

        let clip_id = &self.clip_ids[rand::rng().random_range(0..self.clip_ids.len())];
        let delay_ms = self
            .clip_durations_ms
            .get(clip_id)
            .copied()
            .unwrap_or(Config::DEFAULT_CLIP_DURATION_MS);

        self.sink.play_cue(*actor, clip_id);
        info!(%actor, clip = %clip_id, delay_ms, "effect scheduled after cue");

        let sink = Arc::clone(&self.sink);
        let actor = *actor;
        let phrase = phrase.clone();
        self.scheduler.schedule(
            Box::new(move || {
                sink.apply_effect(actor, &phrase);
                Ok(())
            }),
            delay_ms,
        );
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;
    use uuid::Uuid;

    use super::*;

    #[derive(Debug, PartialEq, Eq)]
    enum Event {
        Broadcast(String),
        Cue(String),
        Effect(String),
    }

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<Event>>,
    }

    impl PunishmentSink for RecordingSink {
        fn broadcast(&self, _actor: ActorId, phrase: &str) {
            self.events.lock().push(Event::Broadcast(phrase.into()));
        }

        fn play_cue(&self, _actor: ActorId, clip_id: &str) {
            self.events.lock().push(Event::Cue(clip_id.into()));
        }

        fn apply_effect(&self, _actor: ActorId, phrase: &str) {
            self.events.lock().push(Event::Effect(phrase.into()));
        }
    }

    fn detection() -> Detection {
        Detection {
            actor: Uuid::new_v4(),
            phrase: "lava chicken".into(),
        }
    }

    fn dispatcher_with(
        config: Config,
    ) -> (Arc<RecordingSink>, Arc<TickScheduler>, PunishmentDispatcher) {
        let sink = Arc::new(RecordingSink::default());
        let scheduler = Arc::new(TickScheduler::new(20));
        let dispatcher = PunishmentDispatcher::new(
            Arc::clone(&sink) as Arc<dyn PunishmentSink>,
            Arc::clone(&scheduler),
            &config,
        );
        (sink, scheduler, dispatcher)
    }

    #[test]
    fn effect_fires_only_after_the_cue_duration_elapses() {
        let (sink, scheduler, dispatcher) = dispatcher_with(Config::default());

        dispatcher.dispatch(&detection());
        {
            let events = sink.events.lock();
            assert_eq!(events.len(), 2);
            assert_eq!(events[0], Event::Broadcast("lava chicken".into()));
            assert_eq!(events[1], Event::Cue("da_dog".into()));
        }

        // da_dog is 2000 ms = 40 ticks.
        for _ in 0..39 {
            scheduler.tick();
        }
        assert_eq!(sink.events.lock().len(), 2);

        scheduler.tick();
        let events = sink.events.lock();
        assert_eq!(events.len(), 3);
        assert_eq!(events[2], Event::Effect("lava chicken".into()));
    }

    #[test]
    fn unknown_clip_id_uses_the_fallback_duration() {
        let mut config = Config::default();
        config.audio_clip_ids = vec!["mystery".into()];
        config.audio_clip_durations_ms.clear();
        let (sink, scheduler, dispatcher) = dispatcher_with(config);

        dispatcher.dispatch(&detection());

        // Fallback 2000 ms = 40 ticks.
        for _ in 0..40 {
            scheduler.tick();
        }
        assert_eq!(sink.events.lock().len(), 3);
    }

    #[test]
    fn no_clips_means_immediate_effect() {
        let mut config = Config::default();
        config.audio_clip_ids.clear();
        let (sink, scheduler, dispatcher) = dispatcher_with(config);

        dispatcher.dispatch(&detection());

        let events = sink.events.lock();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1], Event::Effect("lava chicken".into()));
        drop(events);
        assert_eq!(scheduler.pending_tasks(), 0);
    }

    #[test]
    fn each_detection_applies_exactly_one_effect() {
        let (sink, scheduler, dispatcher) = dispatcher_with(Config::default());

        dispatcher.dispatch(&detection());
        dispatcher.dispatch(&detection());

        for _ in 0..80 {
            scheduler.tick();
        }
        let effects = sink
            .events
            .lock()
            .iter()
            .filter(|e| matches!(e, Event::Effect(_)))
            .count();
        assert_eq!(effects, 2);
    }
}
