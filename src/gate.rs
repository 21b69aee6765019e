//! Per-actor grace periods.
//!
//! After an accepted detection, further detections for the same actor are
//! suppressed for a configured window. State is in-memory only; a restart
//! clears all grace periods, which is acceptable because suppression is a
//! rate limit, not a record.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

/// Identity of the actor whose speech produced a transcript.
pub type ActorId = Uuid;

/// Suppression window over a concurrent map, safe to share between the
/// detection thread and anything else that wants to query it.
pub struct GracePeriodGate {
    last_triggered: DashMap<ActorId, Instant>,
    grace: Duration,
}

impl GracePeriodGate {
    pub fn new(grace: Duration) -> Self {
        Self {
            last_triggered: DashMap::new(),
            grace,
        }
    }

    /// True iff `actor` triggered within the last grace window as of `now`.
    ///
    /// Entries are never removed; a stale entry is simply one whose window
    /// has elapsed.
    pub fn is_suppressed(&self, actor: ActorId, now: Instant) -> bool {
        match self.last_triggered.get(&actor) {
            Some(entry) => now.duration_since(*entry) < self.grace,
            None => false,
        }
    }

    /// Unconditionally restart `actor`'s grace window at `now`.
    pub fn record(&self, actor: ActorId, now: Instant) {
        debug!(%actor, "grace period started");
        self.last_triggered.insert(actor, now);
    }

    pub fn grace_duration(&self) -> Duration {
        self.grace
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRACE: Duration = Duration::from_millis(5000);

    #[test]
    fn unknown_actor_is_not_suppressed() {
        let gate = GracePeriodGate::new(GRACE);
        assert!(!gate.is_suppressed(Uuid::new_v4(), Instant::now()));
    }

    #[test]
    fn suppression_covers_the_window_and_then_lapses() {
        let gate = GracePeriodGate::new(GRACE);
        let actor = Uuid::new_v4();
        let t0 = Instant::now();

        gate.record(actor, t0);
        assert!(gate.is_suppressed(actor, t0 + GRACE / 2));
        // Exactly at the boundary the window has elapsed.
        assert!(!gate.is_suppressed(actor, t0 + GRACE));
        assert!(!gate.is_suppressed(actor, t0 + GRACE + Duration::from_millis(1)));
    }

    #[test]
    fn record_overwrites_previous_timestamp() {
        let gate = GracePeriodGate::new(GRACE);
        let actor = Uuid::new_v4();
        let t0 = Instant::now();

        gate.record(actor, t0);
        gate.record(actor, t0 + GRACE);
        // Window restarted from the second record.
        assert!(gate.is_suppressed(actor, t0 + GRACE + GRACE / 2));
    }

    #[test]
    fn actors_are_independent() {
        let gate = GracePeriodGate::new(GRACE);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let t0 = Instant::now();

        gate.record(a, t0);
        assert!(gate.is_suppressed(a, t0));
        assert!(!gate.is_suppressed(b, t0));
    }
}
