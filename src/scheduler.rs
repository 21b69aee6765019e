//! Tick-synchronized delayed task execution.
//!
//! The scheduler owns no clock: an external driver calls [`TickScheduler::tick`]
//! once per simulation step (20 steps/second in the reference setup) and tasks
//! fire once the counter reaches their target. Delays are requested in
//! milliseconds and converted to whole ticks, floored, with a minimum of one
//! tick so a task never fires on the tick that scheduled it.
//!
//! The queue is strict FIFO, not ordered by target tick: a task enqueued
//! early with a long delay holds back a later task with a short delay until
//! its own tick arrives. Callers that need timely firing must schedule in
//! non-decreasing delay order. This mirrors the source system's behavior and
//! is pinned by a test rather than silently corrected.

use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

/// A deferred action. Errors are logged per task and never abort the tick.
pub type Task = Box<dyn FnOnce() -> Result<()> + Send>;

struct ScheduledTask {
    target_tick: u64,
    task: Task,
}

/// FIFO queue of deferred tasks over a monotonic tick counter.
///
/// `tick()` is intended for a single driver thread; `schedule()` may be
/// called from any thread.
pub struct TickScheduler {
    tasks: Mutex<VecDeque<ScheduledTask>>,
    current_tick: AtomicU64,
    ms_per_tick: u64,
}

impl TickScheduler {
    /// Scheduler for a simulation running at `ticks_per_second`.
    pub fn new(ticks_per_second: u32) -> Self {
        Self {
            tasks: Mutex::new(VecDeque::new()),
            current_tick: AtomicU64::new(0),
            ms_per_tick: 1000 / ticks_per_second.max(1) as u64,
        }
    }

    /// Enqueue `task` to run after `delay_ms`, rounded down to whole ticks
    /// with a minimum of one tick.
    pub fn schedule(&self, task: Task, delay_ms: u64) {
        let delay_ticks = (delay_ms / self.ms_per_tick).max(1);
        let target_tick = self.current_tick.load(Ordering::SeqCst) + delay_ticks;

        self.tasks.lock().push_back(ScheduledTask { target_tick, task });
        debug!(delay_ms, delay_ticks, target_tick, "task scheduled");
    }

    /// Advance the counter by one and run every queue-head task whose target
    /// tick has been reached. A task that fails or panics is logged and does
    /// not stop the remaining tasks or future ticks.
    pub fn tick(&self) {
        let tick = self.current_tick.fetch_add(1, Ordering::SeqCst) + 1;

        loop {
            let due = {
                let mut tasks = self.tasks.lock();
                match tasks.front() {
                    Some(head) if head.target_tick <= tick => tasks.pop_front(),
                    _ => None,
                }
            };

            let Some(due) = due else { break };

            // The lock is released while the task runs, so a task may itself
            // call `schedule` without deadlocking.
            match catch_unwind(AssertUnwindSafe(due.task)) {
                Ok(Ok(())) => debug!(tick, "scheduled task executed"),
                Ok(Err(err)) => error!(tick, %err, "scheduled task failed"),
                Err(_) => error!(tick, "scheduled task panicked"),
            }
        }
    }

    /// The number of ticks elapsed so far.
    pub fn current_tick(&self) -> u64 {
        self.current_tick.load(Ordering::SeqCst)
    }

    /// Tasks waiting to run.
    pub fn pending_tasks(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Drop all pending tasks without executing them. Shutdown only.
    pub fn clear(&self) {
        let mut tasks = self.tasks.lock();
        let cleared = tasks.len();
        tasks.clear();
        if cleared > 0 {
            info!(cleared, "pending scheduled tasks cleared");
        }
    }

    pub fn ms_per_tick(&self) -> u64 {
        self.ms_per_tick
    }
}

impl Drop for TickScheduler {
    fn drop(&mut self) {
        let pending = self.tasks.get_mut().len();
        if pending > 0 {
            warn!(pending, "scheduler dropped with pending tasks");
        }
    }
}
