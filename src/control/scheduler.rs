//! Daemon loop: periodic polling plus two daily evaluation slots.
//!
//! The loop ticks every few seconds but each slot is a one-minute window, so
//! the same slot is seen several times per occurrence. [`SlotLatch`] turns
//! those repeated sightings into exactly one evaluation.

use std::{fmt, time::Duration};

use chrono::{Local, NaiveTime, Timelike};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{error, info};

use super::service::EvaluationService;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Morning,
    Evening,
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Morning => f.write_str("morning"),
            Slot::Evening => f.write_str("evening"),
        }
    }
}

/// Local times of day of the two evaluation slots. Only hour and minute count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotTimes {
    pub morning: NaiveTime,
    pub evening: NaiveTime,
}

impl SlotTimes {
    /// The slot whose minute contains `now`, if any.
    pub fn slot_at(&self, now: NaiveTime) -> Option<Slot> {
        let same_minute = |t: NaiveTime| t.hour() == now.hour() && t.minute() == now.minute();
        if same_minute(self.evening) {
            Some(Slot::Evening)
        } else if same_minute(self.morning) {
            Some(Slot::Morning)
        } else {
            None
        }
    }
}

/// Remembers the last slot that fired until the clock leaves it.
#[derive(Debug, Default)]
pub struct SlotLatch {
    last_fired: Option<Slot>,
}

impl SlotLatch {
    /// Feed the slot seen on this tick. Returns `true` exactly once per slot
    /// occurrence; the latch is set before the caller evaluates, so a failed
    /// evaluation is not retried within the same minute.
    pub fn observe(&mut self, slot: Option<Slot>) -> bool {
        match slot {
            None => {
                self.last_fired = None;
                false
            }
            Some(s) if self.last_fired == Some(s) => false,
            Some(s) => {
                self.last_fired = Some(s);
                true
            }
        }
    }

    pub fn last_fired(&self) -> Option<Slot> {
        self.last_fired
    }
}

/// Fires on the first check and then whenever `interval` has elapsed.
#[derive(Debug)]
pub struct PollTimer {
    interval: Duration,
    last: Option<Instant>,
}

impl PollTimer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    pub fn due(&mut self, now: Instant) -> bool {
        let due = self
            .last
            .map_or(true, |last| now.saturating_duration_since(last) >= self.interval);
        if due {
            self.last = Some(now);
        }
        due
    }
}

pub struct Scheduler {
    evaluator: EvaluationService,
    slots: SlotTimes,
    tick: Duration,
    latch: SlotLatch,
    poll: PollTimer,
}

impl Scheduler {
    pub fn new(
        evaluator: EvaluationService,
        slots: SlotTimes,
        poll_interval_secs: u64,
        tick_interval_secs: u64,
    ) -> Self {
        Self {
            evaluator,
            slots,
            tick: Duration::from_secs(tick_interval_secs.max(1)),
            latch: SlotLatch::default(),
            poll: PollTimer::new(Duration::from_secs(poll_interval_secs)),
        }
    }

    /// Runs the scheduler loop indefinitely.
    /// Spawn this via `tokio::spawn`.
    pub async fn run(mut self) {
        info!(
            tick_secs = self.tick.as_secs(),
            morning = %self.slots.morning.format("%H:%M"),
            evening = %self.slots.evening.format("%H:%M"),
            "Scheduler started"
        );
        let mut ticker = time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            self.step(Instant::now(), Local::now().time()).await;
        }
    }

    /// One tick against an explicit clock.
    ///
    /// A due evaluation is awaited before returning, so polling pauses while
    /// it runs.
    pub async fn step(&mut self, now: Instant, local_time: NaiveTime) {
        if self.poll.due(now) {
            self.evaluator.sensors().poll().await;
        }

        let slot = self.slots.slot_at(local_time);
        if !self.latch.observe(slot) {
            return;
        }
        let Some(slot) = slot else { return };

        info!(slot = %slot, "Triggering scheduled evaluation");
        // Spawned so a panic inside one evaluation can't take the loop down.
        let evaluator = self.evaluator.clone();
        match tokio::spawn(async move { evaluator.evaluate().await }).await {
            Ok(outcome) => info!(slot = %slot, outcome = ?outcome, "Scheduled evaluation finished"),
            Err(e) => error!(slot = %slot, error = %e, "Scheduled evaluation aborted"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
