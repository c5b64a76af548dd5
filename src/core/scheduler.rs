//! Recurring timers on the control thread.
//!
//! The player arms at most one recurring timer (playback). Timers never fire
//! on their own: the control loop calls [`TickScheduler::poll`] and routes the
//! returned ids back to the player, so an advance always runs on the same
//! thread as every other player call.

use log::trace;
use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

/// Identifier of an armed recurring timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

/// Scheduler failures
#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerError {
    /// Zero interval would fire on every poll
    InvalidInterval(Duration),
    Unavailable(String),
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerError::InvalidInterval(d) => write!(f, "Invalid timer interval: {:?}", d),
            SchedulerError::Unavailable(msg) => write!(f, "Scheduler unavailable: {}", msg),
        }
    }
}

impl std::error::Error for SchedulerError {}

/// Host timer service.
///
/// Callbacks are delivered by the owner (see module docs); `cancel` must
/// guarantee the id is never delivered again.
pub trait Scheduler {
    fn schedule_recurring(&mut self, interval: Duration) -> Result<TimerId, SchedulerError>;

    fn cancel(&mut self, id: TimerId);
}

#[derive(Debug, Clone)]
struct Timer {
    interval: Duration,
    next_due: Instant,
}

/// Poll-driven scheduler for a single-threaded control loop.
#[derive(Debug, Default)]
pub struct TickScheduler {
    next_id: u64,
    timers: BTreeMap<TimerId, Timer>,
}

impl TickScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a timer whose first deadline is `now + interval`.
    pub fn schedule_at(&mut self, interval: Duration, now: Instant) -> Result<TimerId, SchedulerError> {
        if interval.is_zero() {
            return Err(SchedulerError::InvalidInterval(interval));
        }
        self.next_id += 1;
        let id = TimerId(self.next_id);
        self.timers.insert(
            id,
            Timer {
                interval,
                next_due: now + interval,
            },
        );
        trace!("Timer {:?} armed every {:?}", id, interval);
        Ok(id)
    }

    pub fn is_armed(&self, id: TimerId) -> bool {
        self.timers.contains_key(&id)
    }

    /// Number of armed timers
    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    /// Earliest deadline over all armed timers (for sleeping the loop).
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.values().map(|t| t.next_due).min()
    }

    /// Collect timers due at `now`.
    ///
    /// Each due timer fires once per poll. A loop that fell behind does not
    /// get a burst of catch-up ticks: the next deadline restarts from `now`.
    pub fn poll(&mut self, now: Instant) -> Vec<TimerId> {
        let mut due = Vec::new();
        for (id, timer) in self.timers.iter_mut() {
            if timer.next_due <= now {
                due.push(*id);
                timer.next_due += timer.interval;
                if timer.next_due <= now {
                    timer.next_due = now + timer.interval;
                }
            }
        }
        due
    }
}

impl Scheduler for TickScheduler {
    fn schedule_recurring(&mut self, interval: Duration) -> Result<TimerId, SchedulerError> {
        self.schedule_at(interval, Instant::now())
    }

    fn cancel(&mut self, id: TimerId) {
        if self.timers.remove(&id).is_some() {
            trace!("Timer {:?} cancelled", id);
        }
    }
}
