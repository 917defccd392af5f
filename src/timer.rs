use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::time::Duration;

use tokio::time::Instant;

const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Stand-in deadline for delays too large to add to an `Instant`
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

fn deadline(now: Instant, delay: Duration) -> Instant {
    now.checked_add(delay).unwrap_or_else(|| now + FAR_FUTURE)
}

/// Unique identifier for a timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(u64);

/// Type of timer
#[derive(Debug, Clone, Copy)]
enum TimerType {
    /// One-shot timer that fires once and is removed
    OneShot,
    /// Recurring timer that fires repeatedly at an interval
    Recurring { interval: Duration },
}

#[derive(Debug, Clone)]
struct Timer<T> {
    fire_at: Instant,
    timer_type: TimerType,
    payload: T,
}

/// Deadline-ordered timer queue.
///
/// Nothing here reads the clock: callers pass `now` into every call, which
/// keeps firing order fully deterministic under test. Cancelled timers are
/// dropped from the map right away and their heap entries are skipped lazily.
pub struct Scheduler<T> {
    timers: HashMap<TimerId, Timer<T>>,
    queue: BinaryHeap<Reverse<(Instant, TimerId)>>,
    next_id: u64,
}

impl<T: Clone> Scheduler<T> {
    pub fn new() -> Self {
        Self {
            timers: HashMap::new(),
            queue: BinaryHeap::new(),
            next_id: 0,
        }
    }

    /// Schedule a one-shot timer that fires `delay` after `now`
    pub fn schedule_once(&mut self, now: Instant, delay: Duration, payload: T) -> TimerId {
        self.insert(deadline(now, delay), TimerType::OneShot, payload)
    }

    /// Schedule a recurring timer whose first firing is one `interval` after `now`
    pub fn schedule_recurring(&mut self, now: Instant, interval: Duration, payload: T) -> TimerId {
        self.insert(deadline(now, interval), TimerType::Recurring { interval }, payload)
    }

    fn insert(&mut self, fire_at: Instant, timer_type: TimerType, payload: T) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;

        self.timers.insert(
            id,
            Timer {
                fire_at,
                timer_type,
                payload,
            },
        );
        self.queue.push(Reverse((fire_at, id)));
        id
    }

    /// Cancel a timer. Returns false if it already fired or was cancelled.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        self.timers.remove(&id).is_some()
    }

    pub fn is_active(&self, id: TimerId) -> bool {
        self.timers.contains_key(&id)
    }

    /// Earliest instant at which a live timer is due
    pub fn next_deadline(&mut self) -> Option<Instant> {
        self.discard_stale();
        self.queue.peek().map(|Reverse((at, _))| *at)
    }

    /// Pop every timer due at or before `now`, in fire-time order.
    ///
    /// Recurring timers are re-armed one interval after `now`, so a loop that
    /// wakes late does not replay a burst of missed ticks.
    pub fn tick(&mut self, now: Instant) -> Vec<(TimerId, T)> {
        let mut fired = Vec::new();

        loop {
            self.discard_stale();
            let Some(Reverse((fire_at, id))) = self.queue.peek().copied() else {
                break;
            };
            if fire_at > now {
                break;
            }
            self.queue.pop();

            let Some(timer) = self.timers.get_mut(&id) else {
                continue;
            };
            fired.push((id, timer.payload.clone()));

            match timer.timer_type {
                TimerType::Recurring { interval } => {
                    // A zero interval would otherwise spin this loop forever
                    let next = deadline(now, interval.max(MIN_INTERVAL));
                    timer.fire_at = next;
                    self.queue.push(Reverse((next, id)));
                }
                TimerType::OneShot => {
                    self.timers.remove(&id);
                }
            }
        }

        fired
    }

    /// Number of live timers
    pub fn active_count(&self) -> usize {
        self.timers.len()
    }

    /// Drop heap entries whose timer was cancelled or re-armed
    fn discard_stale(&mut self) {
        while let Some(Reverse((fire_at, id))) = self.queue.peek().copied() {
            match self.timers.get(&id) {
                Some(timer) if timer.fire_at == fire_at => break,
                _ => {
                    self.queue.pop();
                }
            }
        }
    }
}

impl<T: Clone> Default for Scheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}
