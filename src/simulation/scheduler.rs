//! Discrete-event scheduler with a deterministic virtual clock.
//!
//! The scheduler is the ticking heart of the simulation:
//! - Events are ordered by `(fire_time, sequence)` in a min-priority queue
//! - Sequence numbers are assigned monotonically at scheduling time, so two
//!   events with equal fire times dispatch in the order they were scheduled
//! - The clock only advances when an event is popped, never backwards
//! - Cancellation is a tombstone: a cancelled event is skipped on pop, and
//!   cancelling an already-fired handle is a no-op
//!
//! Nothing here sleeps. Virtual time is decoupled from wall-clock time, so a
//! one-hour simulation completes as fast as its events dispatch.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::collections::HashSet;

/// Virtual simulation time in whole microseconds.
///
/// Microsecond resolution comfortably covers LoRa airtimes (tens to hundreds
/// of milliseconds) while keeping ordering exact, with no floating-point
/// comparisons inside the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SimTime(u64);

impl SimTime {
    pub const ZERO: SimTime = SimTime(0);

    pub const fn from_micros(micros: u64) -> Self {
        SimTime(micros)
    }

    pub const fn from_secs(secs: u64) -> Self {
        SimTime(secs * 1_000_000)
    }

    /// Convert from seconds, rounding to the nearest microsecond.
    ///
    /// Negative inputs must be rejected by the caller before conversion; this
    /// saturates at zero as a last line of defense.
    pub fn from_secs_f64(secs: f64) -> Self {
        SimTime((secs * 1_000_000.0).round().max(0.0) as u64)
    }

    pub fn as_micros(self) -> u64 {
        self.0
    }

    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / 1_000_000.0
    }

    /// Offset this instant by a span of seconds.
    pub fn offset_secs(self, secs: f64) -> Self {
        SimTime(self.0 + SimTime::from_secs_f64(secs).0)
    }
}

impl std::ops::Add for SimTime {
    type Output = SimTime;

    fn add(self, rhs: SimTime) -> SimTime {
        SimTime(self.0 + rhs.0)
    }
}

impl std::fmt::Display for SimTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.6}s", self.as_secs_f64())
    }
}

/// Error type for scheduling misuse. These are programming errors and the
/// caller is expected to surface them immediately rather than clamp.
#[derive(Debug, Clone, PartialEq)]
pub enum SchedulingError {
    /// A negative delay was requested.
    NegativeDelay(f64),
    /// An absolute fire time earlier than the current clock was requested.
    TimeInPast { requested: SimTime, now: SimTime },
}

impl std::fmt::Display for SchedulingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchedulingError::NegativeDelay(delay) => {
                write!(f, "Cannot schedule an event with negative delay {delay}")
            }
            SchedulingError::TimeInPast { requested, now } => {
                write!(f, "Cannot schedule an event at {requested}, clock is already at {now}")
            }
        }
    }
}

impl std::error::Error for SchedulingError {}

/// Opaque handle to a scheduled event, used for cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventHandle(u64);

/// One queued event. Ordering ignores the action entirely: time first, then
/// the monotonic sequence number for a FIFO tie-break.
struct ScheduledEvent<A> {
    fire_time: SimTime,
    sequence: u64,
    action: A,
}

impl<A> PartialEq for ScheduledEvent<A> {
    fn eq(&self, other: &Self) -> bool {
        self.fire_time == other.fire_time && self.sequence == other.sequence
    }
}

impl<A> Eq for ScheduledEvent<A> {}

impl<A> PartialOrd for ScheduledEvent<A> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<A> Ord for ScheduledEvent<A> {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.fire_time.cmp(&other.fire_time) {
            Ordering::Equal => self.sequence.cmp(&other.sequence),
            ord => ord,
        }
    }
}

/// Min-priority event queue with a monotonic virtual clock.
///
/// `A` is the action payload dispatched by the owner of the scheduler. The
/// scheduler itself never interprets actions; it only orders them.
pub struct Scheduler<A> {
    queue: BinaryHeap<Reverse<ScheduledEvent<A>>>,
    now: SimTime,
    next_sequence: u64,
    cancelled: HashSet<u64>,
    stopped: bool,
}

impl<A> Scheduler<A> {
    pub fn new() -> Self {
        Scheduler {
            queue: BinaryHeap::new(),
            now: SimTime::ZERO,
            next_sequence: 0,
            cancelled: HashSet::new(),
            stopped: false,
        }
    }

    /// Current virtual time. Monotonically non-decreasing.
    pub fn now(&self) -> SimTime {
        self.now
    }

    pub fn pending_events(&self) -> usize {
        self.queue.len()
    }

    /// Schedule an action at an absolute virtual time.
    pub fn schedule_at(&mut self, at: SimTime, action: A) -> Result<EventHandle, SchedulingError> {
        if at < self.now {
            return Err(SchedulingError::TimeInPast { requested: at, now: self.now });
        }
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.queue.push(Reverse(ScheduledEvent {
            fire_time: at,
            sequence,
            action,
        }));
        Ok(EventHandle(sequence))
    }

    /// Schedule an action `delay_secs` after the current clock value.
    ///
    /// A negative delay is a programming error and fails fast.
    pub fn schedule_in(&mut self, delay_secs: f64, action: A) -> Result<EventHandle, SchedulingError> {
        if delay_secs < 0.0 {
            return Err(SchedulingError::NegativeDelay(delay_secs));
        }
        self.schedule_at(self.now.offset_secs(delay_secs), action)
    }

    /// Cancel a not-yet-fired event. Cancelling a handle whose event already
    /// fired (or was itself cancelled) is a no-op; the stale tombstone is
    /// pruned once the queue drains.
    pub fn cancel(&mut self, handle: EventHandle) {
        self.cancelled.insert(handle.0);
    }

    /// Halt the scheduler: all remaining events are dropped and `pop_due`
    /// returns `None` from here on.
    pub fn stop(&mut self) {
        self.stopped = true;
        self.queue.clear();
        self.cancelled.clear();
    }

    #[cfg(test)]
    fn tombstones(&self) -> usize {
        self.cancelled.len()
    }

    /// Pop the next event due at or before `stop_time`, advancing the clock
    /// to its fire time. Returns `None` when the queue is drained or every
    /// remaining event lies beyond `stop_time` (those are simply never
    /// dispatched; they are dropped at teardown, which is not an error).
    pub fn pop_due(&mut self, stop_time: SimTime) -> Option<(SimTime, A)> {
        loop {
            if self.stopped {
                return None;
            }
            let Some(head) = self.queue.peek() else {
                // Nothing pending, so every remaining tombstone is stale
                // (its event fired before the cancel).
                self.cancelled.clear();
                return None;
            };
            let fire_time = head.0.fire_time;
            if fire_time > stop_time {
                return None;
            }
            let Reverse(event) = self.queue.pop()?;
            if self.cancelled.remove(&event.sequence) {
                continue;
            }
            self.now = event.fire_time;
            return Some((event.fire_time, event.action));
        }
    }
}

impl<A> Default for Scheduler<A> {
    fn default() -> Self {
        Scheduler::new()
    }
}
