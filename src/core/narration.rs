//! Timed narration
//!
//! Narration is an ordered list of `(delay, step)` cues. A `Scheduler`
//! holds the cues of every playing script and releases them once their
//! due instant has passed. Timers are never cancelled; each one carries
//! the epoch it was scheduled in so the owner can decide whether a late
//! step still applies.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};

/// One scripted step with its offset from the start of the script
#[derive(Debug, Clone, PartialEq)]
pub struct Cue<S> {
    pub delay: Duration,
    pub step: S,
}

impl<S> Cue<S> {
    pub fn at(millis: u64, step: S) -> Self {
        Self {
            delay: Duration::from_millis(millis),
            step,
        }
    }
}

/// A step released by the scheduler
#[derive(Debug, Clone, PartialEq)]
pub struct Fired<S> {
    pub epoch: u64,
    /// Instant the step was due, used as the base for follow-up scripts
    pub due: Instant,
    pub step: S,
}

struct Timer<S> {
    due: Instant,
    seq: u64,
    epoch: u64,
    step: S,
}

impl<S> PartialEq for Timer<S> {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl<S> Eq for Timer<S> {}

impl<S> PartialOrd for Timer<S> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<S> Ord for Timer<S> {
    // Reversed so the max-heap pops the earliest timer first
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Fire-and-forget timer queue
pub struct Scheduler<S> {
    timers: BinaryHeap<Timer<S>>,
    next_seq: u64,
}

impl<S> Default for Scheduler<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Scheduler<S> {
    pub fn new() -> Self {
        Self {
            timers: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    /// Schedule a single step `delay` after `now`.
    pub fn schedule(&mut self, now: Instant, delay: Duration, epoch: u64, step: S) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.timers.push(Timer {
            due: now + delay,
            seq,
            epoch,
            step,
        });
    }

    /// Schedule every cue of a script relative to `now`.
    pub fn play(&mut self, now: Instant, epoch: u64, script: Vec<Cue<S>>) {
        for cue in script {
            self.schedule(now, cue.delay, epoch, cue.step);
        }
    }

    /// Remove and return every step due at `now`, earliest first.
    /// Steps with equal due times come out in scheduling order.
    pub fn due(&mut self, now: Instant) -> Vec<Fired<S>> {
        let mut fired = Vec::new();
        while let Some(top) = self.timers.peek() {
            if top.due > now {
                break;
            }
            if let Some(timer) = self.timers.pop() {
                fired.push(Fired {
                    epoch: timer.epoch,
                    due: timer.due,
                    step: timer.step,
                });
            }
        }
        fired
    }

    /// Time until the next timer fires, if any.
    pub fn next_deadline(&self, now: Instant) -> Option<Duration> {
        self.timers
            .peek()
            .map(|t| t.due.saturating_duration_since(now))
    }
}
