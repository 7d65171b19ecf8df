//! Clock abstraction
//!
//! The controller never reads time directly. Production code uses
//! `SystemClock`; tests drive a `ManualClock` so narration timing is
//! deterministic.

use std::fmt;
#[cfg(test)]
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
#[cfg(test)]
use std::time::Duration;

use chrono::{DateTime, Local};
#[cfg(test)]
use chrono::TimeZone;

/// Source of monotonic and wall-clock time.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Monotonic instant used for scheduling.
    fn now(&self) -> Instant;

    /// Local wall-clock time used for subjects and the status clock.
    fn local_now(&self) -> DateTime<Local>;
}

/// Shared clock handle
pub type SharedClock = Arc<dyn Clock>;

/// Real system time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    pub fn shared() -> SharedClock {
        Arc::new(Self)
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn local_now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Manually advanced clock for tests.
///
/// Both `now()` and `local_now()` move forward together when
/// `advance()` is called; nothing ever sleeps.
#[cfg(test)]
#[derive(Debug)]
pub struct ManualClock {
    logical_nanos: AtomicU64,
    base_instant: Instant,
    base_local: DateTime<Local>,
}

#[cfg(test)]
impl ManualClock {
    /// Clock whose wall time starts at the given local date and time.
    pub fn at(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> Self {
        let base_local = Local
            .with_ymd_and_hms(year, month, day, hour, minute, 0)
            .earliest()
            .unwrap_or_else(Local::now);
        Self {
            logical_nanos: AtomicU64::new(0),
            base_instant: Instant::now(),
            base_local,
        }
    }

    pub fn shared_at(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> Arc<Self> {
        Arc::new(Self::at(year, month, day, hour, minute))
    }

    /// Move logical time forward.
    pub fn advance(&self, duration: Duration) {
        self.logical_nanos
            .fetch_add(duration.as_nanos() as u64, Ordering::SeqCst);
    }

    fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.logical_nanos.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base_instant + self.elapsed()
    }

    fn local_now(&self) -> DateTime<Local> {
        let elapsed = chrono::Duration::from_std(self.elapsed()).unwrap_or_else(|_| chrono::Duration::zero());
        self.base_local + elapsed
    }
}
