//! Time utilities for adgate
//!
//! Gating decisions use monotonic time so that wall-clock changes cannot
//! open or close a gate. Wall-clock time is only used for event timestamps
//! and log output.
//!
//! All components that read time take a [`Clock`] so that tests can drive
//! time explicitly with [`MockClock`].

use chrono::{DateTime, Local};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Represents a point in monotonic time.
/// This is immune to wall-clock changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonotonicInstant(Instant);

impl MonotonicInstant {
    pub fn now() -> Self {
        Self(Instant::now())
    }

    pub fn from_instant(instant: Instant) -> Self {
        Self(instant)
    }

    /// Time elapsed from `earlier` to `self`, zero if `earlier` is later
    pub fn duration_since(&self, earlier: MonotonicInstant) -> Duration {
        self.0.saturating_duration_since(earlier.0)
    }
}

impl std::ops::Add<Duration> for MonotonicInstant {
    type Output = MonotonicInstant;

    fn add(self, rhs: Duration) -> Self::Output {
        MonotonicInstant(self.0 + rhs)
    }
}

/// Source of monotonic time
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> MonotonicInstant;
}

/// Clock backed by `Instant::now()`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> MonotonicInstant {
        MonotonicInstant::now()
    }
}

/// Manually advanced clock for tests.
///
/// Clones share the same timeline, so a test can keep one handle and hand
/// another to the code under test.
#[derive(Debug, Clone)]
pub struct MockClock {
    origin: Instant,
    offset: Arc<Mutex<Duration>>,
}

impl MockClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    /// The instant this clock started at (T0)
    pub fn origin(&self) -> MonotonicInstant {
        MonotonicInstant(self.origin)
    }

    /// Advance the clock by `by`
    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|e| e.into_inner());
        *offset += by;
    }

    /// Move the clock to exactly `T0 + at`. Moving backwards is ignored.
    pub fn set_elapsed(&self, at: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|e| e.into_inner());
        if at > *offset {
            *offset = at;
        }
    }

    /// Time elapsed since T0
    pub fn elapsed(&self) -> Duration {
        *self.offset.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> MonotonicInstant {
        MonotonicInstant(self.origin + self.elapsed())
    }
}

/// Current local wall-clock time, for timestamps and logs only
pub fn wall_now() -> DateTime<Local> {
    Local::now()
}

/// Helper to format durations in human-readable form
pub fn format_duration(d: Duration) -> String {
    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}
