//! # Clocks
//!
//! Lock arithmetic needs "now", and tests need to move "now" forward by a day
//! without waiting a day. Engines therefore never call `Utc::now()` on their
//! own: the caller reads a [`Clock`] once per operation and passes the
//! instant in.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;

use crate::config::MAX_CLOCK_ADVANCE_SECS;

/// A source of the current time.
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// The wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same instant, so a test can hold one handle and give
/// another to the code under test.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<RwLock<DateTime<Utc>>>,
}

impl ManualClock {
    /// Creates a clock frozen at `start`.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(RwLock::new(start)),
        }
    }

    /// Creates a clock frozen at the current wall-clock time.
    pub fn starting_now() -> Self {
        Self::new(Utc::now())
    }

    /// Moves the clock forward by `secs` seconds and returns the new instant.
    ///
    /// Steps are capped at [`MAX_CLOCK_ADVANCE_SECS`].
    pub fn advance_secs(&self, secs: u64) -> DateTime<Utc> {
        let step = Duration::seconds(secs.min(MAX_CLOCK_ADVANCE_SECS) as i64);
        let mut now = self.now.write();
        *now = now.checked_add_signed(step).unwrap_or(DateTime::<Utc>::MAX_UTC);
        *now
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read()
    }
}
