//! [`Clock`] implementations.

use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use trigger_domain::time::{self, Timestamp};

use crate::ports::Clock;

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        time::now()
    }
}

/// A clock that only moves when told to.
///
/// Used to replay recorded observations and to drive the dispatcher
/// deterministically in tests.
#[derive(Debug)]
pub struct ManualClock {
    now: RwLock<Timestamp>,
}

impl ManualClock {
    #[must_use]
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: RwLock::new(start),
        }
    }

    pub fn set(&self, now: Timestamp) {
        *self.now.write().unwrap_or_else(PoisonError::into_inner) = now;
    }

    /// Move the clock forward by `delta`. Saturates at the maximum timestamp.
    pub fn advance(&self, delta: Duration) {
        let mut now = self.now.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(next) = chrono::Duration::from_std(delta)
            .ok()
            .and_then(|delta| now.checked_add_signed(delta))
        {
            *now = next;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.read().unwrap_or_else(PoisonError::into_inner)
    }
}
