//! Time and timestamp helpers.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// UTC timestamp used for state records, trigger bookkeeping and events.
pub type Timestamp = DateTime<Utc>;

/// Return the current UTC time.
#[must_use]
pub fn now() -> Timestamp {
    Utc::now()
}

/// Signed number of seconds elapsed from `earlier` to `later`.
///
/// Nanosecond resolution, falling back to milliseconds for spans too long
/// to count in nanoseconds. Negative when `earlier` is in the future.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn seconds_between(earlier: Timestamp, later: Timestamp) -> f64 {
    let delta = later.signed_duration_since(earlier);
    match delta.num_nanoseconds() {
        Some(nanos) => nanos as f64 / 1e9,
        None => delta.num_milliseconds() as f64 / 1000.0,
    }
}

/// Elapsed time from `earlier` to `later`, clamped at zero.
#[must_use]
pub fn elapsed_between(earlier: Timestamp, later: Timestamp) -> Duration {
    later
        .signed_duration_since(earlier)
        .to_std()
        .unwrap_or(Duration::ZERO)
}
