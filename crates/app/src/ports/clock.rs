//! Clock port: where the dispatcher reads "now" from.

use trigger_domain::time::Timestamp;

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}
