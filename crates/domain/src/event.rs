//! Event: notification that a named state was just observed.
//!
//! The state-tracking layer publishes one [`StateEvent`] per observation;
//! the dispatcher uses `event_id` to find the scene that listens for it.

use serde::{Deserialize, Serialize};

use crate::time::Timestamp;

/// A state-change notification carried by the event bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateEvent {
    /// Name of the state that changed.
    pub event_id: String,
    pub timestamp: Timestamp,
}

impl StateEvent {
    #[must_use]
    pub fn new(event_id: impl Into<String>, timestamp: Timestamp) -> Self {
        Self {
            event_id: event_id.into(),
            timestamp,
        }
    }
}
