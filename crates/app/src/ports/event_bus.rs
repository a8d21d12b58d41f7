//! Event bus port: publish/subscribe for state-change notifications.

use std::sync::Arc;

use trigger_domain::event::StateEvent;
use trigger_domain::id::ListenerOwner;

/// Callback invoked synchronously on the publisher's thread.
///
/// Callbacks must return quickly; anything slow belongs on an executor.
pub type EventCallback = Arc<dyn Fn(&StateEvent) + Send + Sync>;

/// Publishes state events to interested listeners.
pub trait EventPublisher {
    /// Publish an event to every listener registered for its id.
    ///
    /// Returns the number of callbacks invoked.
    fn publish(&self, event: StateEvent) -> usize;
}

/// Registers callbacks for specific event ids.
pub trait EventSource: Send + Sync {
    /// Invoke `callback` for every event whose id is `event_id`.
    fn listen(&self, event_id: &str, owner: ListenerOwner, callback: EventCallback);

    /// Remove every callback registered by `owner`.
    fn unlisten_all(&self, owner: ListenerOwner);
}

impl<T: EventPublisher + Send + Sync> EventPublisher for Arc<T> {
    fn publish(&self, event: StateEvent) -> usize {
        (**self).publish(event)
    }
}
