//! In-process event bus: per-event-id callbacks plus a tokio broadcast tap.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use tokio::sync::broadcast;

use trigger_domain::event::StateEvent;
use trigger_domain::id::ListenerOwner;

use crate::ports::{EventCallback, EventPublisher, EventSource};

struct Listener {
    owner: ListenerOwner,
    callback: EventCallback,
}

/// In-process event bus.
///
/// Callbacks registered with [`EventSource::listen`] run synchronously on
/// the publishing thread, outside the bus's lock, so a callback may itself
/// register or remove listeners. Every published event is also sent on a
/// [`broadcast`] channel for observers that want the whole stream.
///
/// Publishing succeeds even when nobody listens (the event is dropped).
pub struct InProcessEventBus {
    listeners: RwLock<HashMap<String, Vec<Listener>>>,
    sender: broadcast::Sender<StateEvent>,
}

impl InProcessEventBus {
    /// Create a new event bus with the given broadcast capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            listeners: RwLock::new(HashMap::new()),
            sender,
        }
    }

    /// Subscribe to every event on this bus.
    ///
    /// Returns a receiver that will get all events published *after*
    /// the subscription is created.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StateEvent> {
        self.sender.subscribe()
    }

    /// Number of callbacks registered for `event_id`.
    #[must_use]
    pub fn listener_count(&self, event_id: &str) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event_id)
            .map_or(0, Vec::len)
    }
}

impl Default for InProcessEventBus {
    fn default() -> Self {
        Self::new(64)
    }
}

impl std::fmt::Debug for InProcessEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let listeners = self.listeners.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("InProcessEventBus")
            .field("event_ids", &listeners.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl EventPublisher for InProcessEventBus {
    fn publish(&self, event: StateEvent) -> usize {
        let callbacks: Vec<EventCallback> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&event.event_id)
            .map(|listeners| listeners.iter().map(|l| l.callback.clone()).collect())
            .unwrap_or_default();

        for callback in &callbacks {
            callback(&event);
        }

        // broadcast::send fails only when there are zero receivers.
        let _ = self.sender.send(event);
        callbacks.len()
    }
}

impl EventSource for InProcessEventBus {
    fn listen(&self, event_id: &str, owner: ListenerOwner, callback: EventCallback) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(event_id.to_string())
            .or_default()
            .push(Listener { owner, callback });
    }

    fn unlisten_all(&self, owner: ListenerOwner) {
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        for entries in listeners.values_mut() {
            entries.retain(|listener| listener.owner != owner);
        }
        listeners.retain(|_, entries| !entries.is_empty());
    }
}
