//! State trackers: the last time (and optionally value) a named signal was
//! observed.
//!
//! Trackers are owned by a [`StateRegistry`] and shared by handle
//! (`Arc<StateRecorder>`) with every condition tree that reads them. Whatever
//! recognises the underlying signal calls [`StateRecorder::record`]; condition
//! trees only ever read.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::time::Timestamp;

#[derive(Debug, Default, Clone, Copy)]
struct Record {
    time: Option<Timestamp>,
    value: Option<f64>,
}

/// Tracks the most recent observation of one named state.
#[derive(Debug)]
pub struct StateRecorder {
    name: String,
    record: RwLock<Record>,
    disposed: AtomicBool,
}

impl StateRecorder {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            record: RwLock::new(Record::default()),
            disposed: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Record an observation at `at`, replacing the previous one.
    ///
    /// A `None` value clears any previously recorded value. Recording on a
    /// disposed tracker brings it back into use.
    pub fn record(&self, at: Timestamp, value: Option<f64>) {
        let mut record = self.record.write().unwrap_or_else(PoisonError::into_inner);
        record.time = Some(at);
        record.value = value;
        self.disposed.store(false, Ordering::Release);
    }

    /// Time of the last observation, `None` if never observed.
    #[must_use]
    pub fn last_record_time(&self) -> Option<Timestamp> {
        self.record
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .time
    }

    #[must_use]
    pub fn last_value(&self) -> Option<f64> {
        self.record
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .value
    }

    /// Release the tracker's recorded data. Later reads see "never observed"
    /// until the next [`StateRecorder::record`].
    pub fn dispose(&self) {
        *self.record.write().unwrap_or_else(PoisonError::into_inner) = Record::default();
        self.disposed.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

/// Resolves state names to trackers while compiling expressions.
pub trait StateLookup {
    fn get_state(&self, name: &str) -> Option<Arc<StateRecorder>>;
}

impl<F> StateLookup for F
where
    F: Fn(&str) -> Option<Arc<StateRecorder>>,
{
    fn get_state(&self, name: &str) -> Option<Arc<StateRecorder>> {
        self(name)
    }
}

/// Name-keyed owner of every state tracker in the process.
#[derive(Debug, Default)]
pub struct StateRegistry {
    states: RwLock<HashMap<String, Arc<StateRecorder>>>,
}

impl StateRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry holding one fresh tracker per name.
    #[must_use]
    pub fn with_states<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let registry = Self::new();
        for name in names {
            registry.register(name);
        }
        registry
    }

    /// Return the tracker for `name`, creating it if needed.
    pub fn register(&self, name: impl Into<String>) -> Arc<StateRecorder> {
        let name = name.into();
        let mut states = self.states.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            states
                .entry(name.clone())
                .or_insert_with(|| Arc::new(StateRecorder::new(name))),
        )
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<StateRecorder>> {
        self.states
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Record an observation on an already-registered tracker.
    ///
    /// Returns `false` when `name` is unknown.
    pub fn record(&self, name: &str, at: Timestamp, value: Option<f64>) -> bool {
        match self.get(name) {
            Some(state) => {
                state.record(at, value);
                true
            }
            None => false,
        }
    }

}

impl StateLookup for StateRegistry {
    fn get_state(&self, name: &str) -> Option<Arc<StateRecorder>> {
        self.get(name)
    }
}
