//! Observation feed: turns `<state> [value]` lines into tracker records and
//! state events.

use std::str::FromStr;
use std::sync::Arc;

use trigger_app::ports::{Clock, EventPublisher};
use trigger_domain::event::StateEvent;
use trigger_domain::state::StateRegistry;

/// One observed state, optionally with a value.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub state: String,
    pub value: Option<f64>,
}

impl Observation {
    /// Parse one input line. Blank lines and `#` comments yield `None`.
    ///
    /// # Errors
    ///
    /// Returns [`ObservationError`] for a malformed value or extra fields.
    pub fn parse_line(line: &str) -> Result<Option<Self>, ObservationError> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }
        line.parse().map(Some)
    }
}

impl FromStr for Observation {
    type Err = ObservationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut fields = s.split_whitespace();
        let state = fields.next().ok_or(ObservationError::Empty)?.to_string();
        let value = fields
            .next()
            .map(|raw| match raw.parse::<f64>() {
                Ok(value) if value.is_finite() => Ok(value),
                _ => Err(ObservationError::InvalidValue {
                    state: state.clone(),
                    value: raw.to_string(),
                }),
            })
            .transpose()?;
        if fields.next().is_some() {
            return Err(ObservationError::TooManyFields(s.trim().to_string()));
        }
        Ok(Self { state, value })
    }
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ObservationError {
    #[error("empty observation")]
    Empty,
    #[error("state {state:?} has a non-numeric value {value:?}")]
    InvalidValue { state: String, value: String },
    #[error("expected `<state> [value]`, got {0:?}")]
    TooManyFields(String),
}

/// What feeding one line did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedOutcome {
    /// Blank or comment line.
    Skipped,
    /// No tracker with that name is registered.
    UnknownState,
    /// Recorded and published to this many listeners.
    Published(usize),
}

/// Records observations on their trackers, then publishes the matching
/// state event so listeners see the fresh record.
pub struct StateFeeder<P> {
    registry: Arc<StateRegistry>,
    publisher: P,
    clock: Arc<dyn Clock>,
}

impl<P: EventPublisher> StateFeeder<P> {
    pub fn new(registry: Arc<StateRegistry>, publisher: P, clock: Arc<dyn Clock>) -> Self {
        Self {
            registry,
            publisher,
            clock,
        }
    }

    pub fn observe(&self, observation: &Observation) -> FeedOutcome {
        let now = self.clock.now();
        if !self
            .registry
            .record(&observation.state, now, observation.value)
        {
            tracing::warn!(state = %observation.state, "observation for unknown state");
            return FeedOutcome::UnknownState;
        }
        let listeners = self
            .publisher
            .publish(StateEvent::new(observation.state.clone(), now));
        tracing::debug!(state = %observation.state, value = ?observation.value, listeners, "state observed");
        FeedOutcome::Published(listeners)
    }

    /// # Errors
    ///
    /// Returns [`ObservationError`] when the line is malformed.
    pub fn feed_line(&self, line: &str) -> Result<FeedOutcome, ObservationError> {
        Ok(match Observation::parse_line(line)? {
            Some(observation) => self.observe(&observation),
            None => FeedOutcome::Skipped,
        })
    }
}
