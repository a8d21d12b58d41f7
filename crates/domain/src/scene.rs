//! Scene: a condition tree paired with trigger states, a cooldown and an
//! ordered list of operations.
//!
//! [`SceneConfig`] is the declarative form read from configuration.
//! [`Scene`] is the compiled, immutable form: its condition has been parsed
//! and its operations resolved into whatever runnable type the application
//! layer uses (`A`). The domain never runs operations; it only hands out
//! the list when the condition holds.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::condition::ConditionNode;
use crate::error::ConfigError;
use crate::time::Timestamp;

/// Declarative description of one operation, resolved by the application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationConfig {
    /// Operation type, e.g. `"log"`, `"sleep"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Type-specific parameters.
    #[serde(default)]
    pub params: serde_json::Value,
}

impl OperationConfig {
    #[must_use]
    pub fn new(kind: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            params,
        }
    }
}

/// Declarative description of a scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneConfig {
    pub name: String,
    /// Condition expression; empty means "always".
    #[serde(default)]
    pub condition: String,
    /// State names whose events should evaluate this scene. Empty makes the
    /// scene continuous (polled).
    #[serde(default)]
    pub trigger_states: Vec<String>,
    /// Minimum seconds between two starts of this scene.
    #[serde(default)]
    pub cooldown_secs: f64,
    /// Name of a template whose operations run before this scene's own.
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub operations: Vec<OperationConfig>,
}

impl SceneConfig {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            condition: String::new(),
            trigger_states: Vec::new(),
            cooldown_secs: 0.0,
            template: None,
            operations: Vec::new(),
        }
    }

    #[must_use]
    pub fn condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = condition.into();
        self
    }

    #[must_use]
    pub fn trigger_state(mut self, state: impl Into<String>) -> Self {
        self.trigger_states.push(state.into());
        self
    }

    #[must_use]
    pub fn cooldown_secs(mut self, secs: f64) -> Self {
        self.cooldown_secs = secs;
        self
    }

    #[must_use]
    pub fn template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    #[must_use]
    pub fn operation(mut self, operation: OperationConfig) -> Self {
        self.operations.push(operation);
        self
    }

    /// Cooldown as a [`Duration`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidCooldown`] for a negative, NaN or
    /// infinite `cooldown_secs`.
    pub fn cooldown(&self) -> Result<Duration, ConfigError> {
        Duration::try_from_secs_f64(self.cooldown_secs).map_err(|_| ConfigError::InvalidCooldown {
            scene: self.name.clone(),
            value: self.cooldown_secs.to_string(),
        })
    }
}

/// A compiled scene. Immutable after construction.
#[derive(Debug)]
pub struct Scene<A> {
    name: String,
    condition: ConditionNode,
    trigger_states: Vec<String>,
    cooldown: Duration,
    operations: Vec<A>,
}

impl<A: Clone> Scene<A> {
    /// Assemble and validate a scene.
    ///
    /// Duplicate trigger states are collapsed, keeping first-seen order.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when:
    /// - `name` is empty ([`ConfigError::EmptyName`])
    /// - `operations` is empty ([`ConfigError::NoOperations`])
    /// - a trigger state is never read by `condition`
    ///   ([`ConfigError::UnusedTriggerState`])
    pub fn new(
        name: impl Into<String>,
        condition: ConditionNode,
        trigger_states: Vec<String>,
        cooldown: Duration,
        operations: Vec<A>,
    ) -> Result<Self, ConfigError> {
        let mut seen = BTreeSet::new();
        let trigger_states = trigger_states
            .into_iter()
            .filter(|state| seen.insert(state.clone()))
            .collect();
        let scene = Self {
            name: name.into(),
            condition,
            trigger_states,
            cooldown,
            operations,
        };
        scene.validate()?;
        Ok(scene)
    }

    /// Check scene invariants.
    ///
    /// # Errors
    ///
    /// See [`Scene::new`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::EmptyName);
        }
        if self.operations.is_empty() {
            return Err(ConfigError::NoOperations(self.name.clone()));
        }
        let used = self.condition.usage_states();
        if let Some(state) = self.trigger_states.iter().find(|s| !used.contains(*s)) {
            return Err(ConfigError::UnusedTriggerState {
                scene: self.name.clone(),
                state: state.clone(),
            });
        }
        Ok(())
    }

    /// The operations to run if the condition holds at `now`.
    #[must_use]
    pub fn get_operations(&self, now: Timestamp) -> Option<Vec<A>> {
        self.condition
            .in_time_range(now)
            .then(|| self.operations.clone())
    }
}

impl<A> Scene<A> {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn condition(&self) -> &ConditionNode {
        &self.condition
    }

    #[must_use]
    pub fn trigger_states(&self) -> &[String] {
        &self.trigger_states
    }

    #[must_use]
    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// A scene without trigger states is polled instead of event-driven.
    #[must_use]
    pub fn is_continuous(&self) -> bool {
        self.trigger_states.is_empty()
    }

    /// Cascade disposal into the condition tree's trackers.
    pub fn dispose(&self) {
        self.condition.dispose();
    }
}
