//! Condition trees: boolean expressions over state trackers.
//!
//! A [`ConditionNode`] is compiled once from text (see [`parse`]) and is
//! immutable afterwards. Only the trackers it points at change over time,
//! so the same tree is simply re-evaluated against a new `now`.
//!
//! ```text
//! ([enemy,0,1] | [boss,0,2]) & ![hp,0,5]{0,30}
//! ```

mod parser;

pub use parser::parse;

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::state::StateRecorder;
use crate::time::{Timestamp, seconds_between};

/// Default lower bound, in seconds, when a leaf omits its time window.
pub const DEFAULT_TIME_MIN: f64 = 0.0;
/// Default upper bound, in seconds, when a leaf omits its time window.
pub const DEFAULT_TIME_MAX: f64 = 1.0;

/// A node of a compiled condition expression.
#[derive(Debug, Clone)]
pub enum ConditionNode {
    /// Always satisfied; the compiled form of the empty expression.
    True,
    /// Reads one tracker.
    State(StateLeaf),
    Not(Box<ConditionNode>),
    And(Box<ConditionNode>, Box<ConditionNode>),
    Or(Box<ConditionNode>, Box<ConditionNode>),
}

/// Leaf predicate over one tracker.
///
/// True when the time since the tracker's last record lies in
/// `[time_min, time_max]` and, if a value window is set, the tracker has a
/// value inside `[value_min, value_max]`. Bounds are inclusive.
#[derive(Debug, Clone)]
pub struct StateLeaf {
    pub state: Arc<StateRecorder>,
    pub time_min: f64,
    pub time_max: f64,
    pub value_range: Option<(f64, f64)>,
}

impl StateLeaf {
    /// Leaf with the default `[0, 1]` time window and no value filter.
    #[must_use]
    pub fn new(state: Arc<StateRecorder>) -> Self {
        Self {
            state,
            time_min: DEFAULT_TIME_MIN,
            time_max: DEFAULT_TIME_MAX,
            value_range: None,
        }
    }

    #[must_use]
    pub fn with_time(mut self, time_min: f64, time_max: f64) -> Self {
        self.time_min = time_min;
        self.time_max = time_max;
        self
    }

    #[must_use]
    pub fn with_value(mut self, value_min: f64, value_max: f64) -> Self {
        self.value_range = Some((value_min, value_max));
        self
    }

    #[must_use]
    pub fn in_time_range(&self, now: Timestamp) -> bool {
        let Some(last) = self.state.last_record_time() else {
            return false;
        };
        let elapsed = seconds_between(last, now);
        if elapsed < self.time_min || elapsed > self.time_max {
            return false;
        }
        match self.value_range {
            None => true,
            Some((min, max)) => self
                .state
                .last_value()
                .is_some_and(|value| min <= value && value <= max),
        }
    }
}

impl ConditionNode {
    #[must_use]
    pub fn state(leaf: StateLeaf) -> Self {
        Self::State(leaf)
    }

    #[must_use]
    #[allow(clippy::should_implement_trait)]
    pub fn not(inner: Self) -> Self {
        Self::Not(Box::new(inner))
    }

    #[must_use]
    pub fn and(left: Self, right: Self) -> Self {
        Self::And(Box::new(left), Box::new(right))
    }

    #[must_use]
    pub fn or(left: Self, right: Self) -> Self {
        Self::Or(Box::new(left), Box::new(right))
    }

    /// Evaluate the tree at `now`.
    #[must_use]
    pub fn in_time_range(&self, now: Timestamp) -> bool {
        match self {
            Self::True => true,
            Self::State(leaf) => leaf.in_time_range(now),
            Self::Not(inner) => !inner.in_time_range(now),
            Self::And(left, right) => left.in_time_range(now) && right.in_time_range(now),
            Self::Or(left, right) => left.in_time_range(now) || right.in_time_range(now),
        }
    }

    /// Names of every tracker referenced anywhere in the tree.
    #[must_use]
    pub fn usage_states(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        self.collect_states(&mut names);
        names
    }

    fn collect_states(&self, names: &mut BTreeSet<String>) {
        match self {
            Self::True => {}
            Self::State(leaf) => {
                names.insert(leaf.state.name().to_string());
            }
            Self::Not(inner) => inner.collect_states(names),
            Self::And(left, right) | Self::Or(left, right) => {
                left.collect_states(names);
                right.collect_states(names);
            }
        }
    }

    /// Ask every referenced tracker to release its resources.
    ///
    /// The trackers stay owned by their registry.
    pub fn dispose(&self) {
        match self {
            Self::True => {}
            Self::State(leaf) => leaf.state.dispose(),
            Self::Not(inner) => inner.dispose(),
            Self::And(left, right) | Self::Or(left, right) => {
                left.dispose();
                right.dispose();
            }
        }
    }
}

impl fmt::Display for StateLeaf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}, {}]",
            self.state.name(),
            self.time_min,
            self.time_max
        )?;
        if let Some((min, max)) = self.value_range {
            write!(f, "{{{min}, {max}}}")?;
        }
        Ok(())
    }
}

/// Renders the tree back into the expression language.
///
/// Binary nodes are always parenthesised, so the output parses back into a
/// tree with the same shape. [`ConditionNode::True`] renders as the empty
/// string.
impl fmt::Display for ConditionNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::True => Ok(()),
            Self::State(leaf) => leaf.fmt(f),
            Self::Not(inner) => write!(f, "!{inner}"),
            Self::And(left, right) => write!(f, "({left} & {right})"),
            Self::Or(left, right) => write!(f, "({left} | {right})"),
        }
    }
}
