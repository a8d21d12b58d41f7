//! Common error types used across the workspace.
//!
//! Each layer defines its own typed errors and converts into [`TriggerError`]
//! via `#[from]`. Parse and configuration errors are fatal to initialisation;
//! [`OperationError`]s stay inside the task that raised them.

use std::fmt;

/// Top-level error returned when building scenes or initialising a dispatcher.
#[derive(Debug, thiserror::Error)]
pub enum TriggerError {
    /// A condition expression could not be compiled.
    #[error("invalid condition expression in scene {scene:?}")]
    Parse {
        scene: String,
        #[source]
        source: ParseError,
    },

    /// The scene set is inconsistent.
    #[error("invalid scene configuration")]
    Config(#[from] ConfigError),

    /// An operation entry could not be turned into a runnable operation.
    #[error("failed to resolve operation {kind:?} in scene {scene:?}")]
    Resolve {
        scene: String,
        kind: String,
        #[source]
        source: OperationError,
    },
}

/// A malformed condition expression, with the 1-based character index of
/// the offending token.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind} at position {position}")]
pub struct ParseError {
    pub position: usize,
    pub kind: ParseErrorKind,
}

impl ParseError {
    #[must_use]
    pub fn new(position: usize, kind: ParseErrorKind) -> Self {
        Self { position, kind }
    }
}

/// What went wrong while parsing an expression.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseErrorKind {
    /// `(` directly follows an operand.
    UnexpectedOpenParen,
    /// `(` never closed.
    UnclosedParen,
    /// `)` without a matching `(`.
    UnmatchedCloseParen,
    /// `()` enclosing no operand.
    EmptyParens,
    /// `[` without a closing `]`.
    UnterminatedBracket,
    /// `{` without a closing `}`.
    UnterminatedBrace,
    /// Wrong number of comma-separated fields inside `[...]` or `{...}`.
    MalformedFields(String),
    /// A numeric field failed to parse.
    InvalidNumber(String),
    /// The state name is not known to the lookup.
    UnknownState(String),
    /// `!`, `&` or `|` lacks an operand.
    MissingOperand(char),
    /// A character outside the expression alphabet.
    UnexpectedChar(char),
    /// Two sub-expressions with no operator between them.
    UnconnectedExpressions,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedOpenParen => f.write_str("'(' follows an operand without an operator"),
            Self::UnclosedParen => f.write_str("unclosed '('"),
            Self::UnmatchedCloseParen => f.write_str("unmatched ')'"),
            Self::EmptyParens => f.write_str("empty parentheses"),
            Self::UnterminatedBracket => f.write_str("unterminated '['"),
            Self::UnterminatedBrace => f.write_str("unterminated '{'"),
            Self::MalformedFields(body) => write!(f, "malformed fields {body:?}"),
            Self::InvalidNumber(text) => write!(f, "invalid number {text:?}"),
            Self::UnknownState(name) => write!(f, "unknown state {name:?}"),
            Self::MissingOperand(op) => write!(f, "operator '{op}' is missing an operand"),
            Self::UnexpectedChar(c) => write!(f, "unexpected character {c:?}"),
            Self::UnconnectedExpressions => {
                f.write_str("sub-expressions are not connected by an operator")
            }
        }
    }
}

/// Inconsistencies in the scene set detected at initialisation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("trigger state {state:?} is claimed by both {first:?} and {second:?}")]
    DuplicateTriggerState {
        state: String,
        first: String,
        second: String,
    },

    #[error("only one continuous scene is allowed, found {first:?} and {second:?}")]
    MultipleContinuousScenes { first: String, second: String },

    #[error("scene {scene:?} triggers on {state:?} but its condition never reads it")]
    UnusedTriggerState { scene: String, state: String },

    #[error("scene {scene:?} references unknown template {template:?}")]
    UnknownTemplate { scene: String, template: String },

    #[error("scene {0:?} has no operations")]
    NoOperations(String),

    #[error("scene {scene:?} has invalid cooldown {value}, expected a finite number of seconds >= 0")]
    InvalidCooldown { scene: String, value: String },

    #[error("scene name must not be empty")]
    EmptyName,

    #[error("dispatcher has been disposed")]
    Disposed,

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Failure of a single operation while a task runs.
#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    /// The operation type is not known to the resolver.
    #[error("unknown operation type {0:?}")]
    UnknownKind(String),

    /// The operation parameters are unusable.
    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    /// The operation ran and failed.
    #[error("operation failed: {0}")]
    Failed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_render_position_in_parse_error() {
        let err = ParseError::new(8, ParseErrorKind::UnmatchedCloseParen);
        assert_eq!(err.to_string(), "unmatched ')' at position 8");
    }

    #[test]
    fn should_convert_config_error_into_trigger_error() {
        let err: TriggerError = ConfigError::NoOperations("idle".to_string()).into();
        assert!(matches!(err, TriggerError::Config(ConfigError::NoOperations(_))));
    }

    #[test]
    fn should_expose_parse_error_as_source() {
        let err = TriggerError::Parse {
            scene: "combat".to_string(),
            source: ParseError::new(1, ParseErrorKind::UnknownState("hp".to_string())),
        };
        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "unknown state \"hp\" at position 1");
    }
}
