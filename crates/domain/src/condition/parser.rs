//! Expression parser: compiles condition text into a [`ConditionNode`].
//!
//! ```text
//! expr       := term ( ('&' | '|') term )*
//! term       := '!' term | '(' expr ')' | state_leaf
//! state_leaf := '[' name (',' time_min ',' time_max)? ']' ( '{' value_min (',' value_max)? '}' )?
//! ```
//!
//! The scan keeps a stack of pending operators and a stack of completed
//! operands. Each completed operand immediately reduces whatever operators
//! are waiting for it, so `!` binds to the term on its right and `&`/`|`
//! combine strictly left to right with no precedence between them.

use crate::error::{ParseError, ParseErrorKind};
use crate::state::StateLookup;

use super::{ConditionNode, StateLeaf};

/// Compile `expr`, resolving state names through `states`.
///
/// A blank expression compiles to [`ConditionNode::True`].
///
/// # Errors
///
/// Returns a [`ParseError`] carrying the 1-based character index of the
/// offending token.
pub fn parse<L>(expr: &str, states: &L) -> Result<ConditionNode, ParseError>
where
    L: StateLookup + ?Sized,
{
    if expr.trim().is_empty() {
        return Ok(ConditionNode::True);
    }
    Parser::new(expr, states).run()
}

#[derive(Debug, Clone, Copy)]
enum Pending {
    /// `(` at `position`; `floor` is the operand count when it opened.
    Open { position: usize, floor: usize },
    Not(usize),
    And(usize),
    Or(usize),
}

impl Pending {
    fn missing_operand(self) -> ParseError {
        match self {
            Self::Open { position, .. } => ParseError::new(position, ParseErrorKind::UnclosedParen),
            Self::Not(position) => ParseError::new(position, ParseErrorKind::MissingOperand('!')),
            Self::And(position) => ParseError::new(position, ParseErrorKind::MissingOperand('&')),
            Self::Or(position) => ParseError::new(position, ParseErrorKind::MissingOperand('|')),
        }
    }
}

/// A completed sub-expression and the position where it starts.
struct Operand {
    position: usize,
    node: ConditionNode,
}

struct Parser<'a, L: ?Sized> {
    chars: Vec<char>,
    cursor: usize,
    states: &'a L,
    pending: Vec<Pending>,
    operands: Vec<Operand>,
    after_operand: bool,
}

impl<'a, L> Parser<'a, L>
where
    L: StateLookup + ?Sized,
{
    fn new(expr: &str, states: &'a L) -> Self {
        Self {
            chars: expr.chars().collect(),
            cursor: 0,
            states,
            pending: Vec::new(),
            operands: Vec::new(),
            after_operand: false,
        }
    }

    fn run(mut self) -> Result<ConditionNode, ParseError> {
        while let Some(&c) = self.chars.get(self.cursor) {
            let position = self.cursor + 1;
            match c {
                c if c.is_whitespace() => self.cursor += 1,
                '(' => {
                    if self.after_operand {
                        return Err(ParseError::new(
                            position,
                            ParseErrorKind::UnexpectedOpenParen,
                        ));
                    }
                    self.pending.push(Pending::Open {
                        position,
                        floor: self.operands.len(),
                    });
                    self.cursor += 1;
                }
                ')' => {
                    self.close_group(position)?;
                    self.cursor += 1;
                }
                '!' => {
                    self.pending.push(Pending::Not(position));
                    self.after_operand = false;
                    self.cursor += 1;
                }
                '&' | '|' => {
                    self.push_binary(c, position)?;
                    self.cursor += 1;
                }
                '[' => {
                    let leaf = self.read_leaf(position)?;
                    self.push_operand(position, ConditionNode::State(leaf))?;
                }
                other => {
                    return Err(ParseError::new(
                        position,
                        ParseErrorKind::UnexpectedChar(other),
                    ));
                }
            }
        }
        self.finish()
    }

    /// Operand count below which the innermost open group cannot reach.
    fn floor(&self) -> usize {
        self.pending
            .iter()
            .rev()
            .find_map(|pending| match pending {
                Pending::Open { floor, .. } => Some(*floor),
                _ => None,
            })
            .unwrap_or(0)
    }

    fn push_binary(&mut self, op: char, position: usize) -> Result<(), ParseError> {
        if !self.after_operand || self.operands.len() <= self.floor() {
            return Err(ParseError::new(position, ParseErrorKind::MissingOperand(op)));
        }
        self.pending.push(if op == '&' {
            Pending::And(position)
        } else {
            Pending::Or(position)
        });
        self.after_operand = false;
        Ok(())
    }

    fn push_operand(&mut self, position: usize, node: ConditionNode) -> Result<(), ParseError> {
        self.operands.push(Operand { position, node });
        self.after_operand = true;
        self.reduce()
    }

    fn take_operand(&mut self, pending: Pending) -> Result<Operand, ParseError> {
        if self.operands.len() <= self.floor() {
            return Err(pending.missing_operand());
        }
        self.operands.pop().ok_or_else(|| pending.missing_operand())
    }

    /// Apply every pending operator whose operands are now available.
    fn reduce(&mut self) -> Result<(), ParseError> {
        while let Some(&top) = self.pending.last() {
            match top {
                Pending::Open { .. } => break,
                Pending::Not(position) => {
                    let inner = self.take_operand(top)?;
                    self.pending.pop();
                    self.operands.push(Operand {
                        position,
                        node: ConditionNode::not(inner.node),
                    });
                }
                Pending::And(_) | Pending::Or(_) => {
                    let right = self.take_operand(top)?;
                    let left = self.take_operand(top)?;
                    self.pending.pop();
                    let node = if matches!(top, Pending::And(_)) {
                        ConditionNode::and(left.node, right.node)
                    } else {
                        ConditionNode::or(left.node, right.node)
                    };
                    self.operands.push(Operand {
                        position: left.position,
                        node,
                    });
                }
            }
        }
        Ok(())
    }

    fn close_group(&mut self, position: usize) -> Result<(), ParseError> {
        match self.pending.pop() {
            None => Err(ParseError::new(
                position,
                ParseErrorKind::UnmatchedCloseParen,
            )),
            Some(Pending::Open {
                position: open_position,
                floor,
            }) => {
                let inside = self.operands.len() - floor;
                if inside == 0 {
                    return Err(ParseError::new(position, ParseErrorKind::EmptyParens));
                }
                if inside > 1 {
                    return Err(ParseError::new(
                        self.operands[floor + 1].position,
                        ParseErrorKind::UnconnectedExpressions,
                    ));
                }
                if let Some(group) = self.operands.last_mut() {
                    group.position = open_position;
                }
                self.after_operand = true;
                self.reduce()
            }
            Some(operator) => Err(operator.missing_operand()),
        }
    }

    fn finish(self) -> Result<ConditionNode, ParseError> {
        if let Some(&top) = self.pending.last() {
            return Err(top.missing_operand());
        }
        let mut operands = self.operands.into_iter();
        match (operands.next(), operands.next()) {
            (None, _) => Ok(ConditionNode::True),
            (Some(only), None) => Ok(only.node),
            (Some(_), Some(dangling)) => Err(ParseError::new(
                dangling.position,
                ParseErrorKind::UnconnectedExpressions,
            )),
        }
    }

    fn find(&self, target: char, from: usize) -> Option<usize> {
        self.chars
            .get(from..)?
            .iter()
            .position(|&c| c == target)
            .map(|offset| from + offset)
    }

    fn body(&self, from: usize, to: usize) -> String {
        self.chars[from..to].iter().collect()
    }

    /// Read `[...]` and an optional `{...}`, leaving the cursor after them.
    fn read_leaf(&mut self, position: usize) -> Result<StateLeaf, ParseError> {
        let start = self.cursor + 1;
        let close = self
            .find(']', start)
            .ok_or_else(|| ParseError::new(position, ParseErrorKind::UnterminatedBracket))?;
        let body = self.body(start, close);
        self.cursor = close + 1;

        let fields: Vec<&str> = body.split(',').map(str::trim).collect();
        let (name, window) = match fields.as_slice() {
            [name] => (*name, None),
            [name, min, max] => (
                *name,
                Some((number(min, position)?, number(max, position)?)),
            ),
            _ => {
                return Err(ParseError::new(
                    position,
                    ParseErrorKind::MalformedFields(body.clone()),
                ));
            }
        };
        if name.is_empty() {
            return Err(ParseError::new(
                position,
                ParseErrorKind::MalformedFields(body.clone()),
            ));
        }
        let state = self.states.get_state(name).ok_or_else(|| {
            ParseError::new(position, ParseErrorKind::UnknownState(name.to_string()))
        })?;

        let mut leaf = StateLeaf::new(state);
        if let Some((min, max)) = window {
            leaf = leaf.with_time(min, max);
        }

        let mut lookahead = self.cursor;
        while self.chars.get(lookahead).is_some_and(|c| c.is_whitespace()) {
            lookahead += 1;
        }
        if self.chars.get(lookahead) == Some(&'{') {
            let brace_position = lookahead + 1;
            let close = self.find('}', lookahead + 1).ok_or_else(|| {
                ParseError::new(brace_position, ParseErrorKind::UnterminatedBrace)
            })?;
            let body = self.body(lookahead + 1, close);
            self.cursor = close + 1;

            let fields: Vec<&str> = body.split(',').map(str::trim).collect();
            let (min, max) = match fields.as_slice() {
                [value] => {
                    let value = number(value, brace_position)?;
                    (value, value)
                }
                [min, max] => (number(min, brace_position)?, number(max, brace_position)?),
                _ => {
                    return Err(ParseError::new(
                        brace_position,
                        ParseErrorKind::MalformedFields(body.clone()),
                    ));
                }
            };
            leaf = leaf.with_value(min, max);
        }
        Ok(leaf)
    }
}

fn number(text: &str, position: usize) -> Result<f64, ParseError> {
    text.parse::<f64>()
        .ok()
        .filter(|value| !value.is_nan())
        .ok_or_else(|| ParseError::new(position, ParseErrorKind::InvalidNumber(text.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StateRegistry;
    use crate::time::Timestamp;
    use chrono::DateTime;

    #[allow(clippy::cast_possible_truncation)]
    fn at(secs: f64) -> Timestamp {
        DateTime::from_timestamp_millis((secs * 1000.0).round() as i64).unwrap()
    }

    fn registry() -> StateRegistry {
        StateRegistry::with_states(["a", "b", "c", "s"])
    }

    fn parse_err(expr: &str) -> ParseError {
        parse(expr, &registry()).unwrap_err()
    }

    fn leaf_of(node: &ConditionNode) -> &StateLeaf {
        match node {
            ConditionNode::State(leaf) => leaf,
            other => panic!("expected a state leaf, got {other:?}"),
        }
    }

    #[test]
    fn should_compile_empty_expression_to_true() {
        let registry = registry();
        assert!(matches!(parse("", &registry), Ok(ConditionNode::True)));
        assert!(matches!(parse("   ", &registry), Ok(ConditionNode::True)));
    }

    #[test]
    fn should_default_time_window_to_zero_and_one() {
        let registry = registry();
        let short = parse("[s]", &registry).unwrap();
        let long = parse("[s, 0, 1]", &registry).unwrap();
        let (short, long) = (leaf_of(&short), leaf_of(&long));
        assert!((short.time_min - long.time_min).abs() < f64::EPSILON);
        assert!((short.time_max - long.time_max).abs() < f64::EPSILON);
        assert!(short.value_range.is_none());

        registry.record("s", at(10.0), None);
        for now in [9.0, 10.0, 10.5, 11.0, 11.5] {
            let node = parse("[s]", &registry).unwrap();
            let explicit = parse("[s,0,1]", &registry).unwrap();
            assert_eq!(node.in_time_range(at(now)), explicit.in_time_range(at(now)));
        }
    }

    #[test]
    fn should_parse_time_window_bounds() {
        let registry = registry();
        let node = parse("[s, 2, 5]", &registry).unwrap();
        registry.record("s", at(0.0), None);
        assert!(!node.in_time_range(at(1.0)));
        assert!(node.in_time_range(at(2.0)));
        assert!(node.in_time_range(at(5.0)));
        assert!(!node.in_time_range(at(5.5)));
    }

    #[test]
    fn should_parse_single_and_double_value_bounds() {
        let registry = registry();
        let single = parse("[s]{4}", &registry).unwrap();
        assert_eq!(leaf_of(&single).value_range, Some((4.0, 4.0)));

        let double = parse("[s, 0, 1] { 3, 7 }", &registry).unwrap();
        assert_eq!(leaf_of(&double).value_range, Some((3.0, 7.0)));
    }

    #[test]
    fn should_decide_value_window_on_recorded_value() {
        let registry = registry();
        let node = parse("[s,0,1]{3,7}", &registry).unwrap();

        registry.record("s", at(0.0), None);
        assert!(!node.in_time_range(at(0.5)));

        registry.record("s", at(0.0), Some(5.0));
        assert!(node.in_time_range(at(0.5)));
        assert!(!node.in_time_range(at(2.0)));
    }

    #[test]
    fn should_evaluate_operators() {
        let registry = registry();
        let now = at(100.0);
        registry.record("a", at(99.5), None);
        registry.record("b", at(95.0), None);

        let eval = |expr: &str| parse(expr, &registry).unwrap().in_time_range(now);
        assert!(!eval("[a,0,1] & [b,0,1]"));
        assert!(eval("[a,0,1] | [b,0,1]"));
        assert!(eval("![b,0,1]"));
        assert!(!eval("!![b,0,1]"));
    }

    #[test]
    fn should_group_parenthesised_sub_expressions() {
        let registry = registry();
        let now = at(100.0);
        registry.record("a", at(99.5), None);
        registry.record("b", at(95.0), None);
        registry.record("c", at(90.0), None);

        let eval = |expr: &str| parse(expr, &registry).unwrap().in_time_range(now);
        assert!(eval("([a,0,1] | [b,0,1]) & ![c,0,1]"));
        assert!(eval("((([a,0,1]) | [b,0,1])) & (!([c,0,1]))"));
        assert!(!eval("[a,0,1] & !([b,0,1] | [a,0,1])"));
    }

    #[test]
    fn should_combine_binary_operators_left_to_right() {
        let registry = registry();
        let now = at(100.0);
        registry.record("a", at(99.5), None);

        let node = parse("[a] | [b] & [c]", &registry).unwrap();
        assert!(matches!(node, ConditionNode::And(_, _)));
        assert!(!node.in_time_range(now));

        let grouped = parse("[a] | ([b] & [c])", &registry).unwrap();
        assert!(grouped.in_time_range(now));
    }

    #[test]
    fn should_bind_not_to_the_following_term() {
        let registry = registry();
        let node = parse("![a] & [b]", &registry).unwrap();
        match node {
            ConditionNode::And(left, _) => assert!(matches!(*left, ConditionNode::Not(_))),
            other => panic!("expected And, got {other:?}"),
        }
    }

    #[test]
    fn should_evaluate_identically_after_rendering_and_reparsing() {
        let registry = registry();
        let leaf = |name: &str| StateLeaf::new(registry.get(name).unwrap());
        let original = ConditionNode::or(
            ConditionNode::and(
                ConditionNode::State(leaf("a").with_time(0.0, 2.0)),
                ConditionNode::not(ConditionNode::State(leaf("b").with_value(1.0, 3.0))),
            ),
            ConditionNode::not(ConditionNode::or(
                ConditionNode::State(leaf("c").with_time(0.5, 1.5)),
                ConditionNode::State(leaf("s")),
            )),
        );
        let reparsed = parse(&original.to_string(), &registry).unwrap();
        assert_eq!(reparsed.to_string(), original.to_string());

        let samples = [
            (0.0, None),
            (1.0, Some(2.0)),
            (3.0, Some(0.0)),
            (10.0, Some(5.0)),
        ];
        for (index, (base, value)) in samples.into_iter().enumerate() {
            let offsets = [0.2, 0.7, 1.4, 2.5];
            registry.record("a", at(base), value);
            registry.record("b", at(base + offsets[index % 4]), value);
            registry.record("c", at(base + 0.3), None);
            registry.record("s", at(base - 0.4), value);
            for step in 0..12 {
                let now = at(base + f64::from(step) * 0.25);
                assert_eq!(original.in_time_range(now), reparsed.in_time_range(now));
            }
        }
    }

    #[test]
    fn should_report_unmatched_close_paren_at_its_position() {
        assert_eq!(
            parse_err("[a,0,1])"),
            ParseError::new(8, ParseErrorKind::UnmatchedCloseParen)
        );
    }

    #[test]
    fn should_report_missing_right_operand_at_operator() {
        assert_eq!(
            parse_err("[a,0,1] &"),
            ParseError::new(9, ParseErrorKind::MissingOperand('&'))
        );
    }

    #[test]
    fn should_report_missing_left_operand_at_operator() {
        assert_eq!(
            parse_err("| [a]"),
            ParseError::new(1, ParseErrorKind::MissingOperand('|'))
        );
        assert_eq!(
            parse_err("[a] & & [b]"),
            ParseError::new(7, ParseErrorKind::MissingOperand('&'))
        );
    }

    #[test]
    fn should_report_dangling_not() {
        assert_eq!(
            parse_err("[a] & !"),
            ParseError::new(7, ParseErrorKind::MissingOperand('!'))
        );
    }

    #[test]
    fn should_report_unknown_state_name() {
        assert_eq!(
            parse_err("[unknown]"),
            ParseError::new(1, ParseErrorKind::UnknownState("unknown".to_string()))
        );
    }

    #[test]
    fn should_report_open_paren_after_operand() {
        assert_eq!(
            parse_err("[a] ([b])"),
            ParseError::new(5, ParseErrorKind::UnexpectedOpenParen)
        );
    }

    #[test]
    fn should_report_empty_and_unclosed_parens() {
        assert_eq!(
            parse_err("()"),
            ParseError::new(2, ParseErrorKind::EmptyParens)
        );
        assert_eq!(
            parse_err("([a]"),
            ParseError::new(1, ParseErrorKind::UnclosedParen)
        );
    }

    #[test]
    fn should_report_unterminated_bracket_and_brace() {
        assert_eq!(
            parse_err("[a, 0, 1"),
            ParseError::new(1, ParseErrorKind::UnterminatedBracket)
        );
        assert_eq!(
            parse_err("[a] {3, 7"),
            ParseError::new(5, ParseErrorKind::UnterminatedBrace)
        );
    }

    #[test]
    fn should_report_malformed_numeric_fields() {
        assert_eq!(
            parse_err("[a, x, 1]"),
            ParseError::new(1, ParseErrorKind::InvalidNumber("x".to_string()))
        );
        assert_eq!(
            parse_err("[a, 1]"),
            ParseError::new(1, ParseErrorKind::MalformedFields("a, 1".to_string()))
        );
        assert_eq!(
            parse_err("[a]{1,2,3}"),
            ParseError::new(4, ParseErrorKind::MalformedFields("1,2,3".to_string()))
        );
        assert_eq!(
            parse_err("[a]{nan}"),
            ParseError::new(4, ParseErrorKind::InvalidNumber("nan".to_string()))
        );
    }

    #[test]
    fn should_report_unexpected_characters() {
        assert_eq!(
            parse_err("[a] # [b]"),
            ParseError::new(5, ParseErrorKind::UnexpectedChar('#'))
        );
        assert_eq!(
            parse_err("[a]}"),
            ParseError::new(4, ParseErrorKind::UnexpectedChar('}'))
        );
    }

    #[test]
    fn should_report_unconnected_sub_expressions() {
        assert_eq!(
            parse_err("[a] [b]"),
            ParseError::new(5, ParseErrorKind::UnconnectedExpressions)
        );
        assert_eq!(
            parse_err("[a] ![b]"),
            ParseError::new(5, ParseErrorKind::UnconnectedExpressions)
        );
        assert_eq!(
            parse_err("([a] [b]) & [c]"),
            ParseError::new(6, ParseErrorKind::UnconnectedExpressions)
        );
    }

    #[test]
    fn should_count_positions_in_characters() {
        let registry = StateRegistry::with_states(["é"]);
        assert_eq!(
            parse("[é])", &registry).unwrap_err(),
            ParseError::new(4, ParseErrorKind::UnmatchedCloseParen)
        );
    }
}
