//! Boolean evaluation of conformance conditions.
//!
//! Terms read their value from an [`ElementMap`] (absent terms are false) and
//! combine with `!`, `&` and `|`. `!` binds tightest, then `&`, then `|`.
//! Parenthesised groups are resolved innermost first by a stack of frames;
//! each closed group collapses to a literal in its parent frame before the
//! flat reducer runs. Inside a group, `,` separates alternatives and the
//! group holds when any of them does. Expressions are never handed to a
//! general-purpose interpreter.

use crate::error::{
    ConformanceError, ERR_UNBALANCED_BRACKETS, ERR_UNBALANCED_PARENTHESES,
    ERR_UNEXPECTED_CHARACTER, ERR_UNEXPECTED_TOKEN,
};
use crate::model::{is_enabled, ElementMap};

// ═══════════════════════════════════════════════════════════════════════════════
// TOKENS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind<'a> {
    Term(&'a str),
    /// A group that has already been reduced.
    Literal(bool),
    Not,
    And,
    Or,
    LParen,
    RParen,
    Comma,
}

#[derive(Debug, Clone, Copy)]
struct Token<'a> {
    kind: TokenKind<'a>,
    offset: usize,
}

fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Term(name) => format!("term '{}'", name),
        TokenKind::Literal(_) => "parenthesised group".to_string(),
        TokenKind::Not => "'!'".to_string(),
        TokenKind::And => "'&'".to_string(),
        TokenKind::Or => "'|'".to_string(),
        TokenKind::LParen => "'('".to_string(),
        TokenKind::RParen => "')'".to_string(),
        TokenKind::Comma => "','".to_string(),
    }
}

fn tokenize(expression: &str) -> Result<Vec<Token<'_>>, ConformanceError> {
    let mut tokens = Vec::new();
    let mut chars = expression.char_indices().peekable();

    while let Some((offset, c)) = chars.next() {
        let kind = match c {
            c if c.is_whitespace() => continue,
            c if c.is_ascii_alphabetic() => {
                let mut end = offset + 1;
                while let Some(&(next, n)) = chars.peek() {
                    if n.is_ascii_alphanumeric() || n == '_' {
                        end = next + 1;
                        chars.next();
                    } else {
                        break;
                    }
                }
                TokenKind::Term(&expression[offset..end])
            }
            '!' => TokenKind::Not,
            '&' | '|' => {
                // `&&` and `||` read the same as their single forms.
                if chars.peek().map(|&(_, n)| n) == Some(c) {
                    chars.next();
                }
                if c == '&' {
                    TokenKind::And
                } else {
                    TokenKind::Or
                }
            }
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '[' | ']' => {
                return Err(ConformanceError::at(
                    ERR_UNBALANCED_BRACKETS,
                    format!("unexpected '{}' inside a condition", c),
                    expression,
                    offset,
                ))
            }
            ',' => TokenKind::Comma,
            other => {
                return Err(ConformanceError::at(
                    ERR_UNEXPECTED_CHARACTER,
                    format!("unexpected character '{}'", other),
                    expression,
                    offset,
                ))
            }
        };
        tokens.push(Token { kind, offset });
    }

    Ok(tokens)
}

// ═══════════════════════════════════════════════════════════════════════════════
// FLAT REDUCTION
// ═══════════════════════════════════════════════════════════════════════════════

struct FlatReducer<'t, 'a> {
    tokens: &'t [Token<'a>],
    pos: usize,
    expression: &'a str,
    element_map: &'t ElementMap,
}

impl<'t, 'a> FlatReducer<'t, 'a> {
    fn reduce(
        tokens: &'t [Token<'a>],
        expression: &'a str,
        element_map: &'t ElementMap,
    ) -> Result<bool, ConformanceError> {
        if tokens.is_empty() {
            return Ok(false);
        }
        let mut reducer = FlatReducer {
            tokens,
            pos: 0,
            expression,
            element_map,
        };
        let value = reducer.or()?;
        if let Some(token) = reducer.tokens.get(reducer.pos) {
            return Err(ConformanceError::at(
                ERR_UNEXPECTED_TOKEN,
                format!("unexpected {} after a complete condition", describe(&token.kind)),
                expression,
                token.offset,
            ));
        }
        Ok(value)
    }

    fn peek(&self) -> Option<&Token<'a>> {
        self.tokens.get(self.pos)
    }

    // Both sides are always reduced so a malformed right operand is reported
    // even when the left side already decides the result.
    fn or(&mut self) -> Result<bool, ConformanceError> {
        let mut value = self.and()?;
        while matches!(self.peek().map(|t| t.kind), Some(TokenKind::Or)) {
            self.pos += 1;
            let rhs = self.and()?;
            value |= rhs;
        }
        Ok(value)
    }

    fn and(&mut self) -> Result<bool, ConformanceError> {
        let mut value = self.unary()?;
        while matches!(self.peek().map(|t| t.kind), Some(TokenKind::And)) {
            self.pos += 1;
            let rhs = self.unary()?;
            value &= rhs;
        }
        Ok(value)
    }

    fn unary(&mut self) -> Result<bool, ConformanceError> {
        let mut negate = false;
        while matches!(self.peek().map(|t| t.kind), Some(TokenKind::Not)) {
            negate = !negate;
            self.pos += 1;
        }
        Ok(self.atom()? != negate)
    }

    fn atom(&mut self) -> Result<bool, ConformanceError> {
        let Some(token) = self.tokens.get(self.pos).copied() else {
            let offset = self
                .tokens
                .last()
                .map(|t| t.offset)
                .unwrap_or(self.expression.len());
            return Err(ConformanceError::at(
                ERR_UNEXPECTED_TOKEN,
                "expected a term after the last operator",
                self.expression,
                offset,
            ));
        };
        self.pos += 1;
        match token.kind {
            TokenKind::Term(name) => Ok(is_enabled(self.element_map, name)),
            TokenKind::Literal(value) => Ok(value),
            TokenKind::LParen | TokenKind::RParen => Err(ConformanceError::at(
                ERR_UNBALANCED_PARENTHESES,
                "parentheses must be resolved before flat evaluation",
                self.expression,
                token.offset,
            )),
            kind => Err(ConformanceError::at(
                ERR_UNEXPECTED_TOKEN,
                format!("expected a term, found {}", describe(&kind)),
                self.expression,
                token.offset,
            )),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PUBLIC API
// ═══════════════════════════════════════════════════════════════════════════════

/// Evaluate a condition without parentheses. An empty condition is false.
pub fn evaluate_boolean(expression: &str, element_map: &ElementMap) -> Result<bool, ConformanceError> {
    let tokens = tokenize(expression)?;
    FlatReducer::reduce(&tokens, expression, element_map)
}

/// Evaluate a condition, resolving parenthesised groups innermost first.
/// Commas are only accepted inside a group.
pub fn evaluate_with_parentheses(
    expression: &str,
    element_map: &ElementMap,
) -> Result<bool, ConformanceError> {
    evaluate_grouped(expression, element_map, false)
}

/// Evaluate the inside of an optional group, where top-level commas also
/// separate alternatives.
pub fn evaluate_alternatives(
    expression: &str,
    element_map: &ElementMap,
) -> Result<bool, ConformanceError> {
    evaluate_grouped(expression, element_map, true)
}

/// An open group: where its '(' sits, the alternatives already reduced and the
/// tokens seen since the last ','.
struct Group<'a> {
    open: usize,
    alternatives: Vec<bool>,
    last_comma: Option<usize>,
    tokens: Vec<Token<'a>>,
}

impl<'a> Group<'a> {
    fn new(open: usize) -> Self {
        Group {
            open,
            alternatives: Vec::new(),
            last_comma: None,
            tokens: Vec::new(),
        }
    }

    fn is_empty(&self) -> bool {
        self.tokens.is_empty() && self.alternatives.is_empty()
    }

    fn push_alternative(
        &mut self,
        comma: usize,
        expression: &'a str,
        element_map: &ElementMap,
    ) -> Result<(), ConformanceError> {
        if self.tokens.is_empty() {
            return Err(ConformanceError::at(
                ERR_UNEXPECTED_TOKEN,
                "expected a condition before ','",
                expression,
                comma,
            ));
        }
        let value = FlatReducer::reduce(&self.tokens, expression, element_map)?;
        self.alternatives.push(value);
        self.tokens.clear();
        self.last_comma = Some(comma);
        Ok(())
    }

    fn value(self, expression: &'a str, element_map: &ElementMap) -> Result<bool, ConformanceError> {
        if let Some(comma) = self.last_comma {
            if self.tokens.is_empty() {
                return Err(ConformanceError::at(
                    ERR_UNEXPECTED_TOKEN,
                    "expected a condition after ','",
                    expression,
                    comma,
                ));
            }
        }
        let last = FlatReducer::reduce(&self.tokens, expression, element_map)?;
        Ok(last || self.alternatives.contains(&true))
    }
}

fn evaluate_grouped(
    expression: &str,
    element_map: &ElementMap,
    top_level_alternatives: bool,
) -> Result<bool, ConformanceError> {
    let tokens = tokenize(expression)?;
    let mut frames: Vec<Group> = vec![Group::new(0)];

    for token in tokens {
        match token.kind {
            TokenKind::LParen => frames.push(Group::new(token.offset)),
            TokenKind::RParen => {
                let group = match frames.pop() {
                    Some(group) if !frames.is_empty() => group,
                    _ => {
                        return Err(ConformanceError::at(
                            ERR_UNBALANCED_PARENTHESES,
                            "')' has no matching '('",
                            expression,
                            token.offset,
                        ))
                    }
                };
                if group.is_empty() {
                    return Err(ConformanceError::at(
                        ERR_UNEXPECTED_TOKEN,
                        "empty parentheses",
                        expression,
                        group.open,
                    ));
                }
                let open = group.open;
                let value = group.value(expression, element_map)?;
                if let Some(parent) = frames.last_mut() {
                    parent.tokens.push(Token {
                        kind: TokenKind::Literal(value),
                        offset: open,
                    });
                }
            }
            TokenKind::Comma => {
                if frames.len() == 1 && !top_level_alternatives {
                    return Err(ConformanceError::at(
                        ERR_UNEXPECTED_TOKEN,
                        "unexpected ',' outside a group",
                        expression,
                        token.offset,
                    ));
                }
                if let Some(group) = frames.last_mut() {
                    group.push_alternative(token.offset, expression, element_map)?;
                }
            }
            _ => {
                if let Some(group) = frames.last_mut() {
                    group.tokens.push(token);
                }
            }
        }
    }

    if frames.len() > 1 {
        let open = frames.last().map(|group| group.open).unwrap_or(0);
        return Err(ConformanceError::at(
            ERR_UNBALANCED_PARENTHESES,
            "'(' is never closed",
            expression,
            open,
        ));
    }

    match frames.pop() {
        Some(root) => root.value(expression, element_map),
        None => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, bool)]) -> ElementMap {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_flat_operators() {
        let m = map(&[("A", true), ("B", false)]);
        assert!(evaluate_boolean("A", &m).unwrap());
        assert!(!evaluate_boolean("A & B", &m).unwrap());
        assert!(evaluate_boolean("A | B", &m).unwrap());
        assert!(evaluate_boolean("!B", &m).unwrap());
        assert!(evaluate_boolean("!!A", &m).unwrap());
        assert!(evaluate_boolean("A && !B", &m).unwrap());
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        let m = map(&[("A", true), ("B", false), ("C", false)]);
        // A | (B & C), not (A | B) & C
        assert!(evaluate_boolean("A | B & C", &m).unwrap());
        assert!(!evaluate_boolean("B & C | B", &m).unwrap());
    }

    #[test]
    fn test_unknown_terms_are_false() {
        let m = ElementMap::new();
        assert!(!evaluate_boolean("Missing", &m).unwrap());
        assert!(evaluate_boolean("!Missing", &m).unwrap());
    }

    #[test]
    fn test_empty_condition_is_false() {
        assert!(!evaluate_boolean("", &ElementMap::new()).unwrap());
        assert!(!evaluate_with_parentheses("   ", &ElementMap::new()).unwrap());
    }

    #[test]
    fn test_parentheses() {
        let m = map(&[("A", true), ("B", true), ("C", false)]);
        assert!(evaluate_with_parentheses("A & (!B | !C)", &m).unwrap());
        assert!(!evaluate_with_parentheses("(A | C) & !(B & (A | C))", &m).unwrap());
        assert!(evaluate_with_parentheses("((((A))))", &m).unwrap());
        assert!(!evaluate_with_parentheses("!(A)", &m).unwrap());
    }

    #[test]
    fn test_flat_rejects_parentheses() {
        let err = evaluate_boolean("(A)", &ElementMap::new()).unwrap_err();
        assert_eq!(err.code, ERR_UNBALANCED_PARENTHESES);
    }

    #[test]
    fn test_unbalanced_parentheses() {
        let err = evaluate_with_parentheses("A & (B | C", &ElementMap::new()).unwrap_err();
        assert_eq!(err.code, ERR_UNBALANCED_PARENTHESES);
        assert_eq!(err.offset, Some(4));

        let err = evaluate_with_parentheses("A) & (B", &ElementMap::new()).unwrap_err();
        assert_eq!(err.code, ERR_UNBALANCED_PARENTHESES);
        assert_eq!(err.offset, Some(1));
    }

    #[test]
    fn test_malformed_sequences() {
        let m = map(&[("A", true)]);
        for expr in ["A B", "A &", "& A", "A | | A", "()", "A (B)", "!"] {
            let err = evaluate_with_parentheses(expr, &m).unwrap_err();
            assert_eq!(err.code, ERR_UNEXPECTED_TOKEN, "{}", expr);
            assert_eq!(err.expression, expr);
        }
    }

    #[test]
    fn test_right_operand_errors_are_not_short_circuited() {
        let m = map(&[("A", true)]);
        assert!(evaluate_with_parentheses("A | (B &)", &m).is_err());
    }

    #[test]
    fn test_commas_separate_alternatives_inside_groups() {
        let m = map(&[("A", true), ("C", true)]);
        assert!(evaluate_with_parentheses("A & (B, C)", &m).unwrap());
        assert!(!evaluate_with_parentheses("A & (B, D)", &m).unwrap());
        assert!(!evaluate_with_parentheses("!(B, (D, C & A))", &m).unwrap());

        let err = evaluate_with_parentheses("A, B", &m).unwrap_err();
        assert_eq!(err.code, ERR_UNEXPECTED_TOKEN);
        assert_eq!(err.offset, Some(1));
    }

    #[test]
    fn test_top_level_alternatives() {
        let m = map(&[("B", true)]);
        assert!(evaluate_alternatives("A, B", &m).unwrap());
        assert!(!evaluate_alternatives("A, (C | D)", &m).unwrap());
        assert!(!evaluate_alternatives("", &m).unwrap());
    }

    #[test]
    fn test_empty_alternatives_are_rejected() {
        let m = map(&[("A", true)]);
        for (expr, offset) in [("(A,)", 2), ("(, A)", 1), ("A,", 1), ("A,, B", 2)] {
            let err = evaluate_alternatives(expr, &m).unwrap_err();
            assert_eq!(err.code, ERR_UNEXPECTED_TOKEN, "{}", expr);
            assert_eq!(err.offset, Some(offset), "{}", expr);
        }
    }

    #[test]
    fn test_unrecognised_operators() {
        let err = evaluate_boolean("A == B", &ElementMap::new()).unwrap_err();
        assert_eq!(err.code, ERR_UNEXPECTED_CHARACTER);
        assert_eq!(err.offset, Some(2));

        let err = evaluate_boolean("A & 1", &ElementMap::new()).unwrap_err();
        assert_eq!(err.code, ERR_UNEXPECTED_CHARACTER);

        let err = evaluate_boolean("A & [B]", &ElementMap::new()).unwrap_err();
        assert_eq!(err.code, ERR_UNBALANCED_BRACKETS);
    }
}
