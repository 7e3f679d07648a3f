//! Conformance classification.
//!
//! A conformance string is a comma separated list of alternatives, tried left
//! to right ("otherwise" conformance). Each alternative is one of:
//!
//! - an abbreviation: `M`, `O`, `D`, `X`, `P`
//! - an optional group `[cond]`: optional when `cond` holds, else not supported
//! - a bare condition: mandatory when it holds, else the next alternative is tried
//!
//! Any `desc` term anywhere makes the whole expression descriptive.

#[cfg(feature = "napi")]
use napi_derive::napi;
use tracing::trace;

use crate::boolean::{evaluate_alternatives, evaluate_with_parentheses};
use crate::error::{ConformanceError, ERR_UNBALANCED_BRACKETS, ERR_UNBALANCED_PARENTHESES};
use crate::model::{abbreviation, ConformanceResult, ElementMap};
use crate::options::{EvaluatorOptions, SplitMode};
use crate::terms::terms;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Part<'a> {
    pub text: &'a str,
    /// Byte offset of `text` inside the full expression.
    pub offset: usize,
}

// ═══════════════════════════════════════════════════════════════════════════════
// OTHERWISE SPLIT
// ═══════════════════════════════════════════════════════════════════════════════

fn unbalanced(c: char, expression: &str, offset: usize) -> ConformanceError {
    let code = if c == '(' || c == ')' {
        ERR_UNBALANCED_PARENTHESES
    } else {
        ERR_UNBALANCED_BRACKETS
    };
    ConformanceError::at(
        code,
        format!("unbalanced '{}'", c),
        expression,
        offset,
    )
}

pub(crate) fn split_otherwise(
    expression: &str,
    mode: SplitMode,
) -> Result<Vec<Part<'_>>, ConformanceError> {
    let mut parts = Vec::new();
    let mut start = 0;

    if mode == SplitMode::Legacy {
        for text in expression.split(',') {
            parts.push(Part { text, offset: start });
            start += text.len() + 1;
        }
        return Ok(parts);
    }

    let mut open: Vec<(char, usize)> = Vec::new();
    for (offset, c) in expression.char_indices() {
        match c {
            '(' | '[' => open.push((c, offset)),
            ')' | ']' => {
                let expected = if c == ')' { '(' } else { '[' };
                match open.pop() {
                    Some((opener, _)) if opener == expected => {}
                    _ => return Err(unbalanced(c, expression, offset)),
                }
            }
            ',' if open.is_empty() => {
                parts.push(Part {
                    text: &expression[start..offset],
                    offset: start,
                });
                start = offset + 1;
            }
            _ => {}
        }
    }
    if let Some((opener, offset)) = open.pop() {
        return Err(unbalanced(opener, expression, offset));
    }

    parts.push(Part {
        text: &expression[start..],
        offset: start,
    });
    Ok(parts)
}

/// The first `[...]` group of an alternative, as (inner text, offset of inner text).
fn optional_group(part: &str) -> Result<Option<(&str, usize)>, ConformanceError> {
    if !(part.contains('[') && part.contains(']')) {
        return Ok(None);
    }
    let Some(open) = part.find('[') else {
        return Ok(None);
    };

    let mut depth = 0usize;
    for (offset, c) in part[open..].char_indices() {
        match c {
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    let close = open + offset;
                    let outside = format!("{}{}", &part[..open], &part[close + 1..]);
                    if !outside.trim().is_empty() {
                        trace!(part, "ignoring text outside the optional group");
                    }
                    return Ok(Some((&part[open + 1..close], open + 1)));
                }
            }
            _ => {}
        }
    }

    Err(unbalanced('[', part, open))
}

// ═══════════════════════════════════════════════════════════════════════════════
// EVALUATOR
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default)]
pub struct ConformanceEvaluator {
    options: EvaluatorOptions,
}

impl ConformanceEvaluator {
    pub fn new(options: EvaluatorOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &EvaluatorOptions {
        &self.options
    }

    /// Classify `expression` against the current element states.
    pub fn evaluate(
        &self,
        expression: &str,
        element_map: &ElementMap,
    ) -> Result<ConformanceResult, ConformanceError> {
        // Terms never span a comma, so scanning the whole string is the same
        // as scanning every alternative, and it holds even for malformed input.
        if terms(expression).any(|t| t == abbreviation::DESC) {
            return Ok(ConformanceResult::Desc);
        }

        // Every alternative is parsed, so a malformed one is reported even
        // when an earlier alternative already decides the result.
        let mut decided = None;
        for part in split_otherwise(expression, self.options.split_mode)? {
            let outcome = self
                .evaluate_part(part.text, element_map)
                .map_err(|e| e.rebase(expression, part.offset))?;
            if decided.is_none() {
                decided = outcome;
            }
        }

        Ok(decided.unwrap_or(ConformanceResult::NotSupported))
    }

    /// `None` when the alternative is a condition that does not hold.
    fn evaluate_part(
        &self,
        part: &str,
        element_map: &ElementMap,
    ) -> Result<Option<ConformanceResult>, ConformanceError> {
        if let Some((inner, inner_offset)) = optional_group(part)? {
            let holds = match self.options.split_mode {
                SplitMode::Nested => evaluate_alternatives(inner, element_map),
                SplitMode::Legacy => evaluate_with_parentheses(inner, element_map),
            }
            .map_err(|e| e.rebase(part, inner_offset))?;
            return Ok(Some(if holds {
                ConformanceResult::Optional
            } else {
                ConformanceResult::NotSupported
            }));
        }

        let result = match part.trim() {
            abbreviation::MANDATORY => ConformanceResult::Mandatory,
            abbreviation::OPTIONAL => ConformanceResult::Optional,
            abbreviation::DEPRECATED | abbreviation::DISALLOWED => ConformanceResult::NotSupported,
            abbreviation::PROVISIONAL => ConformanceResult::Provisional,
            _ => {
                if !evaluate_with_parentheses(part, element_map)? {
                    return Ok(None);
                }
                ConformanceResult::Mandatory
            }
        };
        Ok(Some(result))
    }
}

pub fn evaluate_conformance_expression(
    expression: &str,
    element_map: &ElementMap,
) -> Result<ConformanceResult, ConformanceError> {
    ConformanceEvaluator::default().evaluate(expression, element_map)
}

// ═══════════════════════════════════════════════════════════════════════════════
// NAPI EXPORTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(feature = "napi")]
#[napi]
pub fn evaluate_conformance_expression_native(
    expression: String,
    element_map: serde_json::Value,
    options: Option<serde_json::Value>,
) -> napi::Result<String> {
    let element_map =
        crate::model::element_map_from_json(&element_map).map_err(napi::Error::from_reason)?;
    let options = EvaluatorOptions::from_json(options).map_err(napi::Error::from_reason)?;
    ConformanceEvaluator::new(options)
        .evaluate(&expression, &element_map)
        .map(|result| result.as_str().to_string())
        .map_err(|e| napi::Error::from_reason(e.to_string()))
}
