//! Term extraction for conformance expressions.
//!
//! A term is any identifier (`[A-Za-z][A-Za-z0-9_]*`): attribute, command,
//! event and feature codes as well as the conformance abbreviations.

#[cfg(feature = "napi")]
use napi_derive::napi;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref TERM_REGEX: Regex = Regex::new(r"[A-Za-z][A-Za-z0-9_]*").unwrap();
}

/// Lazily yields every term in `expression`, left to right, duplicates included.
pub fn terms(expression: &str) -> impl Iterator<Item = &str> {
    TERM_REGEX.find_iter(expression).map(|m| m.as_str())
}

pub fn get_terms_from_expression(expression: &str) -> Vec<String> {
    terms(expression).map(str::to_string).collect()
}

pub fn check_if_expression_has_term(expression: &str, term: &str) -> bool {
    terms(expression).any(|t| t == term)
}

// ═══════════════════════════════════════════════════════════════════════════════
// NAPI EXPORTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(feature = "napi")]
#[napi]
pub fn get_terms_from_expression_native(expression: String) -> Vec<String> {
    get_terms_from_expression(&expression)
}

#[cfg(feature = "napi")]
#[napi]
pub fn check_if_expression_has_term_native(expression: String, term: String) -> bool {
    check_if_expression_has_term(&expression, &term)
}
