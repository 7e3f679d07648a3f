//! Structured errors for conformance evaluation, feature resolution and PICS lookups.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ═══════════════════════════════════════════════════════════════════════════════
// ERROR CODES
// ═══════════════════════════════════════════════════════════════════════════════

pub const ERR_UNBALANCED_PARENTHESES: &str = "ZAP-ERR-CONF-PAREN";
pub const ERR_UNBALANCED_BRACKETS: &str = "ZAP-ERR-CONF-BRACKET";
pub const ERR_UNEXPECTED_CHARACTER: &str = "ZAP-ERR-CONF-CHAR";
pub const ERR_UNEXPECTED_TOKEN: &str = "ZAP-ERR-CONF-TOKEN";
pub const ERR_RESOLVER_DIVERGED: &str = "ZAP-ERR-RESOLVE-CAP";
pub const ERR_PICS_LOAD: &str = "ZAP-ERR-PICS-LOAD";
pub const ERR_PICS_UNDEFINED: &str = "ZAP-ERR-PICS-UNDEFINED";

fn get_hint(code: &str) -> &'static str {
    match code {
        ERR_UNBALANCED_PARENTHESES => "Every '(' in a conformance expression needs a matching ')'.",
        ERR_UNBALANCED_BRACKETS => {
            "Optional conformance is written as a single balanced '[expr]' group."
        }
        ERR_UNEXPECTED_CHARACTER => {
            "Conformance expressions only use terms, '&', '|', '!', '(', ')', '[', ']' and ','."
        }
        ERR_UNEXPECTED_TOKEN => "Operators need a term or group on each side; terms need an operator between them.",
        ERR_RESOLVER_DIVERGED => {
            "Feature conformance did not settle; check the cluster for features that disable each other."
        }
        ERR_PICS_LOAD => "The PICS metafile must be readable YAML with a top-level PICS list.",
        ERR_PICS_UNDEFINED => "Every PICS code used by a test must be defined in the PICS metafile.",
        _ => "Unknown error.",
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONFORMANCE ERROR
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(rename_all = "camelCase")]
#[error("{code}: {message}{}{}", expression_suffix(.expression), element_suffix(.element))]
pub struct ConformanceError {
    pub code: String,
    pub message: String,
    pub hint: String,
    /// The full conformance (or PICS) expression that failed.
    pub expression: String,
    /// Code of the feature or element the expression belongs to, when known.
    pub element: Option<String>,
    /// Offset of the offending token inside `expression`, in UTF-16 code
    /// units so it indexes the same string on the JS side.
    pub offset: Option<u32>,
}

fn expression_suffix(expression: &str) -> String {
    if expression.is_empty() {
        String::new()
    } else {
        format!(" in `{}`", expression)
    }
}

/// UTF-16 length of `text[..byte_offset]`.
fn utf16_offset(text: &str, byte_offset: usize) -> u32 {
    match text.get(..byte_offset) {
        Some(prefix) => prefix.encode_utf16().count() as u32,
        None => byte_offset as u32,
    }
}

fn element_suffix(element: &Option<String>) -> String {
    match element {
        Some(element) => format!(" (element {})", element),
        None => String::new(),
    }
}

impl ConformanceError {
    pub fn new(code: &str, message: impl Into<String>, expression: &str) -> Self {
        ConformanceError {
            code: code.to_string(),
            message: message.into(),
            hint: get_hint(code).to_string(),
            expression: expression.to_string(),
            element: None,
            offset: None,
        }
    }

    /// `offset` is a byte offset into `expression`.
    pub fn at(code: &str, message: impl Into<String>, expression: &str, offset: usize) -> Self {
        let mut err = Self::new(code, message, expression);
        err.offset = Some(utf16_offset(expression, offset));
        err
    }

    pub fn with_element(mut self, element: &str) -> Self {
        self.element = Some(element.to_string());
        self
    }

    /// Re-anchor an error raised on a slice of a larger expression.
    /// `base` is the byte offset of the slice inside `expression`.
    pub(crate) fn rebase(mut self, expression: &str, base: usize) -> Self {
        let shift = utf16_offset(expression, base);
        self.expression = expression.to_string();
        self.offset = self.offset.map(|offset| offset + shift);
        self
    }

    pub fn is_parse_error(&self) -> bool {
        matches!(
            self.code.as_str(),
            ERR_UNBALANCED_PARENTHESES
                | ERR_UNBALANCED_BRACKETS
                | ERR_UNEXPECTED_CHARACTER
                | ERR_UNEXPECTED_TOKEN
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_expression_and_element() {
        let err = ConformanceError::at(ERR_UNEXPECTED_TOKEN, "dangling operator", "A &", 2)
            .with_element("LT");
        let rendered = err.to_string();
        assert!(rendered.starts_with("ZAP-ERR-CONF-TOKEN: dangling operator"));
        assert!(rendered.contains("`A &`"));
        assert!(rendered.ends_with("(element LT)"));
        assert_eq!(err.offset, Some(2));
        assert!(err.is_parse_error());
    }

    #[test]
    fn test_rebase_shifts_offset() {
        let err = ConformanceError::at(ERR_UNEXPECTED_CHARACTER, "unexpected '#'", "B #", 2)
            .rebase("A, B #", 3);
        assert_eq!(err.expression, "A, B #");
        assert_eq!(err.offset, Some(5));
    }

    #[test]
    fn test_offsets_count_utf16_units() {
        // 'é' is two bytes but one UTF-16 unit; '𝒜' is four bytes and two units.
        let err = ConformanceError::at(ERR_UNEXPECTED_CHARACTER, "unexpected '#'", "é #", 3);
        assert_eq!(err.offset, Some(2));

        let err = ConformanceError::at(ERR_UNEXPECTED_CHARACTER, "unexpected '#'", "B #", 2)
            .rebase("𝒜, B #", 6);
        assert_eq!(err.offset, Some(6));
    }

    #[test]
    fn test_display_skips_empty_expression() {
        let err = ConformanceError::new(ERR_RESOLVER_DIVERGED, "still changing", "");
        assert_eq!(err.to_string(), "ZAP-ERR-RESOLVE-CAP: still changing");
    }

    #[test]
    fn test_hint_follows_code() {
        let err = ConformanceError::new(ERR_RESOLVER_DIVERGED, "too many passes", "");
        assert!(err.hint.contains("did not settle"));
        assert!(!err.is_parse_error());
    }
}
