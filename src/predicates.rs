//! Predicates the application layer uses to gate automatic updates.

#[cfg(feature = "napi")]
use napi_derive::napi;
use serde_json::Value;

use crate::model::{abbreviation, ElementMap};
use crate::terms::terms;

/// Anything that carries a conformance string.
pub trait HasConformance {
    fn conformance(&self) -> &str;
}

impl HasConformance for Value {
    fn conformance(&self) -> &str {
        self.get("conformance").and_then(Value::as_str).unwrap_or("")
    }
}

impl HasConformance for String {
    fn conformance(&self) -> &str {
        self
    }
}

/// Terms that are neither keys of `element_map` nor conformance abbreviations.
///
/// Each missing term is reported once, in order of first appearance. A
/// non-empty result means the expression depends on elements with unknown
/// values and should not drive automatic changes.
pub fn check_missing_terms(expression: &str, element_map: &ElementMap) -> Vec<String> {
    let mut missing: Vec<String> = Vec::new();
    for term in terms(expression) {
        if element_map.contains_key(term) || abbreviation::is_abbreviation(term) {
            continue;
        }
        if !missing.iter().any(|m| m == term) {
            missing.push(term.to_string());
        }
    }
    missing
}

/// Elements with descriptive conformance that mention any of `feature_codes`.
pub fn filter_related_desc_elements<'e, E, S>(elements: &'e [E], feature_codes: &[S]) -> Vec<&'e E>
where
    E: HasConformance,
    S: AsRef<str>,
{
    elements
        .iter()
        .filter(|element| {
            let element_terms: Vec<&str> = terms(element.conformance()).collect();
            element_terms.contains(&abbreviation::DESC)
                && feature_codes
                    .iter()
                    .any(|code| element_terms.contains(&code.as_ref()))
        })
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════════════
// NAPI EXPORTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(feature = "napi")]
#[napi]
pub fn check_missing_terms_native(
    expression: String,
    element_map: serde_json::Value,
) -> napi::Result<Vec<String>> {
    let element_map =
        crate::model::element_map_from_json(&element_map).map_err(napi::Error::from_reason)?;
    Ok(check_missing_terms(&expression, &element_map))
}

#[cfg(feature = "napi")]
#[napi]
pub fn filter_related_desc_elements_native(
    elements: Vec<serde_json::Value>,
    feature_codes: Vec<String>,
) -> Vec<serde_json::Value> {
    filter_related_desc_elements(&elements, &feature_codes)
        .into_iter()
        .cloned()
        .collect()
}
