//! Feature dependency resolution.
//!
//! When a feature is toggled, other features whose conformance mentions it may
//! become mandatory or unsupported. Those are flipped, which may in turn affect
//! more features, until a pass changes nothing.
//!
//! A key that has been settled (seeded by the caller or flipped by a pass) is
//! never revisited, so every pass that changes something settles at least one
//! new key. The loop is still capped to report a diagnostic instead of spinning
//! if that ever stops holding.

#[cfg(feature = "napi")]
use napi_derive::napi;
use std::collections::HashSet;
use tracing::{debug, trace, warn};

use crate::classifier::ConformanceEvaluator;
use crate::error::{ConformanceError, ERR_RESOLVER_DIVERGED};
use crate::model::{is_enabled, ConformanceResult, ElementMap, FeatureConformanceTable, FeatureUpdate};
use crate::options::EvaluatorOptions;
use crate::terms::terms;

pub struct FeatureResolver {
    evaluator: ConformanceEvaluator,
}

impl FeatureResolver {
    pub fn new(options: EvaluatorOptions) -> Self {
        Self {
            evaluator: ConformanceEvaluator::new(options),
        }
    }

    pub fn with_evaluator(evaluator: ConformanceEvaluator) -> Self {
        Self { evaluator }
    }

    /// Propagate the changes recorded in `update` through `table`.
    ///
    /// `element_map` is updated in place with every flipped feature; the
    /// returned accumulator holds `update` plus the new changes.
    pub fn resolve(
        &self,
        table: &FeatureConformanceTable,
        element_map: &mut ElementMap,
        mut update: FeatureUpdate,
    ) -> Result<FeatureUpdate, ConformanceError> {
        let max_passes = self
            .evaluator
            .options()
            .max_passes
            .unwrap_or(table.len() + 1)
            .max(1);
        let mut settled: HashSet<String> = update.updated_keys.iter().cloned().collect();

        for pass in 1..=max_passes {
            let mut changed = false;

            for (key, expression) in table.iter() {
                if settled.contains(key) {
                    continue;
                }
                if !terms(expression).any(|term| settled.contains(term)) {
                    continue;
                }

                let conformance = self
                    .evaluator
                    .evaluate(expression, element_map)
                    .map_err(|e| e.with_element(key))?;
                trace!(key, %conformance, expression, "feature conformance");

                let enabled = is_enabled(element_map, key);
                let target = match conformance {
                    ConformanceResult::Mandatory if !enabled => true,
                    ConformanceResult::NotSupported if enabled => false,
                    _ => continue,
                };

                debug!(key, enabled = target, %conformance, "feature updated by conformance");
                element_map.insert(key.to_string(), target);
                settled.insert(key.to_string());
                update.record(key, target);
                changed = true;
            }

            if !changed {
                debug!(passes = pass, updated = update.updated_features.len(), "feature conformance settled");
                return Ok(update);
            }
        }

        warn!(max_passes, "feature conformance did not settle");
        Err(ConformanceError::new(
            ERR_RESOLVER_DIVERGED,
            format!(
                "feature conformance still changing after {} passes (last settled: {})",
                max_passes,
                update.updated_keys.join(", ")
            ),
            "",
        ))
    }
}

impl Default for FeatureResolver {
    fn default() -> Self {
        Self::new(EvaluatorOptions::default())
    }
}

pub fn fix_feature_conformance_recursively(
    table: &FeatureConformanceTable,
    element_map: &mut ElementMap,
    update: FeatureUpdate,
) -> Result<FeatureUpdate, ConformanceError> {
    FeatureResolver::default().resolve(table, element_map, update)
}

// ═══════════════════════════════════════════════════════════════════════════════
// NAPI EXPORTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Returns `{ updatedFeatures, updatedKeys, elementMap }`; the host applies the
/// returned map since JS objects are not mutated across the bridge.
#[cfg(feature = "napi")]
#[napi]
pub fn fix_feature_conformance_recursively_native(
    feature_conformance: serde_json::Value,
    element_map: serde_json::Value,
    updated_keys: Option<Vec<String>>,
    updated_features: Option<serde_json::Value>,
    options: Option<serde_json::Value>,
) -> napi::Result<serde_json::Value> {
    let table: FeatureConformanceTable = serde_json::from_value(feature_conformance)
        .map_err(|e| napi::Error::from_reason(format!("Invalid feature conformance: {}", e)))?;
    let mut element_map =
        crate::model::element_map_from_json(&element_map).map_err(napi::Error::from_reason)?;
    let mut update = FeatureUpdate::seeded(updated_keys.unwrap_or_default());
    if let Some(features) = updated_features {
        update.updated_features = serde_json::from_value(features)
            .map_err(|e| napi::Error::from_reason(format!("Invalid updated features: {}", e)))?;
    }
    let options = EvaluatorOptions::from_json(options).map_err(napi::Error::from_reason)?;

    let update = FeatureResolver::new(options)
        .resolve(&table, &mut element_map, update)
        .map_err(|e| napi::Error::from_reason(e.to_string()))?;

    Ok(serde_json::json!({
        "updatedFeatures": update.updated_features,
        "updatedKeys": update.updated_keys,
        "elementMap": element_map,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, bool)]) -> ElementMap {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn table(pairs: &[(&str, &str)]) -> FeatureConformanceTable {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_nothing_happens_without_a_seed() {
        let t = table(&[("LT", "OO"), ("OO", "M")]);
        let mut m = map(&[("OO", true), ("LT", false)]);
        let update = fix_feature_conformance_recursively(&t, &mut m, FeatureUpdate::new()).unwrap();
        assert_eq!(update, FeatureUpdate::new());
        assert!(!m["LT"]);
    }

    #[test]
    fn test_enables_mandatory_dependants() {
        let t = table(&[("OO", "O"), ("LT", "OO")]);
        let mut m = map(&[("OO", true), ("LT", false)]);
        let update =
            fix_feature_conformance_recursively(&t, &mut m, FeatureUpdate::seeded(["OO"])).unwrap();
        assert_eq!(update.updated_keys, vec!["OO", "LT"]);
        assert_eq!(update.updated_features.get("LT"), Some(&true));
        assert!(!update.updated_features.contains_key("OO"));
        assert!(m["LT"]);
    }

    #[test]
    fn test_disables_unsupported_dependants() {
        let t = table(&[("A", "O"), ("B", "[A]")]);
        let mut m = map(&[("A", false), ("B", true)]);
        let update =
            fix_feature_conformance_recursively(&t, &mut m, FeatureUpdate::seeded(["A"])).unwrap();
        assert_eq!(update.updated_features.get("B"), Some(&false));
        assert!(!m["B"]);
    }

    #[test]
    fn test_cascades_through_chains() {
        // A -> B -> C -> D, each mandatory when its predecessor is on
        let t = table(&[("D", "C"), ("C", "B"), ("B", "A"), ("A", "O")]);
        let mut m = map(&[("A", true)]);
        let update =
            fix_feature_conformance_recursively(&t, &mut m, FeatureUpdate::seeded(["A"])).unwrap();
        assert_eq!(update.updated_keys, vec!["A", "B", "C", "D"]);
        assert!(m["B"] && m["C"] && m["D"]);
    }

    #[test]
    fn test_desc_and_optional_are_left_alone() {
        let t = table(&[("A", "O"), ("B", "A & desc"), ("C", "[A]")]);
        let mut m = map(&[("A", true), ("B", false), ("C", false)]);
        let update =
            fix_feature_conformance_recursively(&t, &mut m, FeatureUpdate::seeded(["A"])).unwrap();
        assert!(update.updated_features.is_empty());
        assert!(!m["B"] && !m["C"]);
    }

    #[test]
    fn test_mutually_exclusive_features_settle() {
        let t = table(&[("A", "!B"), ("B", "!A")]);
        let mut m = map(&[("A", false), ("B", false)]);
        let update =
            fix_feature_conformance_recursively(&t, &mut m, FeatureUpdate::seeded(["B"])).unwrap();
        assert_eq!(update.updated_keys, vec!["B", "A"]);
        assert!(m["A"]);
    }

    #[test]
    fn test_pass_cap_reports_divergence() {
        let t = table(&[("D", "C"), ("C", "B"), ("B", "A")]);
        let mut m = map(&[("A", true)]);
        let resolver = FeatureResolver::new(EvaluatorOptions {
            max_passes: Some(1),
            ..Default::default()
        });
        let err = resolver
            .resolve(&t, &mut m, FeatureUpdate::seeded(["A"]))
            .unwrap_err();
        assert_eq!(err.code, ERR_RESOLVER_DIVERGED);
    }

    #[test]
    fn test_zero_pass_cap_still_runs_one_pass() {
        let resolver = FeatureResolver::new(EvaluatorOptions {
            max_passes: Some(0),
            ..Default::default()
        });
        let mut m = ElementMap::new();
        let update = resolver
            .resolve(&FeatureConformanceTable::new(), &mut m, FeatureUpdate::new())
            .unwrap();
        assert_eq!(update, FeatureUpdate::new());
    }

    #[test]
    fn test_divergence_message_has_no_empty_expression() {
        let t = table(&[("C", "B"), ("B", "A")]);
        let mut m = map(&[("A", true)]);
        let resolver = FeatureResolver::new(EvaluatorOptions {
            max_passes: Some(1),
            ..Default::default()
        });
        let err = resolver
            .resolve(&t, &mut m, FeatureUpdate::seeded(["A"]))
            .unwrap_err();
        let rendered = err.to_string();
        assert!(rendered.starts_with("ZAP-ERR-RESOLVE-CAP: feature conformance still changing after 1 passes"));
        assert!(!rendered.contains(" in `"));
    }

    #[test]
    fn test_parse_errors_name_the_feature() {
        let t = table(&[("B", "A &")]);
        let mut m = map(&[("A", true)]);
        let err =
            fix_feature_conformance_recursively(&t, &mut m, FeatureUpdate::seeded(["A"])).unwrap_err();
        assert_eq!(err.element.as_deref(), Some("B"));
        assert_eq!(err.expression, "A &");
    }
}
