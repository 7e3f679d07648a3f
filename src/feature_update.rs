//! Impact of toggling a cluster feature.
//!
//! Given the feature the user toggled and the cluster's elements, works out
//! which other features cascade, which attributes/commands/events must be
//! enabled or disabled to stay conformant, and what the user should be warned
//! about before the change is applied.

#[cfg(feature = "napi")]
use napi_derive::napi;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::{debug, trace};

use crate::classifier::ConformanceEvaluator;
use crate::error::ConformanceError;
use crate::model::{
    abbreviation, deserialize_element_map, is_enabled, ConformanceResult, ElementMap,
    FeatureConformanceTable, FeatureUpdate,
};
use crate::options::EvaluatorOptions;
use crate::predicates::{check_missing_terms, filter_related_desc_elements, HasConformance};
use crate::resolver::FeatureResolver;
use crate::terms::terms;

// ═══════════════════════════════════════════════════════════════════════════════
// TYPES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Attribute,
    Command,
    Event,
}

impl ElementKind {
    pub fn label(&self) -> &'static str {
        match self {
            ElementKind::Attribute => "attribute",
            ElementKind::Command => "command",
            ElementKind::Event => "event",
        }
    }
}

/// An attribute, command or event of the selected cluster. Fields the host
/// sends beyond these are kept in `extra` and echoed back untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConformanceElement {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub conformance: Option<String>,
    #[serde(default)]
    pub enabled: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl HasConformance for ConformanceElement {
    fn conformance(&self) -> &str {
        self.conformance.as_deref().unwrap_or("")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementUpdate {
    #[serde(flatten)]
    pub element: ConformanceElement,
    /// Enabled state the element should be given.
    pub value: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureData {
    pub code: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub feature_id: Option<u32>,
    #[serde(default)]
    pub bit: Option<u32>,
}

impl FeatureData {
    fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.code
        } else {
            &self.name
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureUpdateRequest {
    pub feature_data: FeatureData,
    /// Feature code → enabled, already reflecting the toggle.
    #[serde(deserialize_with = "deserialize_element_map")]
    pub feature_map: ElementMap,
    pub feature_conformance: FeatureConformanceTable,
    #[serde(default)]
    pub attributes: Vec<ConformanceElement>,
    #[serde(default)]
    pub commands: Vec<ConformanceElement>,
    #[serde(default)]
    pub events: Vec<ConformanceElement>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureUpdateOutcome {
    pub attributes_to_update: Vec<ElementUpdate>,
    pub commands_to_update: Vec<ElementUpdate>,
    pub events_to_update: Vec<ElementUpdate>,
    pub features_to_update: BTreeMap<String, bool>,
    pub display_warning: bool,
    pub warning_message: Vec<String>,
    pub disable_change: bool,
}

impl FeatureUpdateOutcome {
    pub fn has_updates(&self) -> bool {
        !(self.attributes_to_update.is_empty()
            && self.commands_to_update.is_empty()
            && self.events_to_update.is_empty()
            && self.features_to_update.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementNotices {
    pub required: BTreeMap<u32, String>,
    pub not_supported: BTreeMap<u32, String>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// ELEMENT CLASSIFICATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Elements are addressed by name in conformance expressions, features by code.
fn combined_element_map(features: &ElementMap, request: &FeatureUpdateRequest) -> ElementMap {
    let mut map: ElementMap = request
        .attributes
        .iter()
        .chain(&request.commands)
        .chain(&request.events)
        .map(|element| (element.name.clone(), element.enabled))
        .collect();
    map.extend(features.iter().map(|(code, enabled)| (code.clone(), *enabled)));
    map
}

/// Classify an element unless its conformance is absent or depends on unknown terms.
fn classify_element(
    evaluator: &ConformanceEvaluator,
    element: &ConformanceElement,
    element_map: &ElementMap,
) -> Result<Option<ConformanceResult>, ConformanceError> {
    let conformance = element.conformance();
    if conformance.trim().is_empty() {
        return Ok(None);
    }
    let missing = check_missing_terms(conformance, element_map);
    if !missing.is_empty() {
        trace!(element = %element.name, ?missing, "skipping element with unknown terms");
        return Ok(None);
    }
    evaluator
        .evaluate(conformance, element_map)
        .map(Some)
        .map_err(|e| e.with_element(&element.name))
}

fn elements_to_update(
    evaluator: &ConformanceEvaluator,
    elements: &[ConformanceElement],
    element_map: &ElementMap,
) -> Result<Vec<ElementUpdate>, ConformanceError> {
    let decisions = elements
        .par_iter()
        .map(|element| -> Result<Option<ElementUpdate>, ConformanceError> {
            let value = match classify_element(evaluator, element, element_map)? {
                Some(ConformanceResult::Mandatory) if !element.enabled => true,
                Some(ConformanceResult::NotSupported) if element.enabled => false,
                _ => return Ok(None),
            };
            Ok(Some(ElementUpdate {
                element: element.clone(),
                value,
            }))
        })
        .collect::<Result<Vec<Option<ElementUpdate>>, ConformanceError>>()?;
    Ok(decisions.into_iter().flatten().collect())
}

/// Required / not-supported notice text per element id.
pub fn element_conformance_notices(
    elements: &[ConformanceElement],
    element_map: &ElementMap,
    kind: ElementKind,
    options: &EvaluatorOptions,
) -> Result<ElementNotices, ConformanceError> {
    let evaluator = ConformanceEvaluator::new(options.clone());
    let mut notices = ElementNotices::default();
    for element in elements {
        match classify_element(&evaluator, element, element_map)? {
            Some(ConformanceResult::Mandatory) => {
                notices.required.insert(
                    element.id,
                    format!(
                        "{} {} is mandatory for the current feature configuration (conformance: {}).",
                        kind.label(),
                        element.name,
                        element.conformance()
                    ),
                );
            }
            Some(ConformanceResult::NotSupported) => {
                notices.not_supported.insert(
                    element.id,
                    format!(
                        "{} {} is not supported for the current feature configuration (conformance: {}).",
                        kind.label(),
                        element.name,
                        element.conformance()
                    ),
                );
            }
            _ => {}
        }
    }
    Ok(notices)
}

/// "enable X" / "disable X" lines for the confirmation dialog, enables first.
pub fn describe_element_updates(updates: &[ElementUpdate]) -> Vec<String> {
    let (mut lines, disabled): (Vec<String>, Vec<String>) = updates
        .iter()
        .map(|update| {
            let verb = if update.value { "enable" } else { "disable" };
            format!("{} {}", verb, update.element.name)
        })
        .partition(|line| line.starts_with("enable "));
    lines.extend(disabled);
    lines
}

// ═══════════════════════════════════════════════════════════════════════════════
// FEATURE TOGGLE
// ═══════════════════════════════════════════════════════════════════════════════

pub fn check_conform_on_feature_update(
    request: &FeatureUpdateRequest,
    options: &EvaluatorOptions,
) -> Result<FeatureUpdateOutcome, ConformanceError> {
    let feature = &request.feature_data;
    let added = is_enabled(&request.feature_map, &feature.code);
    let mut outcome = FeatureUpdateOutcome::default();

    if let Some(conformance) = request.feature_conformance.get(&feature.code) {
        let known = combined_element_map(&request.feature_map, request);
        let missing = check_missing_terms(conformance, &known);
        if !missing.is_empty() {
            outcome.disable_change = true;
            outcome.display_warning = true;
            outcome.warning_message.push(format!(
                "{} cannot be {} as its conformance depends on elements with unknown values: {}.",
                feature.display_name(),
                if added { "enabled" } else { "disabled" },
                missing.join(", ")
            ));
            return Ok(outcome);
        }
        if terms(conformance).any(|t| t == abbreviation::DESC) {
            outcome.warning_message.push(format!(
                "{} has descriptive conformance ({}); confirm the change manually.",
                feature.display_name(),
                conformance
            ));
        }
    }

    let evaluator = ConformanceEvaluator::new(options.clone());
    let mut feature_map = request.feature_map.clone();
    let update = FeatureResolver::with_evaluator(evaluator.clone()).resolve(
        &request.feature_conformance,
        &mut feature_map,
        FeatureUpdate::seeded([feature.code.as_str()]),
    )?;
    outcome.features_to_update = update.updated_features.clone();

    let element_map = combined_element_map(&feature_map, request);
    outcome.attributes_to_update = elements_to_update(&evaluator, &request.attributes, &element_map)?;
    outcome.commands_to_update = elements_to_update(&evaluator, &request.commands, &element_map)?;
    outcome.events_to_update = elements_to_update(&evaluator, &request.events, &element_map)?;

    // Descriptive elements mentioning any changed feature need a human look.
    let changed = &update.updated_keys;
    for (kind, elements) in [
        (ElementKind::Attribute, &request.attributes),
        (ElementKind::Command, &request.commands),
        (ElementKind::Event, &request.events),
    ] {
        for element in filter_related_desc_elements(elements, changed) {
            outcome.warning_message.push(format!(
                "{} {} has descriptive conformance ({}) that depends on changed features; review it manually.",
                kind.label(),
                element.name,
                element.conformance()
            ));
        }
    }
    for (code, conformance) in request.feature_conformance.iter() {
        if code == feature.code {
            continue;
        }
        if filter_related_desc_elements(&[conformance.to_string()], changed).is_empty() {
            continue;
        }
        outcome.warning_message.push(format!(
            "feature {} has descriptive conformance ({}) that depends on changed features; review it manually.",
            code, conformance
        ));
    }

    outcome.display_warning = !outcome.warning_message.is_empty();
    debug!(
        feature = %feature.code,
        added,
        features = outcome.features_to_update.len(),
        attributes = outcome.attributes_to_update.len(),
        commands = outcome.commands_to_update.len(),
        events = outcome.events_to_update.len(),
        warnings = outcome.warning_message.len(),
        "feature toggle checked"
    );
    Ok(outcome)
}

// ═══════════════════════════════════════════════════════════════════════════════
// NAPI EXPORTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(feature = "napi")]
#[napi]
pub fn check_conform_on_feature_update_native(
    request: serde_json::Value,
    options: Option<serde_json::Value>,
) -> napi::Result<serde_json::Value> {
    let request: FeatureUpdateRequest = serde_json::from_value(request)
        .map_err(|e| napi::Error::from_reason(format!("Invalid feature update request: {}", e)))?;
    let options = EvaluatorOptions::from_json(options).map_err(napi::Error::from_reason)?;
    let outcome = check_conform_on_feature_update(&request, &options)
        .map_err(|e| napi::Error::from_reason(e.to_string()))?;
    serde_json::to_value(outcome).map_err(|e| napi::Error::from_reason(e.to_string()))
}
