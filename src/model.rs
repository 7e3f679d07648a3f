//! Data model shared by the evaluator, the resolver and the napi surface.

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

// ═══════════════════════════════════════════════════════════════════════════════
// CONFORMANCE ABBREVIATIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Textual codes a conformance expression uses in place of full words.
pub mod abbreviation {
    pub const MANDATORY: &str = "M";
    pub const OPTIONAL: &str = "O";
    pub const DEPRECATED: &str = "D";
    pub const DISALLOWED: &str = "X";
    pub const PROVISIONAL: &str = "P";
    pub const DESC: &str = "desc";

    pub const ALL: [&str; 6] = [MANDATORY, OPTIONAL, DEPRECATED, DISALLOWED, PROVISIONAL, DESC];

    pub fn is_abbreviation(term: &str) -> bool {
        ALL.contains(&term)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONFORMANCE RESULT
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConformanceResult {
    Mandatory,
    Optional,
    Provisional,
    NotSupported,
    /// Descriptive conformance. Never auto-resolved by callers.
    Desc,
}

impl ConformanceResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConformanceResult::Mandatory => "mandatory",
            ConformanceResult::Optional => "optional",
            ConformanceResult::Provisional => "provisional",
            ConformanceResult::NotSupported => "notSupported",
            ConformanceResult::Desc => "desc",
        }
    }

    pub fn is_actionable(&self) -> bool {
        !matches!(self, ConformanceResult::Desc)
    }
}

impl fmt::Display for ConformanceResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ELEMENT MAP
// ═══════════════════════════════════════════════════════════════════════════════

/// Term name → "is this attribute/command/event/feature enabled".
pub type ElementMap = HashMap<String, bool>;

/// Missing keys read as disabled.
pub fn is_enabled(element_map: &ElementMap, term: &str) -> bool {
    element_map.get(term).copied().unwrap_or(false)
}

/// JavaScript truthiness of a host value.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Build an [`ElementMap`] from a host object such as `{ "LT": 1, "OO": false }`.
pub fn element_map_from_json(value: &Value) -> Result<ElementMap, String> {
    let object = value
        .as_object()
        .ok_or_else(|| format!("Element map must be an object, got {}", value))?;
    Ok(object
        .iter()
        .map(|(key, value)| (key.clone(), is_truthy(value)))
        .collect())
}

/// Serde adapter for host objects whose values are only JS-truthy.
pub(crate) fn deserialize_element_map<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<ElementMap, D::Error> {
    let value = Value::deserialize(deserializer)?;
    element_map_from_json(&value).map_err(serde::de::Error::custom)
}

// ═══════════════════════════════════════════════════════════════════════════════
// FEATURE CONFORMANCE TABLE
// ═══════════════════════════════════════════════════════════════════════════════

/// Feature code → conformance expression for one cluster, in insertion order.
///
/// Order matters: the resolver walks features in this order and a feature
/// flipped early in a pass is visible to the features after it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureConformanceTable {
    entries: Vec<(String, String)>,
}

impl FeatureConformanceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace; a replaced entry keeps its original position.
    pub fn insert(&mut self, code: impl Into<String>, conformance: impl Into<String>) {
        let code = code.into();
        let conformance = conformance.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == code) {
            Some(entry) => entry.1 = conformance,
            None => self.entries.push((code, conformance)),
        }
    }

    pub fn get(&self, code: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == code)
            .map(|(_, conformance)| conformance.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FeatureConformanceTable {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut table = FeatureConformanceTable::new();
        for (code, conformance) in iter {
            table.insert(code, conformance);
        }
        table
    }
}

impl Serialize for FeatureConformanceTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (code, conformance) in &self.entries {
            map.serialize_entry(code, conformance)?;
        }
        map.end()
    }
}

struct TableVisitor;

impl<'de> Visitor<'de> for TableVisitor {
    type Value = FeatureConformanceTable;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an object mapping feature codes to conformance strings")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut table = FeatureConformanceTable::new();
        while let Some((code, conformance)) = access.next_entry::<String, Option<String>>()? {
            // Features without a conformance column come through as null.
            table.insert(code, conformance.unwrap_or_default());
        }
        Ok(table)
    }
}

impl<'de> Deserialize<'de> for FeatureConformanceTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(TableVisitor)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RESOLVER ACCUMULATOR
// ═══════════════════════════════════════════════════════════════════════════════

/// Changes settled by the resolver: the keys in the order they were settled,
/// and the value each changed feature was given.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureUpdate {
    #[serde(default)]
    pub updated_features: BTreeMap<String, bool>,
    #[serde(default)]
    pub updated_keys: Vec<String>,
}

impl FeatureUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with keys that were changed by the caller (e.g. the toggled feature).
    pub fn seeded<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FeatureUpdate {
            updated_features: BTreeMap::new(),
            updated_keys: keys.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_settled(&self, key: &str) -> bool {
        self.updated_keys.iter().any(|k| k == key)
    }

    pub(crate) fn record(&mut self, key: &str, enabled: bool) {
        self.updated_keys.push(key.to_string());
        self.updated_features.insert(key.to_string(), enabled);
    }
}
