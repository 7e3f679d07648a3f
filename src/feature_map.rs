//! FeatureMap attribute helpers.
//!
//! A cluster's FeatureMap attribute is a 32-bit bitmap; feature `n` is enabled
//! when bit `n` is set.

#[cfg(feature = "napi")]
use napi_derive::napi;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::{ElementMap, FeatureConformanceTable};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterFeature {
    pub feature_id: u32,
    pub code: String,
    #[serde(default)]
    pub name: String,
    pub bit: u32,
    #[serde(default)]
    pub conformance: Option<String>,
    #[serde(default)]
    pub cluster_ref: Option<u32>,
}

/// Device-type specific conformance for a cluster feature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceTypeFeature {
    pub feature_id: u32,
    #[serde(default)]
    pub cluster_ref: Option<u32>,
    pub conformance: String,
}

pub fn enabled_bits(feature_map_value: u32) -> Vec<u32> {
    (0..32)
        .filter(|bit| feature_map_value & (1u32 << bit) != 0)
        .collect()
}

/// Toggle every bit in `bits`. Bits outside the 32-bit map are ignored.
pub fn flip_bits(feature_map_value: u32, bits: &[u32]) -> u32 {
    bits.iter().fold(feature_map_value, |value, &bit| {
        match 1u32.checked_shl(bit) {
            Some(mask) => value ^ mask,
            None => value,
        }
    })
}

/// Read a FeatureMap value as stored by the host: a number, or a decimal or
/// `0x` hex string.
pub fn parse_feature_map_value(value: &Value) -> Result<u32, String> {
    let parsed = match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => {
            let s = s.trim();
            match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                Some(hex) => u32::from_str_radix(hex, 16).ok(),
                None => s.parse::<u32>().ok(),
            }
        }
        Value::Null => Some(0),
        _ => None,
    };
    parsed.ok_or_else(|| format!("Invalid FeatureMap value: {}", value))
}

pub fn enabled_feature_ids(features: &[ClusterFeature], feature_map_value: u32) -> Vec<u32> {
    let bits = enabled_bits(feature_map_value);
    features
        .iter()
        .filter(|feature| bits.contains(&feature.bit))
        .map(|feature| feature.feature_id)
        .collect()
}

/// Feature code → enabled, where a feature is enabled when its id is in `inclusion_list`.
pub fn build_feature_map(features: &[ClusterFeature], inclusion_list: &[u32]) -> ElementMap {
    features
        .iter()
        .map(|feature| (feature.code.clone(), inclusion_list.contains(&feature.feature_id)))
        .collect()
}

/// Feature code → conformance for one cluster. Device-type conformance, when
/// present for the same feature and cluster, takes precedence.
pub fn cluster_feature_conformance(
    features: &[ClusterFeature],
    device_type_features: &[DeviceTypeFeature],
) -> FeatureConformanceTable {
    features
        .iter()
        .map(|feature| {
            let device_type_override = device_type_features.iter().find(|dt| {
                dt.feature_id == feature.feature_id && dt.cluster_ref == feature.cluster_ref
            });
            let conformance = match device_type_override {
                Some(dt) => dt.conformance.clone(),
                None => feature.conformance.clone().unwrap_or_default(),
            };
            (feature.code.clone(), conformance)
        })
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════════════
// NAPI EXPORTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(feature = "napi")]
#[napi]
pub fn enabled_bits_native(feature_map_value: serde_json::Value) -> napi::Result<Vec<u32>> {
    let value = parse_feature_map_value(&feature_map_value).map_err(napi::Error::from_reason)?;
    Ok(enabled_bits(value))
}

#[cfg(feature = "napi")]
#[napi]
pub fn flip_bits_native(feature_map_value: serde_json::Value, bits: Vec<u32>) -> napi::Result<u32> {
    let value = parse_feature_map_value(&feature_map_value).map_err(napi::Error::from_reason)?;
    Ok(flip_bits(value, &bits))
}
