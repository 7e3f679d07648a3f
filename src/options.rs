use serde::{Deserialize, Serialize};

/// How an otherwise-conformance (`A, [B]`) is split into its alternatives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitMode {
    /// Split only on commas outside `(...)` and `[...]`.
    #[default]
    Nested,
    /// Split on every comma, as older definition files expect.
    Legacy,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EvaluatorOptions {
    pub split_mode: SplitMode,
    /// Upper bound on resolver passes. Defaults to the feature count plus one.
    pub max_passes: Option<usize>,
}

impl EvaluatorOptions {
    pub fn from_json(value: Option<serde_json::Value>) -> Result<Self, String> {
        match value {
            None | Some(serde_json::Value::Null) => Ok(Self::default()),
            Some(v) => {
                let options: Self =
                    serde_json::from_value(v).map_err(|e| format!("Invalid options: {}", e))?;
                if options.max_passes == Some(0) {
                    return Err("Invalid options: maxPasses must be at least 1".to_string());
                }
                Ok(options)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_partial_options_fill_defaults() {
        let opts = EvaluatorOptions::from_json(Some(json!({ "maxPasses": 3 }))).unwrap();
        assert_eq!(opts.split_mode, SplitMode::Nested);
        assert_eq!(opts.max_passes, Some(3));

        let opts = EvaluatorOptions::from_json(Some(json!({ "splitMode": "legacy" }))).unwrap();
        assert_eq!(opts.split_mode, SplitMode::Legacy);
        assert_eq!(EvaluatorOptions::from_json(None).unwrap(), EvaluatorOptions::default());
    }

    #[test]
    fn test_unknown_split_mode_is_rejected() {
        assert!(EvaluatorOptions::from_json(Some(json!({ "splitMode": "loose" }))).is_err());
    }

    #[test]
    fn test_zero_passes_is_rejected() {
        let err = EvaluatorOptions::from_json(Some(json!({ "maxPasses": 0 }))).unwrap_err();
        assert!(err.contains("maxPasses"));
    }
}
