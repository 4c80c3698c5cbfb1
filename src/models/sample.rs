use crate::error::{AppError, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Water temperature in degrees Celsius
pub const TEMPERATURE_C: &str = "temperature_C";
/// Acidity, typically 0-14
pub const PH: &str = "pH";
/// Turbidity in NTU
pub const TURBIDITY_NTU: &str = "turbidity_NTU";
/// Flow speed in m/s
pub const FLOW_M_S: &str = "flow_m_s";
/// Camera-side trash flag
pub const TRASH_DETECTED: &str = "trash_detected";

/// Input columns in training order
pub const FEATURE_COLUMNS: [&str; 5] = [TEMPERATURE_C, PH, TURBIDITY_NTU, FLOW_M_S, TRASH_DETECTED];

/// Categorical outputs, one classifier each
pub const TARGET_COLUMNS: [&str; 6] = [
    "water_quality",
    "action_decision",
    "pollution_alert",
    "flow_condition",
    "cleaning_recommendation",
    "safety_alert",
];

/// A single feature value as supplied by a caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Number(f64),
    Flag(bool),
    Text(String),
    Missing,
}

impl FeatureValue {
    /// Numeric value for an ordinary feature; absent and null read as 0
    fn as_number(&self, feature: &str) -> Result<f64> {
        match self {
            FeatureValue::Number(n) => Ok(*n),
            FeatureValue::Flag(b) => Ok(if *b { 1.0 } else { 0.0 }),
            FeatureValue::Missing => Ok(0.0),
            FeatureValue::Text(s) => s.trim().parse::<f64>().map_err(|_| {
                AppError::Validation(format!("feature '{}' is not numeric: '{}'", feature, s))
            }),
        }
    }
}

impl From<f64> for FeatureValue {
    fn from(value: f64) -> Self {
        FeatureValue::Number(value)
    }
}

impl From<bool> for FeatureValue {
    fn from(value: bool) -> Self {
        FeatureValue::Flag(value)
    }
}

impl From<&str> for FeatureValue {
    fn from(value: &str) -> Self {
        FeatureValue::Text(value.to_string())
    }
}

impl From<String> for FeatureValue {
    fn from(value: String) -> Self {
        FeatureValue::Text(value)
    }
}

/// Normalize a `trash_detected` value to 0 or 1.
///
/// Strings `yes`, `1` and `true` (any case) map to 1, every other string to 0.
/// Numbers map nonzero to 1. Absent and null map to 0.
pub fn trash_flag(value: Option<&FeatureValue>) -> f64 {
    let detected = match value {
        Some(FeatureValue::Text(s)) => {
            matches!(s.trim().to_ascii_lowercase().as_str(), "yes" | "1" | "true")
        }
        Some(FeatureValue::Number(n)) => *n != 0.0,
        Some(FeatureValue::Flag(b)) => *b,
        Some(FeatureValue::Missing) | None => false,
    };
    if detected {
        1.0
    } else {
        0.0
    }
}

/// Unordered mapping from feature name to value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureInput {
    values: HashMap<String, FeatureValue>,
}

impl FeatureInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, name: impl Into<String>, value: impl Into<FeatureValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<FeatureValue>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&FeatureValue> {
        self.values.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Project the mapping into a single-row matrix ordered by `columns`.
    ///
    /// Keys not named in `columns` are ignored.
    pub fn to_row(&self, columns: &[String]) -> Result<Array2<f64>> {
        let row = columns
            .iter()
            .map(|column| {
                if column == TRASH_DETECTED {
                    Ok(trash_flag(self.get(column)))
                } else {
                    self.get(column)
                        .map_or(Ok(0.0), |value| value.as_number(column))
                }
            })
            .collect::<Result<Vec<f64>>>()?;

        Array2::from_shape_vec((1, columns.len()), row)
            .map_err(|e| AppError::Internal(format!("Failed to create feature array: {}", e)))
    }
}

impl<K: Into<String>, V: Into<FeatureValue>> FromIterator<(K, V)> for FeatureInput {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut input = FeatureInput::new();
        for (k, v) in iter {
            input.insert(k, v);
        }
        input
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns() -> Vec<String> {
        FEATURE_COLUMNS.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_trash_flag_truthy_tokens() {
        for token in ["Yes", "yes", "1", "true", "TRUE"] {
            assert_eq!(trash_flag(Some(&FeatureValue::from(token))), 1.0, "{}", token);
        }
        assert_eq!(trash_flag(Some(&FeatureValue::Number(1.0))), 1.0);
        assert_eq!(trash_flag(Some(&FeatureValue::Flag(true))), 1.0);
    }

    #[test]
    fn test_trash_flag_falsy_tokens() {
        for token in ["No", "no", "0", "false", "maybe", ""] {
            assert_eq!(trash_flag(Some(&FeatureValue::from(token))), 0.0, "{}", token);
        }
        assert_eq!(trash_flag(Some(&FeatureValue::Number(0.0))), 0.0);
        assert_eq!(trash_flag(Some(&FeatureValue::Missing)), 0.0);
        assert_eq!(trash_flag(None), 0.0);
    }

    #[test]
    fn test_to_row_follows_column_order() {
        let input = FeatureInput::new()
            .with(TRASH_DETECTED, "Yes")
            .with(FLOW_M_S, 1.5)
            .with(PH, 7.0)
            .with(TEMPERATURE_C, 20.0)
            .with(TURBIDITY_NTU, 3.0);

        let row = input.to_row(&columns()).unwrap();
        assert_eq!(row.shape(), &[1, 5]);
        assert_eq!(row.row(0).to_vec(), vec![20.0, 7.0, 3.0, 1.5, 1.0]);
    }

    #[test]
    fn test_missing_features_default_to_zero() {
        let input = FeatureInput::new().with(PH, 6.5);
        let row = input.to_row(&columns()).unwrap();
        assert_eq!(row.row(0).to_vec(), vec![0.0, 6.5, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let input = FeatureInput::new().with("salinity", 35.0).with(PH, 7.0);
        let row = input.to_row(&columns()).unwrap();
        assert_eq!(row.row(0).to_vec(), vec![0.0, 7.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_numeric_text_is_parsed() {
        let input = FeatureInput::new().with(PH, "7.25");
        let row = input.to_row(&columns()).unwrap();
        assert_eq!(row[[0, 1]], 7.25);

        let bad = FeatureInput::new().with(PH, "acidic");
        assert!(matches!(bad.to_row(&columns()), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_deserialize_from_json() {
        let input: FeatureInput = serde_json::from_str(
            r#"{"pH": 7.5, "trash_detected": "No", "flow_m_s": null, "temperature_C": 25}"#,
        )
        .unwrap();

        assert_eq!(input.get(PH), Some(&FeatureValue::Number(7.5)));
        assert_eq!(input.get(TRASH_DETECTED), Some(&FeatureValue::Text("No".to_string())));
        assert_eq!(input.get(FLOW_M_S), Some(&FeatureValue::Missing));
        assert_eq!(input.get(TEMPERATURE_C), Some(&FeatureValue::Number(25.0)));
    }
}
