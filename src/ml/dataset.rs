use crate::error::{AppError, Result};
use crate::models::{FeatureInput, FEATURE_COLUMNS, TARGET_COLUMNS};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// One labelled row of the training table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetRow {
    #[serde(rename = "temperature_C")]
    pub temperature_c: f64,
    #[serde(rename = "pH")]
    pub ph: f64,
    #[serde(rename = "turbidity_NTU")]
    pub turbidity_ntu: f64,
    pub flow_m_s: f64,
    /// Yes/No token or 0/1
    pub trash_detected: String,
    pub water_quality: String,
    pub action_decision: String,
    pub pollution_alert: String,
    pub flow_condition: String,
    pub cleaning_recommendation: String,
    pub safety_alert: String,
}

impl DatasetRow {
    fn target(&self, column: &str) -> &str {
        match column {
            "water_quality" => &self.water_quality,
            "action_decision" => &self.action_decision,
            "pollution_alert" => &self.pollution_alert,
            "flow_condition" => &self.flow_condition,
            "cleaning_recommendation" => &self.cleaning_recommendation,
            "safety_alert" => &self.safety_alert,
            _ => "",
        }
    }
}

/// Parse a training-time trash token into 0 or 1
pub fn parse_trash_token(token: &str) -> Option<f64> {
    match token.trim().to_ascii_lowercase().as_str() {
        "yes" | "true" | "1" => Some(1.0),
        "no" | "false" | "0" => Some(0.0),
        other => match other.parse::<f64>() {
            Ok(v) if v == 1.0 => Some(1.0),
            Ok(v) if v == 0.0 => Some(0.0),
            _ => None,
        },
    }
}

/// Feature matrix plus raw target labels, ready for encoding
#[derive(Debug, Clone)]
pub struct TrainingDataset {
    /// Feature matrix (n_samples x 5), columns in `FEATURE_COLUMNS` order
    pub features: Array2<f64>,

    /// Raw labels per target, in `TARGET_COLUMNS` order
    pub targets: Vec<Vec<String>>,

    /// Number of samples
    pub n_samples: usize,
}

impl TrainingDataset {
    /// Read and validate a CSV dataset
    pub fn load_csv(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(AppError::DataNotFound(format!(
                "training dataset not found at {}",
                path.display()
            )));
        }

        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)?;

        let headers = reader.headers()?.clone();
        let missing: Vec<String> = FEATURE_COLUMNS
            .iter()
            .chain(TARGET_COLUMNS.iter())
            .filter(|column| !headers.iter().any(|h| h == **column))
            .map(|column| column.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(AppError::SchemaMismatch { missing });
        }

        let mut rows = Vec::new();
        for (idx, record) in reader.deserialize::<DatasetRow>().enumerate() {
            // header is line 1
            let row = record.map_err(|e| {
                AppError::InvalidData(format!("row {}: {}", idx + 2, e))
            })?;
            rows.push(row);
        }

        info!(path = %path.display(), rows = rows.len(), "Loaded training dataset");
        Self::from_rows(&rows)
    }

    /// Build a dataset from typed rows
    pub fn from_rows(rows: &[DatasetRow]) -> Result<Self> {
        if rows.is_empty() {
            return Err(AppError::InvalidData("dataset has no rows".to_string()));
        }

        let n_samples = rows.len();
        let mut features = Array2::zeros((n_samples, FEATURE_COLUMNS.len()));
        let mut targets: Vec<Vec<String>> = vec![Vec::with_capacity(n_samples); TARGET_COLUMNS.len()];

        for (i, row) in rows.iter().enumerate() {
            let trash = parse_trash_token(&row.trash_detected).ok_or_else(|| {
                AppError::InvalidData(format!(
                    "row {}: trash_detected must be yes/no or 0/1, got '{}'",
                    i + 1,
                    row.trash_detected
                ))
            })?;
            let values = [row.temperature_c, row.ph, row.turbidity_ntu, row.flow_m_s, trash];
            if let Some(bad) = values.iter().position(|v| !v.is_finite()) {
                return Err(AppError::InvalidData(format!(
                    "row {}: {} is not a finite number",
                    i + 1,
                    FEATURE_COLUMNS[bad]
                )));
            }
            for (j, value) in values.iter().enumerate() {
                features[[i, j]] = *value;
            }

            for (t, column) in TARGET_COLUMNS.iter().enumerate() {
                let label = row.target(column);
                if label.trim().is_empty() {
                    return Err(AppError::InvalidData(format!(
                        "row {}: missing value for {}",
                        i + 1,
                        column
                    )));
                }
                targets[t].push(label.to_string());
            }
        }

        debug!(n_samples, "Built training matrix");

        Ok(Self {
            features,
            targets,
            n_samples,
        })
    }

    /// Labels for one target column
    pub fn target_labels(&self, column: &str) -> Option<&[String]> {
        TARGET_COLUMNS
            .iter()
            .position(|c| *c == column)
            .map(|idx| self.targets[idx].as_slice())
    }

    /// Features of the final row as a named mapping
    pub fn last_sample(&self) -> Option<FeatureInput> {
        let last = self.n_samples.checked_sub(1)?;
        Some(
            FEATURE_COLUMNS
                .iter()
                .enumerate()
                .map(|(j, column)| (*column, self.features[[last, j]]))
                .collect(),
        )
    }
}

/// Shuffle `0..n` with a fixed seed and cut off the held-out share.
///
/// Returns `(train, test)`. The test side gets `ceil(n * test_fraction)`
/// rows; both sides are kept non-empty.
pub fn split_indices(n: usize, test_fraction: f64, seed: u64) -> Result<(Vec<usize>, Vec<usize>)> {
    if n < 2 {
        return Err(AppError::InvalidData(format!(
            "need at least 2 rows to hold out a test split, got {}",
            n
        )));
    }
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(AppError::Validation(format!(
            "test fraction must be in (0, 1), got {}",
            test_fraction
        )));
    }

    let n_test = ((n as f64 * test_fraction).ceil() as usize).clamp(1, n - 1);

    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let train = indices.split_off(n_test);
    Ok((train, indices))
}
