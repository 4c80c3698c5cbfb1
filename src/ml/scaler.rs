use crate::error::{AppError, Result};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Per-feature standardization: `(x - mean) / std`.
///
/// Uses the population standard deviation. A feature with zero spread keeps
/// a scale of 1 so constant columns pass through centered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureScaler {
    mean: Array1<f64>,
    scale: Array1<f64>,
}

impl FeatureScaler {
    /// Fit mean and std over the rows of `x`
    pub fn fit(x: &Array2<f64>) -> Result<Self> {
        let mean = x.mean_axis(Axis(0)).ok_or_else(|| {
            AppError::InvalidData("cannot fit scaler on an empty matrix".to_string())
        })?;
        let scale = x
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s == 0.0 || !s.is_finite() { 1.0 } else { s });

        Ok(Self { mean, scale })
    }

    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    pub fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    pub fn scale(&self) -> &Array1<f64> {
        &self.scale
    }

    /// Apply the fitted statistics
    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if x.ncols() != self.n_features() {
            return Err(AppError::Internal(format!(
                "scaler fitted on {} features, got {}",
                self.n_features(),
                x.ncols()
            )));
        }
        let centered = x - &self.mean;
        Ok(centered / &self.scale)
    }
}
