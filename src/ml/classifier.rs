use crate::error::{AppError, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use smartcore::ensemble::random_forest_classifier::{
    RandomForestClassifier, RandomForestClassifierParameters,
};
use smartcore::linalg::basic::matrix::DenseMatrix;
use std::collections::BTreeSet;
use tracing::debug;

type Forest = RandomForestClassifier<f64, i32, DenseMatrix<f64>, Vec<i32>>;

/// Hyperparameters shared by every per-target forest
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    /// Trees per forest
    pub n_trees: u16,

    /// Depth cap, unlimited when `None`
    pub max_depth: Option<u16>,

    /// Bootstrap and feature-sampling seed
    pub seed: u64,
}

impl ForestParams {
    fn to_smartcore(self) -> RandomForestClassifierParameters {
        RandomForestClassifierParameters {
            n_trees: self.n_trees,
            max_depth: self.max_depth,
            seed: self.seed,
            ..Default::default()
        }
    }
}

/// Fitted model for a single target
#[derive(Serialize, Deserialize)]
enum TargetModel {
    Forest(Forest),

    /// Only one class was seen at fit time
    Constant(i32),
}

impl TargetModel {
    fn fit(x: &DenseMatrix<f64>, y: &Vec<i32>, params: ForestParams) -> Result<Self> {
        let classes: BTreeSet<i32> = y.iter().copied().collect();
        match classes.len() {
            0 => Err(AppError::Training("no labels to fit".to_string())),
            1 => Ok(Self::Constant(y[0])),
            _ => Forest::fit(x, y, params.to_smartcore())
                .map(Self::Forest)
                .map_err(|e| AppError::Training(e.to_string())),
        }
    }

    fn predict(&self, x: &DenseMatrix<f64>, n_rows: usize) -> Result<Vec<i32>> {
        match self {
            Self::Forest(forest) => forest
                .predict(x)
                .map_err(|e| AppError::Training(e.to_string())),
            Self::Constant(code) => Ok(vec![*code; n_rows]),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Forest(_) => "forest",
            Self::Constant(_) => "constant",
        }
    }
}

/// One random forest per target, all fitted on the same feature matrix
#[derive(Serialize, Deserialize)]
pub struct MultiOutputForest {
    /// Target names, aligned with `models`
    targets: Vec<String>,

    /// Fitted per-target models
    models: Vec<TargetModel>,

    /// Width of the feature matrix seen at fit time
    n_features: usize,

    /// Parameters used at fit time
    params: ForestParams,
}

impl std::fmt::Debug for MultiOutputForest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiOutputForest")
            .field("targets", &self.targets)
            .field(
                "models",
                &self.models.iter().map(TargetModel::kind).collect::<Vec<_>>(),
            )
            .field("n_features", &self.n_features)
            .field("params", &self.params)
            .finish()
    }
}

impl MultiOutputForest {
    /// Fit one forest per target.
    ///
    /// `labels[t][i]` is the encoded label of row `i` for target `t`. A target
    /// with a single class in `labels` gets a constant predictor instead.
    pub fn fit(
        features: &Array2<f64>,
        targets: &[String],
        labels: &[Vec<i32>],
        params: ForestParams,
    ) -> Result<Self> {
        if targets.len() != labels.len() {
            return Err(AppError::Internal(format!(
                "{} targets but {} label columns",
                targets.len(),
                labels.len()
            )));
        }
        if params.n_trees == 0 {
            return Err(AppError::Training("forest needs at least one tree".to_string()));
        }

        let x = ndarray_to_densematrix(features);
        let mut models = Vec::with_capacity(targets.len());

        for (target, y) in targets.iter().zip(labels) {
            if y.len() != features.nrows() {
                return Err(AppError::Internal(format!(
                    "target '{}' has {} labels for {} rows",
                    target,
                    y.len(),
                    features.nrows()
                )));
            }

            let model = TargetModel::fit(&x, y, params).map_err(|e| {
                AppError::Training(format!("Failed to train random forest for '{}': {}", target, e))
            })?;
            debug!(target = %target, model = model.kind(), n_trees = params.n_trees, "Fitted target");
            models.push(model);
        }

        Ok(Self {
            targets: targets.to_vec(),
            models,
            n_features: features.ncols(),
            params,
        })
    }

    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn params(&self) -> ForestParams {
        self.params
    }

    /// Predict every target for every row.
    ///
    /// Output is indexed `[target][row]`.
    pub fn predict(&self, features: &Array2<f64>) -> Result<Vec<Vec<i32>>> {
        if features.ncols() != self.n_features {
            return Err(AppError::Internal(format!(
                "model expects {} features, got {}",
                self.n_features,
                features.ncols()
            )));
        }

        let x = ndarray_to_densematrix(features);
        self.targets
            .iter()
            .zip(&self.models)
            .map(|(target, model)| {
                model.predict(&x, features.nrows()).map_err(|e| {
                    AppError::Training(format!("Prediction failed for '{}': {}", target, e))
                })
            })
            .collect()
    }

    /// Predict every target for a single row
    pub fn predict_one(&self, features: &Array2<f64>) -> Result<Vec<i32>> {
        if features.nrows() != 1 {
            return Err(AppError::Internal(format!(
                "expected a single row, got {}",
                features.nrows()
            )));
        }
        self.predict(features)?
            .into_iter()
            .map(|column| {
                column
                    .first()
                    .copied()
                    .ok_or_else(|| AppError::Internal("empty prediction".to_string()))
            })
            .collect()
    }
}

fn ndarray_to_densematrix(arr: &Array2<f64>) -> DenseMatrix<f64> {
    let shape = arr.shape();
    let data: Vec<f64> = arr.iter().copied().collect();
    DenseMatrix::new(shape[0], shape[1], data, false)
}

/// Fraction of positions where `y_pred` matches `y_true`
pub fn accuracy(y_true: &[i32], y_pred: &[i32]) -> f64 {
    let n_samples = y_true.len().min(y_pred.len());
    if n_samples == 0 {
        return 0.0;
    }

    let correct = y_true
        .iter()
        .zip(y_pred.iter())
        .filter(|(t, p)| t == p)
        .count();
    correct as f64 / n_samples as f64
}
