use crate::error::{AppError, Result};
use crate::ml::artifact::ArtifactBundle;
use crate::ml::classifier::{accuracy, ForestParams, MultiOutputForest};
use crate::ml::dataset::{split_indices, TrainingDataset};
use crate::ml::encoding::LabelEncoder;
use crate::ml::models::{BundleMetadata, RoundReport, TargetAccuracy, TrainingConfig, TrainingReport};
use crate::ml::scaler::FeatureScaler;
use crate::models::{FEATURE_COLUMNS, TARGET_COLUMNS};
use ndarray::{Array2, Axis};
use std::path::Path;
use tracing::{info, warn};

/// Receives accuracy reports while training runs
pub trait TrainingProgress {
    /// Called once per progress round, after that round's forest is scored
    fn on_round(&mut self, report: &RoundReport);

    /// Called once with the scores of the model that gets persisted
    fn on_complete(&mut self, _report: &TrainingReport) {}
}

/// Progress sink that writes to the tracing subscriber
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl TrainingProgress for LogProgress {
    fn on_round(&mut self, report: &RoundReport) {
        info!(
            round = report.round,
            rounds = report.rounds,
            n_trees = report.n_trees,
            "Training round complete"
        );
        for acc in &report.accuracy {
            info!(target_column = %acc.target, accuracy = acc.accuracy, "  held-out accuracy");
        }
    }

    fn on_complete(&mut self, report: &TrainingReport) {
        for acc in &report.final_accuracy {
            info!(target_column = %acc.target, accuracy = acc.accuracy, "Final held-out accuracy");
        }
    }
}

/// Progress sink that drops every report
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl TrainingProgress for NoProgress {
    fn on_round(&mut self, _report: &RoundReport) {}
}

/// Scaled train/test matrices with encoded labels
struct PreparedData {
    x_train: Array2<f64>,
    x_test: Array2<f64>,
    y_train: Vec<Vec<i32>>,
    y_test: Vec<Vec<i32>>,
    scaler: FeatureScaler,
}

/// Offline job that turns a labelled dataset into an artifact bundle
#[derive(Debug, Clone, Default)]
pub struct TrainingPipeline {
    config: TrainingConfig,
}

impl TrainingPipeline {
    pub fn new(config: TrainingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Load the dataset, train, and persist the bundle at `artifact_path`.
    ///
    /// Nothing is written unless every earlier step succeeded.
    pub fn run(
        &self,
        dataset_path: &Path,
        artifact_path: &Path,
        progress: &mut dyn TrainingProgress,
    ) -> Result<TrainingReport> {
        let dataset = TrainingDataset::load_csv(dataset_path)?;
        let (bundle, report) = self.fit(&dataset, progress)?;
        bundle.save(artifact_path)?;
        Ok(report)
    }

    /// Train in memory and return the bundle without persisting it
    pub fn fit(
        &self,
        dataset: &TrainingDataset,
        progress: &mut dyn TrainingProgress,
    ) -> Result<(ArtifactBundle, TrainingReport)> {
        if self.config.rounds == 0 || self.config.trees_per_round == 0 {
            return Err(AppError::Configuration(
                "training needs at least one round and one tree per round".to_string(),
            ));
        }

        let targets: Vec<String> = TARGET_COLUMNS.iter().map(|t| t.to_string()).collect();
        let encoders = targets
            .iter()
            .map(|target| {
                let labels = dataset.target_labels(target).ok_or_else(|| {
                    AppError::SchemaMismatch {
                        missing: vec![target.clone()],
                    }
                })?;
                LabelEncoder::fit(target, labels)
            })
            .collect::<Result<Vec<_>>>()?;

        let data = self.prepare(dataset, &encoders)?;
        info!(
            n_train = data.x_train.nrows(),
            n_test = data.x_test.nrows(),
            rounds = self.config.rounds,
            trees_per_round = self.config.trees_per_round,
            "Starting training"
        );

        // Each round refits from scratch; only the final fit below is kept.
        let mut rounds = Vec::with_capacity(self.config.rounds);
        for round in 1..=self.config.rounds {
            let n_trees = self.config.trees_for_round(round);
            let model = self.fit_forest(&data, &targets, n_trees)?;
            let report = RoundReport {
                round,
                rounds: self.config.rounds,
                n_trees,
                accuracy: evaluate(&model, &data.x_test, &data.y_test)?,
            };
            progress.on_round(&report);
            rounds.push(report);
        }

        let n_trees = self.config.final_trees();
        let model = self.fit_forest(&data, &targets, n_trees)?;
        let final_accuracy = evaluate(&model, &data.x_test, &data.y_test)?;

        let report = TrainingReport {
            n_train: data.x_train.nrows(),
            n_test: data.x_test.nrows(),
            n_trees,
            rounds,
            final_accuracy: final_accuracy.clone(),
        };
        progress.on_complete(&report);

        let bundle = ArtifactBundle::new(
            FEATURE_COLUMNS.iter().map(|c| c.to_string()).collect(),
            model,
            data.scaler,
            encoders,
            BundleMetadata {
                trained_at: chrono::Utc::now(),
                n_trees,
                n_train: report.n_train,
                n_test: report.n_test,
                held_out_accuracy: final_accuracy,
            },
        )?;

        info!(n_trees, "Model training complete");
        Ok((bundle, report))
    }

    fn prepare(&self, dataset: &TrainingDataset, encoders: &[LabelEncoder]) -> Result<PreparedData> {
        let encoded = encoders
            .iter()
            .zip(&dataset.targets)
            .map(|(encoder, labels)| encoder.encode_all(labels.as_slice()))
            .collect::<Result<Vec<Vec<i32>>>>()?;

        let (train_idx, test_idx) =
            split_indices(dataset.n_samples, self.config.test_fraction, self.config.seed)?;

        let x_train_raw = dataset.features.select(Axis(0), &train_idx);
        let x_test_raw = dataset.features.select(Axis(0), &test_idx);

        let scaler = FeatureScaler::fit(&x_train_raw)?;
        let x_train = scaler.transform(&x_train_raw)?;
        let x_test = scaler.transform(&x_test_raw)?;

        let pick = |idx: &[usize]| -> Vec<Vec<i32>> {
            encoded
                .iter()
                .map(|column| idx.iter().map(|&i| column[i]).collect())
                .collect()
        };

        Ok(PreparedData {
            x_train,
            x_test,
            y_train: pick(&train_idx),
            y_test: pick(&test_idx),
            scaler,
        })
    }

    fn fit_forest(
        &self,
        data: &PreparedData,
        targets: &[String],
        n_trees: u16,
    ) -> Result<MultiOutputForest> {
        MultiOutputForest::fit(
            &data.x_train,
            targets,
            &data.y_train,
            ForestParams {
                n_trees,
                max_depth: self.config.max_depth,
                seed: self.config.seed,
            },
        )
    }
}

fn evaluate(
    model: &MultiOutputForest,
    x_test: &Array2<f64>,
    y_test: &[Vec<i32>],
) -> Result<Vec<TargetAccuracy>> {
    let predictions = model.predict(x_test)?;
    let scores: Vec<TargetAccuracy> = model
        .targets()
        .iter()
        .zip(predictions.iter().zip(y_test))
        .map(|(target, (y_pred, y_true))| TargetAccuracy {
            target: target.clone(),
            accuracy: accuracy(y_true, y_pred),
        })
        .collect();

    if let Some(worst) = scores
        .iter()
        .min_by(|a, b| a.accuracy.total_cmp(&b.accuracy))
        .filter(|a| a.accuracy < 0.5)
    {
        warn!(target_column = %worst.target, accuracy = worst.accuracy, "Low held-out accuracy");
    }
    Ok(scores)
}
