/// Multi-output water quality classifier
///
/// This module provides:
/// - Dataset loading and schema validation
/// - Label encoding and feature standardization
/// - One random forest per target, trained in progress rounds
/// - A versioned artifact bundle persisted to disk
/// - A lazily loaded inference service

pub mod artifact;
pub mod classifier;
pub mod dataset;
pub mod encoding;
pub mod models;
pub mod scaler;
pub mod service;
pub mod training;

pub use artifact::{ArtifactBundle, ARTIFACT_SCHEMA_VERSION};
pub use classifier::{accuracy, ForestParams, MultiOutputForest};
pub use dataset::{split_indices, DatasetRow, TrainingDataset};
pub use encoding::LabelEncoder;
pub use models::{
    BundleMetadata, LabelPrediction, Prediction, RoundReport, TargetAccuracy, TrainingConfig,
    TrainingReport,
};
pub use scaler::FeatureScaler;
pub use service::{BundleSummary, InferenceService, LatestPrediction, ModelInfo, ServiceState};
pub use training::{LogProgress, NoProgress, TrainingPipeline, TrainingProgress};
