use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Training hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Number of progress rounds; round `r` fits `r * trees_per_round` trees
    #[serde(default = "default_rounds")]
    pub rounds: usize,

    /// Tree increment per round
    #[serde(default = "default_trees_per_round")]
    pub trees_per_round: u16,

    /// Fraction of rows held out for accuracy reporting
    #[serde(default = "default_test_fraction")]
    pub test_fraction: f64,

    /// Seed for the split and for bootstrap sampling
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Optional depth cap for every tree
    #[serde(default)]
    pub max_depth: Option<u16>,
}

impl TrainingConfig {
    /// Tree count of the final, persisted forest
    pub fn final_trees(&self) -> u16 {
        self.trees_for_round(self.rounds)
    }

    pub fn trees_for_round(&self, round: usize) -> u16 {
        let trees = round.saturating_mul(self.trees_per_round as usize);
        trees.min(u16::MAX as usize) as u16
    }
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            rounds: default_rounds(),
            trees_per_round: default_trees_per_round(),
            test_fraction: default_test_fraction(),
            seed: default_seed(),
            max_depth: None,
        }
    }
}

fn default_rounds() -> usize {
    5
}

fn default_trees_per_round() -> u16 {
    20
}

fn default_test_fraction() -> f64 {
    0.5
}

fn default_seed() -> u64 {
    42
}

/// Decoded output for one target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelPrediction {
    /// Decoded label string
    pub label: String,

    /// Encoder code the classifier produced
    pub numeric: i32,
}

/// Per-target predictions for one sample, keyed by target name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Prediction {
    outputs: BTreeMap<String, LabelPrediction>,
}

impl Prediction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, target: impl Into<String>, prediction: LabelPrediction) {
        self.outputs.insert(target.into(), prediction);
    }

    pub fn get(&self, target: &str) -> Option<&LabelPrediction> {
        self.outputs.get(target)
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &LabelPrediction)> {
        self.outputs.iter()
    }
}

/// Held-out accuracy for one target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetAccuracy {
    pub target: String,
    pub accuracy: f64,
}

/// Progress report for one training round
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundReport {
    /// 1-based round index
    pub round: usize,

    /// Total number of rounds
    pub rounds: usize,

    /// Trees per forest in this round
    pub n_trees: u16,

    /// Accuracy per target, in target order
    pub accuracy: Vec<TargetAccuracy>,
}

/// Outcome of a complete training run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    /// Rows used for fitting
    pub n_train: usize,

    /// Rows held out for accuracy
    pub n_test: usize,

    /// Trees per forest in the persisted model
    pub n_trees: u16,

    /// Progress rounds, in order
    pub rounds: Vec<RoundReport>,

    /// Accuracy of the persisted model, in target order
    pub final_accuracy: Vec<TargetAccuracy>,
}

impl TrainingReport {
    pub fn accuracy_for(&self, target: &str) -> Option<f64> {
        self.final_accuracy
            .iter()
            .find(|a| a.target == target)
            .map(|a| a.accuracy)
    }
}

/// Facts about a training run stored alongside the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleMetadata {
    /// When the bundle was produced
    pub trained_at: DateTime<Utc>,

    /// Trees per forest
    pub n_trees: u16,

    /// Rows used for fitting
    pub n_train: usize,

    /// Rows held out
    pub n_test: usize,

    /// Held-out accuracy, in target order
    pub held_out_accuracy: Vec<TargetAccuracy>,
}
