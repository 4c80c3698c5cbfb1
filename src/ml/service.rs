use crate::error::{AppError, Result};
use crate::ml::artifact::ArtifactBundle;
use crate::ml::models::{Prediction, TargetAccuracy};
use crate::models::{FeatureInput, SensorReading};
use crate::state::RecordStore;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use strum::{Display, EnumString};
use tracing::{debug, info, warn};

/// Lifecycle of the cached artifact bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ServiceState {
    Uninitialized,
    Loading,
    Ready,
    Failed,
}

/// Serves predictions from a lazily loaded artifact bundle.
///
/// The bundle is read from disk on first use and shared read-only after
/// that. Concurrent first callers wait on a single load.
pub struct InferenceService {
    /// Where the trained bundle lives
    artifact_path: PathBuf,

    /// Loaded bundle, if any
    cache: RwLock<Option<Arc<ArtifactBundle>>>,

    /// Serializes loads and invalidation
    load_lock: Mutex<()>,

    /// Current lifecycle state
    state: RwLock<ServiceState>,

    /// Number of times the bundle was read from disk
    loads: AtomicUsize,
}

impl std::fmt::Debug for InferenceService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceService")
            .field("artifact_path", &self.artifact_path)
            .field("state", &self.state())
            .field("loads", &self.loads())
            .finish()
    }
}

impl InferenceService {
    pub fn new(artifact_path: impl Into<PathBuf>) -> Self {
        Self {
            artifact_path: artifact_path.into(),
            cache: RwLock::new(None),
            load_lock: Mutex::new(()),
            state: RwLock::new(ServiceState::Uninitialized),
            loads: AtomicUsize::new(0),
        }
    }

    pub fn artifact_path(&self) -> &Path {
        &self.artifact_path
    }

    pub fn state(&self) -> ServiceState {
        *self.state.read()
    }

    /// Disk reads performed so far, successful or not
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn is_ready(&self) -> bool {
        self.cache.read().is_some()
    }

    /// Return the cached bundle, loading it on first use
    pub fn bundle(&self) -> Result<Arc<ArtifactBundle>> {
        if let Some(bundle) = self.cache.read().as_ref() {
            return Ok(Arc::clone(bundle));
        }

        let _guard = self.load_lock.lock();

        // another caller may have finished loading while we waited
        if let Some(bundle) = self.cache.read().as_ref() {
            return Ok(Arc::clone(bundle));
        }

        *self.state.write() = ServiceState::Loading;
        self.loads.fetch_add(1, Ordering::SeqCst);

        match ArtifactBundle::load(&self.artifact_path) {
            Ok(bundle) => {
                let bundle = Arc::new(bundle);
                *self.cache.write() = Some(Arc::clone(&bundle));
                *self.state.write() = ServiceState::Ready;
                info!(
                    path = %self.artifact_path.display(),
                    trained_at = %bundle.metadata().trained_at,
                    "Model bundle loaded"
                );
                Ok(bundle)
            }
            Err(e) => {
                *self.state.write() = ServiceState::Failed;
                warn!(path = %self.artifact_path.display(), error = %e, "Model bundle load failed");
                Err(e)
            }
        }
    }

    /// Drop the cached bundle; the next call reloads from disk
    pub fn invalidate(&self) {
        let _guard = self.load_lock.lock();
        *self.cache.write() = None;
        *self.state.write() = ServiceState::Uninitialized;
        info!("Model cache invalidated");
    }

    /// Invalidate and load again right away
    pub fn reload(&self) -> Result<Arc<ArtifactBundle>> {
        self.invalidate();
        self.bundle()
    }

    /// Predict every target for one sample
    pub fn predict(&self, input: &FeatureInput) -> Result<Prediction> {
        let bundle = self.bundle()?;
        let prediction = bundle.predict(input)?;
        debug!(targets = prediction.len(), "Prediction served");
        Ok(prediction)
    }

    /// Predict from the most recent stored reading
    pub async fn predict_latest(&self, store: &dyn RecordStore) -> Result<LatestPrediction> {
        let reading = store.latest().await?.ok_or(AppError::NoRecordsAvailable)?;
        let prediction = self.predict(&reading.to_features())?;
        Ok(LatestPrediction {
            reading,
            prediction,
        })
    }

    /// Current state plus details of the cached bundle, without loading
    pub fn info(&self) -> ModelInfo {
        let bundle = self.cache.read().as_ref().map(|b| BundleSummary::from(b.as_ref()));
        ModelInfo {
            state: self.state(),
            artifact_path: self.artifact_path.display().to_string(),
            loads: self.loads(),
            bundle,
        }
    }
}

/// Prediction for the newest stored reading
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatestPrediction {
    pub reading: SensorReading,
    pub prediction: Prediction,
}

/// Inference status report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub state: ServiceState,
    pub artifact_path: String,
    pub loads: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bundle: Option<BundleSummary>,
}

/// What a loaded bundle was trained with
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleSummary {
    pub schema_version: u32,
    pub trained_at: DateTime<Utc>,
    pub n_trees: u16,
    pub n_train: usize,
    pub n_test: usize,
    pub feature_columns: Vec<String>,

    /// Vocabulary per target
    pub classes: BTreeMap<String, Vec<String>>,

    pub held_out_accuracy: Vec<TargetAccuracy>,
}

impl From<&ArtifactBundle> for BundleSummary {
    fn from(bundle: &ArtifactBundle) -> Self {
        let metadata = bundle.metadata();
        Self {
            schema_version: bundle.schema_version(),
            trained_at: metadata.trained_at,
            n_trees: metadata.n_trees,
            n_train: metadata.n_train,
            n_test: metadata.n_test,
            feature_columns: bundle.feature_columns().to_vec(),
            classes: bundle
                .encoders()
                .iter()
                .map(|e| (e.target().to_string(), e.classes().to_vec()))
                .collect(),
            held_out_accuracy: metadata.held_out_accuracy.clone(),
        }
    }
}
