use crate::error::{AppError, Result};
use crate::ml::classifier::MultiOutputForest;
use crate::ml::encoding::LabelEncoder;
use crate::ml::models::{BundleMetadata, LabelPrediction, Prediction};
use crate::ml::scaler::FeatureScaler;
use crate::models::{FeatureInput, FEATURE_COLUMNS, TARGET_COLUMNS};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Bumped whenever the bundle layout or the feature/target schema changes
pub const ARTIFACT_SCHEMA_VERSION: u32 = 2;

const ARTIFACT_MAGIC: [u8; 4] = *b"WQMB";

/// Fixed-layout prefix checked before the body is decoded
#[derive(Debug, Serialize, Deserialize)]
struct ArtifactHeader {
    magic: [u8; 4],
    schema_version: u32,
}

/// Everything inference needs, persisted as one unit
#[derive(Debug, Serialize, Deserialize)]
pub struct ArtifactBundle {
    /// Feature order the scaler and classifier were fitted with
    feature_columns: Vec<String>,

    /// Target order of the classifier outputs
    target_columns: Vec<String>,

    classifier: MultiOutputForest,

    scaler: FeatureScaler,

    /// One encoder per target, in `target_columns` order
    encoders: Vec<LabelEncoder>,

    metadata: BundleMetadata,
}

impl ArtifactBundle {
    /// Assemble a bundle, checking that its parts agree with each other
    pub fn new(
        feature_columns: Vec<String>,
        classifier: MultiOutputForest,
        scaler: FeatureScaler,
        encoders: Vec<LabelEncoder>,
        metadata: BundleMetadata,
    ) -> Result<Self> {
        let target_columns: Vec<String> =
            encoders.iter().map(|e| e.target().to_string()).collect();

        if classifier.targets() != target_columns.as_slice() {
            return Err(AppError::Internal(format!(
                "classifier targets {:?} do not match encoders {:?}",
                classifier.targets(),
                target_columns
            )));
        }
        if scaler.n_features() != feature_columns.len()
            || classifier.n_features() != feature_columns.len()
        {
            return Err(AppError::Internal(format!(
                "{} feature columns but scaler has {} and classifier {}",
                feature_columns.len(),
                scaler.n_features(),
                classifier.n_features()
            )));
        }

        Ok(Self {
            feature_columns,
            target_columns,
            classifier,
            scaler,
            encoders,
            metadata,
        })
    }

    pub fn schema_version(&self) -> u32 {
        ARTIFACT_SCHEMA_VERSION
    }

    pub fn feature_columns(&self) -> &[String] {
        &self.feature_columns
    }

    pub fn target_columns(&self) -> &[String] {
        &self.target_columns
    }

    pub fn classifier(&self) -> &MultiOutputForest {
        &self.classifier
    }

    pub fn scaler(&self) -> &FeatureScaler {
        &self.scaler
    }

    pub fn encoders(&self) -> &[LabelEncoder] {
        &self.encoders
    }

    pub fn encoder(&self, target: &str) -> Option<&LabelEncoder> {
        self.encoders.iter().find(|e| e.target() == target)
    }

    pub fn metadata(&self) -> &BundleMetadata {
        &self.metadata
    }

    /// Scale, classify and decode one sample
    pub fn predict(&self, input: &FeatureInput) -> Result<Prediction> {
        let row = input.to_row(&self.feature_columns)?;
        let scaled = self.scaler.transform(&row)?;
        let codes = self.classifier.predict_one(&scaled)?;

        let mut prediction = Prediction::new();
        for (encoder, code) in self.encoders.iter().zip(codes) {
            let label = encoder.decode(code)?;
            prediction.insert(
                encoder.target(),
                LabelPrediction {
                    label: label.to_string(),
                    numeric: code,
                },
            );
        }
        Ok(prediction)
    }

    /// Write the bundle, replacing any previous one.
    ///
    /// The bytes go to a sibling temp file that is renamed over `path`, so
    /// readers see either the old bundle or the complete new one.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let tmp_path = temp_path(path);
        let write_result = (|| -> Result<()> {
            let mut writer = BufWriter::new(File::create(&tmp_path)?);
            let header = ArtifactHeader {
                magic: ARTIFACT_MAGIC,
                schema_version: ARTIFACT_SCHEMA_VERSION,
            };
            bincode::serialize_into(&mut writer, &header)?;
            bincode::serialize_into(&mut writer, self)?;
            writer.flush()?;
            writer
                .into_inner()
                .map_err(|e| AppError::Io(e.into_error()))?
                .sync_all()?;
            Ok(())
        })();

        if let Err(e) = write_result {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }

        fs::rename(&tmp_path, path)?;
        info!(path = %path.display(), "Saved artifact bundle");
        Ok(())
    }

    /// Read a bundle and verify it matches this build's schema
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(AppError::ArtifactNotFound(path.display().to_string()));
        }

        let mut reader = BufReader::new(File::open(path)?);
        let header: ArtifactHeader = bincode::deserialize_from(&mut reader).map_err(|e| {
            AppError::ArtifactIncompatible(format!("unreadable header: {}", e))
        })?;

        if header.magic != ARTIFACT_MAGIC {
            return Err(AppError::ArtifactIncompatible(format!(
                "{} is not an artifact bundle",
                path.display()
            )));
        }
        if header.schema_version != ARTIFACT_SCHEMA_VERSION {
            return Err(AppError::ArtifactIncompatible(format!(
                "bundle schema version {} but this build reads version {}; retrain",
                header.schema_version, ARTIFACT_SCHEMA_VERSION
            )));
        }

        let bundle: ArtifactBundle = bincode::deserialize_from(&mut reader)?;
        bundle.check_schema()?;

        debug!(
            path = %path.display(),
            trained_at = %bundle.metadata.trained_at,
            "Loaded artifact bundle"
        );
        Ok(bundle)
    }

    /// The bundle must speak exactly the feature and target schema this
    /// build produces.
    fn check_schema(&self) -> Result<()> {
        if self.feature_columns != FEATURE_COLUMNS {
            return Err(AppError::ArtifactIncompatible(format!(
                "feature columns {:?} differ from expected {:?}",
                self.feature_columns, FEATURE_COLUMNS
            )));
        }
        if self.target_columns != TARGET_COLUMNS {
            return Err(AppError::ArtifactIncompatible(format!(
                "target columns {:?} differ from expected {:?}",
                self.target_columns, TARGET_COLUMNS
            )));
        }
        Ok(())
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::classifier::ForestParams;
    use ndarray::Array2;
    use tempfile::TempDir;

    fn small_bundle(feature_columns: Vec<String>) -> ArtifactBundle {
        let n = 12;
        let width = feature_columns.len();
        let mut x = Array2::zeros((n, width));
        for i in 0..n {
            for j in 0..width {
                x[[i, j]] = (i * (j + 1)) as f64;
            }
        }
        let scaler = FeatureScaler::fit(&x).unwrap();
        let scaled = scaler.transform(&x).unwrap();

        let targets: Vec<String> = TARGET_COLUMNS.iter().map(|t| t.to_string()).collect();
        let encoders: Vec<LabelEncoder> = targets
            .iter()
            .map(|t| LabelEncoder::fit(t, ["High", "Low"]).unwrap())
            .collect();
        let labels: Vec<Vec<i32>> = targets
            .iter()
            .map(|_| (0..n).map(|i| if i < n / 2 { 1 } else { 0 }).collect())
            .collect();

        let classifier = MultiOutputForest::fit(
            &scaled,
            &targets,
            &labels,
            ForestParams {
                n_trees: 3,
                max_depth: None,
                seed: 42,
            },
        )
        .unwrap();

        ArtifactBundle::new(
            feature_columns,
            classifier,
            scaler,
            encoders,
            BundleMetadata {
                trained_at: chrono::Utc::now(),
                n_trees: 3,
                n_train: n,
                n_test: 0,
                held_out_accuracy: Vec::new(),
            },
        )
        .unwrap()
    }

    fn standard_columns() -> Vec<String> {
        FEATURE_COLUMNS.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("ml_artifacts.bin");
        let bundle = small_bundle(standard_columns());
        bundle.save(&path).unwrap();

        assert!(path.exists());
        assert!(!temp_path(&path).exists());

        let loaded = ArtifactBundle::load(&path).unwrap();
        assert_eq!(loaded.feature_columns(), bundle.feature_columns());
        assert_eq!(loaded.target_columns(), bundle.target_columns());
        assert_eq!(loaded.scaler(), bundle.scaler());
        assert_eq!(loaded.encoders(), bundle.encoders());
        assert_eq!(loaded.metadata(), bundle.metadata());

        let input = FeatureInput::new().with("pH", 3.0).with("temperature_C", 3.0);
        assert_eq!(loaded.predict(&input).unwrap(), bundle.predict(&input).unwrap());
    }

    #[test]
    fn test_save_overwrites_previous_bundle() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ml_artifacts.bin");

        let first = small_bundle(standard_columns());
        first.save(&path).unwrap();
        let second = small_bundle(standard_columns());
        second.save(&path).unwrap();

        let loaded = ArtifactBundle::load(&path).unwrap();
        assert_eq!(loaded.metadata().trained_at, second.metadata().trained_at);
    }

    #[test]
    fn test_load_missing_is_artifact_not_found() {
        let dir = TempDir::new().unwrap();
        let result = ArtifactBundle::load(&dir.path().join("missing.bin"));
        assert!(matches!(result, Err(AppError::ArtifactNotFound(_))));
    }

    #[test]
    fn test_load_rejects_foreign_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ml_artifacts.bin");
        fs::write(&path, b"definitely not a bundle").unwrap();

        assert!(matches!(
            ArtifactBundle::load(&path),
            Err(AppError::ArtifactIncompatible(_))
        ));
    }

    #[test]
    fn test_load_rejects_other_schema_version() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ml_artifacts.bin");
        let header = ArtifactHeader {
            magic: ARTIFACT_MAGIC,
            schema_version: ARTIFACT_SCHEMA_VERSION + 1,
        };
        fs::write(&path, bincode::serialize(&header).unwrap()).unwrap();

        match ArtifactBundle::load(&path) {
            Err(AppError::ArtifactIncompatible(msg)) => assert!(msg.contains("retrain")),
            other => panic!("expected ArtifactIncompatible, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_load_rejects_different_feature_schema() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ml_artifacts.bin");
        let mut columns = standard_columns();
        columns.swap(0, 1);
        small_bundle(columns).save(&path).unwrap();

        assert!(matches!(
            ArtifactBundle::load(&path),
            Err(AppError::ArtifactIncompatible(_))
        ));
    }

    #[test]
    fn test_new_rejects_inconsistent_parts() {
        let bundle = small_bundle(standard_columns());
        let ArtifactBundle {
            classifier,
            scaler,
            encoders,
            metadata,
            ..
        } = bundle;

        let result = ArtifactBundle::new(
            vec!["pH".to_string()],
            classifier,
            scaler,
            encoders,
            metadata,
        );
        assert!(matches!(result, Err(AppError::Internal(_))));
    }
}
