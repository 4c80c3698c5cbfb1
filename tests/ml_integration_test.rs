/// Integration tests for the water quality classifier
///
/// These tests cover the complete ML pipeline:
/// - Dataset loading and schema checks
/// - Training with per-round progress
/// - Bundle persistence and lazy loading
/// - Single-sample and latest-record predictions

mod common;

use common::{quick_config, train_bundle, write_dataset, DATASET_HEADER};
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;
use tempfile::TempDir;
use water_quality_monitor::{
    ml::{
        ArtifactBundle, InferenceService, NoProgress, RoundReport, ServiceState, TrainingDataset,
        TrainingPipeline, TrainingProgress, TrainingReport,
    },
    models::{FeatureInput, FeatureValue, SensorReading, TARGET_COLUMNS, TRASH_DETECTED},
    state::{InMemoryRecordStore, RecordStore},
    AppError,
};

fn example_sample() -> FeatureInput {
    FeatureInput::new()
        .with("temperature_C", 25.0)
        .with("pH", 7.5)
        .with("turbidity_NTU", 12.0)
        .with("flow_m_s", 1.0)
        .with("trash_detected", "No")
}

#[test]
fn test_training_fits_encoders_on_observed_labels() {
    let dir = TempDir::new().unwrap();
    let dataset_path = write_dataset(dir.path(), 20);
    let (artifact, _) = train_bundle(dir.path());

    let dataset = TrainingDataset::load_csv(&dataset_path).unwrap();
    let bundle = ArtifactBundle::load(&artifact).unwrap();

    for target in TARGET_COLUMNS {
        let observed: BTreeSet<&str> = dataset
            .target_labels(target)
            .unwrap()
            .iter()
            .map(String::as_str)
            .collect();
        let encoder = bundle.encoder(target).unwrap();
        let classes: BTreeSet<&str> = encoder.classes().iter().map(String::as_str).collect();
        assert_eq!(classes, observed, "vocabulary of {}", target);
    }
}

#[test]
fn test_training_reports_accuracy_for_every_target() {
    let dir = TempDir::new().unwrap();
    let (_, report) = train_bundle(dir.path());

    assert_eq!(report.n_train, 10);
    assert_eq!(report.n_test, 10);
    assert_eq!(report.final_accuracy.len(), 6);
    for target in TARGET_COLUMNS {
        let acc = report.accuracy_for(target).unwrap();
        assert!((0.0..=1.0).contains(&acc), "{} accuracy {}", target, acc);
    }
}

#[derive(Default)]
struct CountingProgress {
    trees: Vec<u16>,
    final_trees: Option<u16>,
}

impl TrainingProgress for CountingProgress {
    fn on_round(&mut self, report: &RoundReport) {
        self.trees.push(report.n_trees);
    }

    fn on_complete(&mut self, report: &TrainingReport) {
        self.final_trees = Some(report.n_trees);
    }
}

#[test]
fn test_progress_rounds_grow_the_forest() {
    let dir = TempDir::new().unwrap();
    let dataset = write_dataset(dir.path(), 20);
    let artifact = dir.path().join("ml_artifacts.bin");

    let mut progress = CountingProgress::default();
    TrainingPipeline::new(quick_config())
        .run(&dataset, &artifact, &mut progress)
        .unwrap();

    assert_eq!(progress.trees, vec![5, 10]);
    assert_eq!(progress.final_trees, Some(10));
    assert_eq!(ArtifactBundle::load(&artifact).unwrap().metadata().n_trees, 10);
}

#[test]
fn test_predict_returns_all_targets_within_vocabulary() {
    let dir = TempDir::new().unwrap();
    let (artifact, _) = train_bundle(dir.path());
    let service = InferenceService::new(&artifact);

    let prediction = service.predict(&example_sample()).unwrap();
    let bundle = service.bundle().unwrap();

    assert_eq!(prediction.len(), 6);
    for target in TARGET_COLUMNS {
        let value = prediction.get(target).unwrap();
        let encoder = bundle.encoder(target).unwrap();
        assert!(encoder.contains(&value.label));
        assert!(value.numeric >= 0 && (value.numeric as usize) < encoder.n_classes());
        assert_eq!(encoder.encode(&value.label).unwrap(), value.numeric);
    }
}

#[test]
fn test_key_order_does_not_matter() {
    let dir = TempDir::new().unwrap();
    let (artifact, _) = train_bundle(dir.path());
    let service = InferenceService::new(&artifact);

    let forward: FeatureInput = serde_json::from_str(
        r#"{"temperature_C": 25.0, "pH": 7.5, "turbidity_NTU": 12.0, "flow_m_s": 1.0, "trash_detected": "No"}"#,
    )
    .unwrap();
    let shuffled: FeatureInput = serde_json::from_str(
        r#"{"trash_detected": "No", "flow_m_s": 1.0, "pH": 7.5, "turbidity_NTU": 12.0, "temperature_C": 25.0}"#,
    )
    .unwrap();

    assert_eq!(
        service.predict(&forward).unwrap(),
        service.predict(&shuffled).unwrap()
    );
}

#[test]
fn test_trash_flag_is_read_leniently() {
    let dir = TempDir::new().unwrap();
    let (artifact, _) = train_bundle(dir.path());
    let bundle = ArtifactBundle::load(&artifact).unwrap();
    let columns = bundle.feature_columns();
    let trash_column = columns.iter().position(|c| c == TRASH_DETECTED).unwrap();

    let trash_value = |value: serde_json::Value| {
        let value: FeatureValue = serde_json::from_value(value).unwrap();
        let row = example_sample().with(TRASH_DETECTED, value).to_row(columns).unwrap();
        assert_eq!(row.shape(), &[1, columns.len()]);
        assert_eq!(row[[0, 1]], 7.5);
        row[[0, trash_column]]
    };

    for truthy in [json!("YES"), json!("true"), json!(" Yes "), json!(1), json!(true)] {
        assert_eq!(trash_value(truthy.clone()), 1.0, "{}", truthy);
    }
    for falsy in [json!("no"), json!("maybe"), json!(""), json!(0), json!(false), json!(null)] {
        assert_eq!(trash_value(falsy.clone()), 0.0, "{}", falsy);
    }
}

#[test]
fn test_missing_features_default_to_zero() {
    let dir = TempDir::new().unwrap();
    let (artifact, _) = train_bundle(dir.path());
    let service = InferenceService::new(&artifact);

    let sparse = FeatureInput::new().with("pH", 7.0);
    let explicit = FeatureInput::new()
        .with("temperature_C", 0.0)
        .with("pH", 7.0)
        .with("turbidity_NTU", 0.0)
        .with("flow_m_s", 0.0)
        .with("trash_detected", 0.0);

    assert_eq!(
        service.predict(&sparse).unwrap(),
        service.predict(&explicit).unwrap()
    );
}

#[test]
fn test_same_seed_gives_same_model() {
    let first_dir = TempDir::new().unwrap();
    let second_dir = TempDir::new().unwrap();
    let (first, _) = train_bundle(first_dir.path());
    let (second, _) = train_bundle(second_dir.path());

    let first = ArtifactBundle::load(&first).unwrap();
    let second = ArtifactBundle::load(&second).unwrap();

    assert_eq!(first.scaler(), second.scaler());
    assert_eq!(first.encoders(), second.encoders());
    for i in 0..10 {
        let sample = FeatureInput::new()
            .with("temperature_C", 15.0 + i as f64 * 2.0)
            .with("pH", 5.5 + i as f64 * 0.3)
            .with("turbidity_NTU", i as f64 * 9.0)
            .with("flow_m_s", i as f64 * 0.15)
            .with("trash_detected", if i % 2 == 0 { "yes" } else { "no" });
        assert_eq!(first.predict(&sample).unwrap(), second.predict(&sample).unwrap());
    }
}

#[test]
fn test_prediction_does_not_touch_scaler() {
    let dir = TempDir::new().unwrap();
    let (artifact, _) = train_bundle(dir.path());
    let service = InferenceService::new(&artifact);

    let before = service.bundle().unwrap().scaler().clone();
    for turbidity in [0.0, 50.0, 500.0] {
        service
            .predict(&example_sample().with("turbidity_NTU", turbidity))
            .unwrap();
    }
    assert_eq!(service.bundle().unwrap().scaler(), &before);
    assert_eq!(service.loads(), 1);
}

#[test]
fn test_predict_before_training_is_artifact_not_found() {
    let dir = TempDir::new().unwrap();
    let service = InferenceService::new(dir.path().join("ml_artifacts.bin"));

    let err = service.predict(&example_sample()).unwrap_err();
    assert!(matches!(err, AppError::ArtifactNotFound(_)));
    assert!(err.to_string().contains("train"));
    assert_eq!(service.state(), ServiceState::Failed);
}

#[tokio::test]
async fn test_latest_record_prediction() {
    let dir = TempDir::new().unwrap();
    let (artifact, _) = train_bundle(dir.path());
    let service = InferenceService::new(&artifact);
    let store = InMemoryRecordStore::new();

    let err = service.predict_latest(&store).await.unwrap_err();
    assert!(matches!(err, AppError::NoRecordsAvailable));

    store.append(SensorReading::new(6.0, 80.0, 30.0, 0.1)).await.unwrap();
    store.append(SensorReading::new(7.5, 12.0, 25.0, 1.0)).await.unwrap();

    let result = service.predict_latest(&store).await.unwrap();
    assert_eq!(result.reading.ph_value, 7.5);

    let expected = service.predict(&example_sample().with("trash_detected", 0.0)).unwrap();
    assert_eq!(result.prediction, expected);
}

#[test]
fn test_missing_dataset_and_columns() {
    let dir = TempDir::new().unwrap();
    let pipeline = TrainingPipeline::new(quick_config());
    let artifact = dir.path().join("ml_artifacts.bin");

    let missing = pipeline.run(&dir.path().join("nope.csv"), &artifact, &mut NoProgress);
    assert!(matches!(missing, Err(AppError::DataNotFound(_))));

    let header = DATASET_HEADER.replace(",safety_alert", "");
    let path = dir.path().join("short.csv");
    std::fs::write(&path, format!("{}\n20,7,10,1,No,Good,Monitor,Low,Normal,None\n", header)).unwrap();

    match pipeline.run(&path, &artifact, &mut NoProgress) {
        Err(AppError::SchemaMismatch { missing }) => assert_eq!(missing, vec!["safety_alert"]),
        other => panic!("expected schema mismatch, got {:?}", other.map(|r| r.n_trees)),
    }
    assert!(!artifact.exists());
}

#[test]
fn test_retraining_is_picked_up_after_invalidate() {
    let dir = TempDir::new().unwrap();
    let (artifact, _) = train_bundle(dir.path());
    let service = Arc::new(InferenceService::new(&artifact));

    let first = service.bundle().unwrap();
    let dataset = write_dataset(dir.path(), 30);
    TrainingPipeline::new(quick_config())
        .run(&dataset, &artifact, &mut NoProgress)
        .unwrap();

    // still serving the cached bundle
    assert!(Arc::ptr_eq(&first, &service.bundle().unwrap()));

    service.invalidate();
    let second = service.bundle().unwrap();
    assert_eq!(second.metadata().n_train + second.metadata().n_test, 30);
    assert_eq!(service.state(), ServiceState::Ready);
}
