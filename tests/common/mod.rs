//! Shared fixtures for the integration tests
//!
//! Builds a small synthetic sensor dataset whose labels follow simple
//! threshold rules, and trains a quick bundle from it.

#![allow(dead_code)]

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use water_quality_monitor::ml::{NoProgress, TrainingConfig, TrainingPipeline, TrainingReport};

pub const DATASET_HEADER: &str = "temperature_C,pH,turbidity_NTU,flow_m_s,trash_detected,\
water_quality,action_decision,pollution_alert,flow_condition,cleaning_recommendation,safety_alert";

/// One synthetic row: features followed by the six labels
pub fn dataset_row(i: usize) -> String {
    let temperature = 15.0 + (i * 7 % 20) as f64;
    let ph = 5.5 + (i * 3 % 7) as f64 * 0.5;
    let turbidity = (i * 13 % 90) as f64;
    let flow = (i % 5) as f64 * 0.4;
    let trash = i % 3 == 0;

    let water_quality = if (6.5..=8.5).contains(&ph) && turbidity < 30.0 {
        "Good"
    } else if turbidity < 60.0 {
        "Fair"
    } else {
        "Poor"
    };
    let action = if trash {
        "Clean"
    } else if water_quality == "Poor" {
        "Treat"
    } else {
        "Monitor"
    };
    let pollution = if turbidity > 60.0 {
        "High"
    } else if turbidity > 30.0 {
        "Medium"
    } else {
        "Low"
    };
    let flow_condition = if flow < 0.3 {
        "Stagnant"
    } else if flow > 1.2 {
        "Fast"
    } else {
        "Normal"
    };
    let cleaning = if trash { "Immediate" } else { "None" };
    let safety = if ph < 6.0 || turbidity > 70.0 { "Unsafe" } else { "Safe" };

    format!(
        "{},{},{},{},{},{},{},{},{},{},{}",
        temperature,
        ph,
        turbidity,
        flow,
        if trash { "Yes" } else { "No" },
        water_quality,
        action,
        pollution,
        flow_condition,
        cleaning,
        safety
    )
}

/// Write an `n`-row dataset into `dir` and return its path
pub fn write_dataset(dir: &Path, n: usize) -> PathBuf {
    let mut contents = String::from(DATASET_HEADER);
    contents.push('\n');
    for i in 0..n {
        let _ = writeln!(contents, "{}", dataset_row(i));
    }

    let path = dir.join("training.csv");
    std::fs::write(&path, contents).unwrap();
    path
}

/// Small, fast training settings
pub fn quick_config() -> TrainingConfig {
    TrainingConfig {
        rounds: 2,
        trees_per_round: 5,
        ..Default::default()
    }
}

/// Train on a fresh 20-row dataset and write the bundle into `dir`
pub fn train_bundle(dir: &Path) -> (PathBuf, TrainingReport) {
    let dataset = write_dataset(dir, 20);
    let artifact = dir.join("ml_artifacts.bin");
    let report = TrainingPipeline::new(quick_config())
        .run(&dataset, &artifact, &mut NoProgress)
        .unwrap();
    (artifact, report)
}
