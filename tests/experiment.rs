//! End-to-end runs over CSV files on disk

use std::io::Write;

use lccde::ml::{DecisionPath, LearnerKind, LearnerSpec};
use lccde::{DatasetLoader, ExperimentConfig, ExperimentRunner, LccdeError, ReportFormat};

const CLASSES: [&str; 4] = ["BENIGN", "DoS", "PortScan", "WebAttack"];

/// Four well separated classes; `WebAttack` is the minority
fn write_dataset(dir: &std::path::Path) -> std::path::PathBuf {
    let path = dir.join("flows.csv");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "Flow Duration,Fwd Packets,Bwd Packets,Label").unwrap();
    for i in 0..200usize {
        let class = if i % 10 == 9 { 3 } else { i % 3 };
        let jitter = ((i * 37) % 11) as f32 / 11.0;
        writeln!(
            file,
            "{},{},{},{}",
            class as f32 * 10.0 + jitter,
            (class * 3) as f32 + jitter * 0.5,
            jitter,
            CLASSES[class]
        )
        .unwrap();
    }
    path
}

fn fast_config() -> ExperimentConfig {
    let mut config = ExperimentConfig::default();
    config.smote_sampling_strategy.clear();
    config.learners.a = LearnerSpec::new(LearnerKind::LeafWise)
        .with_param("n_estimators", 20)
        .with_param("min_child_samples", 3);
    config.learners.b = LearnerSpec::new(LearnerKind::DepthWise).with_param("n_estimators", 20);
    config.learners.c = LearnerSpec::new(LearnerKind::Oblivious).with_param("n_estimators", 20);
    config.stratify = true;
    config
}

#[test]
fn test_full_run_from_csv() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = DatasetLoader::new().load(&write_dataset(dir.path())).unwrap();
    assert_eq!(dataset.label_set.len(), 4);
    // label encoder sorts names
    assert_eq!(dataset.label_set.names()[3], "WebAttack");

    let outcome = ExperimentRunner::new(fast_config()).unwrap().run(&dataset).unwrap();

    assert!(outcome.lccde.accuracy > 0.9);
    assert_eq!(outcome.lccde.confusion_matrix.n_classes(), 4);
    for (label, row) in outcome.lccde.confusion_matrix.rows().iter().enumerate() {
        let truth = outcome
            .test_indices
            .iter()
            .filter(|&&i| dataset.labels[i] == label)
            .count() as u64;
        assert_eq!(row.iter().sum::<u64>(), truth);
    }

    assert_eq!(outcome.leader_names.len(), 4);
    for label in 0..4 {
        for slot in lccde::LearnerSlot::PREFERENCE {
            let score = outcome.scores.score(slot, label);
            assert!((0.0..=1.0).contains(&score));
        }
    }
    let paths: usize = DecisionPath::ALL
        .iter()
        .map(|&p| outcome.decision_stats.count(p))
        .sum();
    assert_eq!(paths, outcome.predictions.len());
}

#[test]
fn test_same_seed_same_outcome() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = DatasetLoader::new().load(&write_dataset(dir.path())).unwrap();
    let runner = ExperimentRunner::new(fast_config()).unwrap();
    let first = runner.run(&dataset).unwrap();
    let second = runner.run(&dataset).unwrap();
    assert_eq!(first.test_indices, second.test_indices);
    assert_eq!(first.predictions, second.predictions);
    assert_eq!(first.leaders, second.leaders);
}

#[test]
fn test_config_file_drives_run() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = DatasetLoader::new().load(&write_dataset(dir.path())).unwrap();

    let mut config = fast_config();
    config.smote_enabled = true;
    config.smote_sampling_strategy = [("WebAttack".to_string(), 40)].into_iter().collect();
    config.feature_selection_enabled = true;
    let path = dir.path().join("lccde.toml");
    config.save(&path).unwrap();

    let loaded = ExperimentConfig::load(&path).unwrap();
    assert_eq!(loaded, config);
    let outcome = ExperimentRunner::new(loaded).unwrap().run(&dataset).unwrap();
    assert!(outcome.dataset.train_rows_resampled > outcome.dataset.train_rows);
    assert!(outcome.selected_features.is_some());

    let md = outcome.render(ReportFormat::Markdown).unwrap();
    assert!(md.contains("WebAttack"));
}

#[test]
fn test_single_class_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("one.csv");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "a,b,Label").unwrap();
    for i in 0..20 {
        writeln!(file, "{},{},0", i, i * 2).unwrap();
    }
    drop(file);

    let dataset = DatasetLoader::new().load(&path).unwrap();
    let err = ExperimentRunner::new(fast_config()).unwrap().run(&dataset).unwrap_err();
    assert!(matches!(err, LccdeError::DataInsufficient { label: 0, .. }));
}

#[test]
fn test_smote_unknown_label_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = DatasetLoader::new().load(&write_dataset(dir.path())).unwrap();
    let mut config = fast_config();
    config.smote_enabled = true;
    config.smote_sampling_strategy = [("9".to_string(), 100)].into_iter().collect();
    let err = ExperimentRunner::new(config).unwrap().run(&dataset).unwrap_err();
    assert!(matches!(err, LccdeError::DataInsufficient { label: 9, .. }));
}

#[test]
fn test_cli_json_stdout_is_only_the_report() {
    let dir = tempfile::tempdir().unwrap();
    let data = write_dataset(dir.path());
    let config_path = dir.path().join("lccde.toml");
    fast_config().save(&config_path).unwrap();
    let predictions = dir.path().join("predictions.csv");

    let output = std::process::Command::new(env!("CARGO_BIN_EXE_lccde"))
        .arg("--config")
        .arg(&config_path)
        .args(["run", "--format", "json", "--dataset"])
        .arg(&data)
        .arg("--predictions")
        .arg(&predictions)
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    let value: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(value["lccde"]["model"], "LCCDE");
    assert!(String::from_utf8_lossy(&output.stderr).contains("Predictions written to"));
    assert!(predictions.exists());
}
