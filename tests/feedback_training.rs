//! End-to-end tests: CSV fixtures on disk, experiment files, training and
//! checkpoints.

use dga_gnn::graph::{self, DatasetName, SplitParams};
use dga_gnn::training::{
    load_history, load_model, save_history, save_model, train, FeedbackTrainer, TrainerConfig,
};
use dga_gnn::Error;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Synthetic `test` dataset: 30 nodes on a ring with chords, every fourth
/// node fraudulent, two features.
fn write_test_dataset(dir: &Path) {
    let mut nodes = String::from("node_id,timestamp,label,amount,velocity\n");
    for i in 0..30 {
        let label = u8::from(i % 4 == 0);
        let amount = if label == 1 { 5.0 + i as f32 * 0.1 } else { 1.0 + (i % 3) as f32 * 0.2 };
        nodes.push_str(&format!("{i},{},{label},{amount},{}\n", i / 5, (i % 5) as f32 * 0.5));
    }
    let mut edges = String::from("src,dst\n");
    for i in 0..30 {
        edges.push_str(&format!("{i},{}\n", (i + 1) % 30));
        edges.push_str(&format!("{i},{}\n", (i + 11) % 30));
    }
    fs::write(dir.join("nodes.csv"), nodes).unwrap();
    fs::write(dir.join("edges.csv"), edges).unwrap();
}

/// Elliptic layout under `raw/`: 12 transactions over 6 time steps, two with
/// unknown class, and one edge pointing at an unlisted transaction.
fn write_elliptic_dataset(dir: &Path) {
    let raw = dir.join("raw");
    fs::create_dir_all(&raw).unwrap();

    let mut features = String::new();
    let mut classes = String::from("txId,class\n");
    for i in 0..12 {
        let tx = 1000 + i;
        let step = i / 2 + 1;
        features.push_str(&format!("{tx},{step},{}.5,{}\n", i % 3, (i * 7) % 5));
        let class = match i {
            3 | 8 => "unknown",
            i if i % 3 == 0 => "1",
            _ => "2",
        };
        classes.push_str(&format!("{tx},{class}\n"));
    }
    let mut edges = String::from("txId1,txId2\n");
    for i in 0..11 {
        edges.push_str(&format!("{},{}\n", 1000 + i, 1001 + i));
    }
    edges.push_str("1000,9999\n");

    fs::write(raw.join("elliptic_txs_features.csv"), features).unwrap();
    fs::write(raw.join("elliptic_txs_classes.csv"), classes).unwrap();
    fs::write(raw.join("elliptic_txs_edgelist.csv"), edges).unwrap();
}

fn test_config(dir: &TempDir, epochs: usize) -> TrainerConfig {
    TrainerConfig {
        data_path: dir.path().to_path_buf(),
        dataset_name: DatasetName::Test,
        in_feats: 2,
        hidden_dim: 8,
        epochs,
        lr: 0.05,
        seed: Some(11),
        ..Default::default()
    }
}

#[test]
fn test_train_on_test_dataset() {
    let dir = tempfile::tempdir().unwrap();
    write_test_dataset(dir.path());

    let outcome = train(&test_config(&dir, 5)).unwrap();

    assert_eq!(outcome.history.len(), 6);
    assert!(outcome.history.get(0).unwrap().as_slice().iter().all(|&g| g == 0));
    for snapshot in outcome.history.iter() {
        assert_eq!(snapshot.len(), 30);
    }
    assert_eq!(outcome.report.records.len(), 5);
    assert!(outcome.report.records.iter().all(|r| r.loss.is_finite()));
    assert!(outcome.report.records.iter().all(|r| r.val_accuracy.is_some()));
    let test = outcome.evaluation.test.unwrap();
    assert_eq!(test.support, 6);
}

#[test]
fn test_elliptic_loading_and_training() {
    let dir = tempfile::tempdir().unwrap();
    write_elliptic_dataset(dir.path());

    let split = SplitParams {
        train_split_step: 3,
        val_split_step: 5,
    };
    let data = graph::load(dir.path(), DatasetName::Elliptic, split).unwrap();
    assert_eq!(data.num_nodes(), 10);
    assert_eq!(data.num_features(), 2);
    // Edges touching 1003, 1008 or 9999 are dropped.
    assert_eq!(data.dropped_edges, 5);
    assert_eq!(data.graph.num_edges(), 7);
    assert!(data.labels.iter().all(|&l| l <= 1));
    // Steps 1-2 train, 3-4 val, 5-6 test.
    assert_eq!(data.masks.counts(), (3, 4, 3));

    let config = TrainerConfig {
        data_path: dir.path().to_path_buf(),
        dataset_name: DatasetName::Elliptic,
        train_split_step: 3,
        val_split_step: 5,
        in_feats: 2,
        hidden_dim: 4,
        epochs: 3,
        seed: Some(5),
        ..Default::default()
    };
    let outcome = FeedbackTrainer::new(config, data).unwrap().run().unwrap();
    assert_eq!(outcome.history.len(), 4);
}

#[test]
fn test_experiment_file_drives_training() {
    let dir = tempfile::tempdir().unwrap();
    write_test_dataset(dir.path());
    let config_path = dir.path().join("experiment.json");
    let experiment = serde_json::json!({
        "data": {"path": dir.path(), "dataset_name": "test"},
        "model": {"in_feats": 2, "hidden_dim": 4, "num_classes": 2},
        "training": {"lr": 0.01, "epochs": 2, "device": "cpu", "seed": 3}
    });
    fs::write(&config_path, experiment.to_string()).unwrap();

    let config = TrainerConfig::load(&config_path).unwrap();
    assert_eq!(config.epochs, 2);
    assert_eq!(config.seed, Some(3));
    let outcome = train(&config).unwrap();
    assert_eq!(outcome.history.len(), 3);
}

#[test]
fn test_checkpoints_round_trip_through_disk() {
    let dir = tempfile::tempdir().unwrap();
    write_test_dataset(dir.path());
    let outcome = train(&test_config(&dir, 3)).unwrap();

    let model_path = dir.path().join("model.bin");
    let history_path = dir.path().join("groups.json");
    save_model(&outcome.model, &model_path).unwrap();
    save_history(&outcome.history, &history_path).unwrap();

    let data = graph::load(dir.path(), DatasetName::Test, SplitParams::default()).unwrap();
    let restored = load_model(&model_path).unwrap();
    let groups = outcome.history.last().unwrap().as_slice();
    assert_eq!(
        restored.predict(&data.graph, &data.features, groups).unwrap(),
        outcome.model.predict(&data.graph, &data.features, groups).unwrap()
    );
    assert_eq!(load_history(&history_path).unwrap(), outcome.history);
}

#[test]
fn test_configuration_errors() {
    let dir = tempfile::tempdir().unwrap();
    write_test_dataset(dir.path());

    let wrong_width = TrainerConfig {
        in_feats: 165,
        ..test_config(&dir, 1)
    };
    assert!(matches!(train(&wrong_width), Err(Error::ShapeMismatch { .. })));

    let too_few_groups = TrainerConfig {
        num_groups: 1,
        ..test_config(&dir, 1)
    };
    assert!(matches!(train(&too_few_groups), Err(Error::InvalidConfig(_))));

    let missing = TrainerConfig {
        data_path: dir.path().join("missing"),
        ..test_config(&dir, 1)
    };
    assert!(matches!(train(&missing), Err(Error::Io(_))));

    assert!(matches!(
        "cora".parse::<DatasetName>(),
        Err(Error::UnknownDataset(_))
    ));
}
