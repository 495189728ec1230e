//! Test utilities: model artifacts, configs and test servers.

use std::path::{Path, PathBuf};

use axum_test::TestServer;
use serde_json::{Value, json};

use crate::config::Config;

/// File name the helpers write artifacts to.
pub const MODEL_FILE: &str = "node_volume_model.json";

/// A three-node tree: `features[feature] < threshold ? left : right`.
pub fn stump(feature: u32, threshold: f32, left: f32, right: f32) -> Value {
    json!({
        "left_children": [1, -1, -1],
        "right_children": [2, -1, -1],
        "split_indices": [feature, 0, 0],
        "split_conditions": [threshold, left, right],
        "default_left": [1, 0, 0],
        "split_type": [0, 0, 0],
    })
}

/// A complete XGBoost JSON artifact around `trees`.
pub fn model_json(trees: Vec<Value>, base_score: &str, objective: &str) -> Value {
    let num_trees = trees.len().to_string();
    json!({
        "learner": {
            "attributes": {},
            "feature_names": ["node", "time"],
            "feature_types": ["int", "int"],
            "gradient_booster": {
                "name": "gbtree",
                "model": {
                    "gbtree_model_param": { "num_parallel_tree": "1", "num_trees": num_trees },
                    "tree_info": vec![0; trees.len()],
                    "trees": trees,
                }
            },
            "learner_model_param": {
                "base_score": base_score,
                "num_class": "0",
                "num_feature": "2",
                "num_target": "1"
            },
            "objective": { "name": objective }
        },
        "version": [2, 0, 3]
    })
}

/// A model that predicts `volume` everywhere.
pub fn constant_model_json(volume: f32) -> Value {
    model_json(vec![stump(0, 1.0, volume, volume)], "0", "reg:squarederror")
}

/// `(node < 3 ? 10 : 20) + (time < 12 ? 5 : 15)`
pub fn sample_model_json() -> Value {
    model_json(
        vec![stump(0, 3.0, 10.0, 20.0), stump(1, 12.0, 5.0, 15.0)],
        "0",
        "reg:squarederror",
    )
}

/// Predicts 2.0 for nodes 1 and 2; the margin overflows `f32` for every node from 3 up.
pub fn overflowing_model_json() -> Value {
    model_json(
        vec![stump(0, 2.5, 1.0, 3e38), stump(0, 2.5, 1.0, 3e38)],
        "0",
        "reg:squarederror",
    )
}

/// Write `model` to `dir/node_volume_model.json`, replacing any previous artifact.
pub fn write_model(dir: &Path, model: &Value) -> PathBuf {
    let path = dir.join(MODEL_FILE);
    std::fs::write(&path, model.to_string()).expect("Failed to write model artifact");
    path
}

pub fn create_test_config(model_path: &Path) -> Config {
    let mut config = Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        ..Default::default()
    };
    config.model.path = model_path.to_path_buf();
    config
}

pub async fn create_test_app(config: Config) -> (TestServer, crate::BackgroundServices) {
    let app = crate::Application::new(config).await.expect("Failed to create application");
    app.into_test_server()
}
