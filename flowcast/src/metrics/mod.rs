//! Prediction and model lifecycle metrics.
//!
//! Recorded through the `metrics` facade. When `enable_metrics` is on, axum-prometheus installs
//! the global Prometheus recorder and these series are rendered at `/internal/metrics` next to
//! the HTTP request metrics. Without a recorder every call here is a no-op.

use std::time::Duration;

use metrics::{counter, histogram};

/// Which prediction path a sample belongs to.
#[derive(Debug, Clone, Copy)]
pub enum PredictionKind {
    Single,
    Batch,
}

impl PredictionKind {
    fn as_str(self) -> &'static str {
        match self {
            PredictionKind::Single => "single",
            PredictionKind::Batch => "batch",
        }
    }
}

/// Record one successful model evaluation.
pub fn record_prediction(kind: PredictionKind, elapsed: Duration) {
    counter!("flowcast_predictions_total", "kind" => kind.as_str()).increment(1);
    histogram!("flowcast_inference_duration_seconds", "kind" => kind.as_str()).record(elapsed.as_secs_f64());
}

/// Record a failed model evaluation.
pub fn record_prediction_failure(kind: PredictionKind) {
    counter!("flowcast_prediction_failures_total", "kind" => kind.as_str()).increment(1);
}

/// Record node ids dropped from a batch request.
pub fn record_batch_skipped(count: usize) {
    if count > 0 {
        counter!("flowcast_batch_skipped_nodes_total").increment(count as u64);
    }
}

/// Record the outcome of a model load or reload.
pub fn record_model_load(success: bool) {
    let outcome = if success { "success" } else { "failure" };
    counter!("flowcast_model_loads_total", "outcome" => outcome).increment(1);
}
