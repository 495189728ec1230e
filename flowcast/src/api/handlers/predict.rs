use std::collections::BTreeMap;
use std::time::Instant;

use axum::{
    Json,
    body::Bytes,
    extract::{Query, State},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde_json::Value;
use tracing::{info, instrument, warn};

use super::parse_object_body;
use crate::{
    AppState,
    api::models::{
        predict::{
            BatchPredictionRequest, BatchPredictionResponse, MinimalPredictionResponse, PredictionQuery, PredictionRequest,
            PredictionResponse,
        },
        round_millis,
    },
    config::ServiceMode,
    errors::{Error, Result},
    metrics::{self, PredictionKind},
    model::{FeatureRow, InferenceError, LoadedModel},
    openapi::ErrorBody,
    validation::{coerce_int, validate_parameters, validate_time_point},
};

/// Where the raw node/time pair of a single prediction comes from.
enum SingleInput {
    Query(PredictionQuery),
    Body(Bytes),
}

impl SingleInput {
    fn into_params(self) -> Result<(Option<Value>, Option<Value>)> {
        match self {
            SingleInput::Query(query) => Ok((query.node.map(Value::String), query.time.map(Value::String))),
            SingleInput::Body(body) => {
                let request: PredictionRequest = parse_object_body(&body)?;
                Ok((request.node, request.time))
            }
        }
    }
}

#[utoipa::path(
    get,
    path = "/predict",
    tag = "predictions",
    summary = "Predict volume",
    description = "Predict the traffic volume at a node for an hour of day.",
    params(PredictionQuery),
    responses(
        (status = 200, description = "Predicted volume", body = PredictionResponse),
        (status = 400, description = "Missing or invalid node/time", body = ErrorBody),
        (status = 500, description = "Prediction failed", body = ErrorBody),
        (status = 503, description = "Model not loaded", body = ErrorBody)
    )
)]
#[instrument(skip_all)]
pub async fn predict_get(State(state): State<AppState>, Query(pairs): Query<Vec<(String, String)>>) -> Response {
    respond_single(&state, SingleInput::Query(PredictionQuery::from_pairs(pairs))).await
}

#[utoipa::path(
    post,
    path = "/predict",
    tag = "predictions",
    summary = "Predict volume",
    description = "Predict the traffic volume at a node for an hour of day. Values may be sent as numbers or numeric strings.",
    request_body = PredictionRequest,
    responses(
        (status = 200, description = "Predicted volume", body = PredictionResponse),
        (status = 400, description = "Missing or invalid node/time, or a body that is not a JSON object", body = ErrorBody),
        (status = 500, description = "Prediction failed", body = ErrorBody),
        (status = 503, description = "Model not loaded", body = ErrorBody)
    )
)]
#[instrument(skip_all)]
pub async fn predict_post(State(state): State<AppState>, body: Bytes) -> Response {
    respond_single(&state, SingleInput::Body(body)).await
}

async fn respond_single(state: &AppState, input: SingleInput) -> Response {
    let started = Instant::now();
    let mode = state.config.mode;

    match (mode, predict_single(state, input).await) {
        (ServiceMode::Hardened, Ok((row, volume))) => Json(PredictionResponse {
            node: row.node,
            time: row.time,
            volume,
            processing_time_ms: round_millis(started.elapsed()),
            timestamp: Utc::now(),
            success: true,
        })
        .into_response(),
        (ServiceMode::Minimal, Ok((row, volume))) => Json(MinimalPredictionResponse {
            node: row.node,
            time: row.time,
            volume,
        })
        .into_response(),
        (ServiceMode::Hardened, Err(e)) => e.into_response(),
        (ServiceMode::Minimal, Err(e)) => e.into_plain_response(),
    }
}

/// Check the model first, then the input: a missing model wins over a bad request.
async fn predict_single(state: &AppState, input: SingleInput) -> Result<(FeatureRow, f64)> {
    let model = state.models.ensure_loaded().await.ok_or(Error::ModelUnavailable)?;

    let (node, time) = input.into_params()?;
    let row = validate_parameters(node.as_ref(), time.as_ref(), state.config.mode.strictness())?;

    let volume = evaluate(&model, &row, PredictionKind::Single)?;
    info!(node = row.node, time = row.time, volume, "Prediction succeeded");
    Ok((row, volume))
}

fn evaluate(model: &LoadedModel, row: &FeatureRow, kind: PredictionKind) -> std::result::Result<f64, InferenceError> {
    let started = Instant::now();
    match model.predict_volume(row) {
        Ok(volume) => {
            metrics::record_prediction(kind, started.elapsed());
            Ok(volume)
        }
        Err(e) => {
            metrics::record_prediction_failure(kind);
            Err(e)
        }
    }
}

#[utoipa::path(
    post,
    path = "/predict/batch",
    tag = "predictions",
    summary = "Predict volumes for many nodes",
    description = "Predict the traffic volume of every node in `nodeIds` at `timePoint`. \
        Node ids that are not positive integers, or whose prediction fails, are listed in `skipped`.",
    request_body = BatchPredictionRequest,
    responses(
        (status = 200, description = "Predicted volumes", body = BatchPredictionResponse),
        (status = 400, description = "Missing or empty nodeIds, too many nodeIds, or invalid timePoint", body = ErrorBody),
        (status = 503, description = "Model not loaded", body = ErrorBody)
    )
)]
#[instrument(skip_all)]
pub async fn predict_batch(State(state): State<AppState>, body: Bytes) -> Result<Json<BatchPredictionResponse>> {
    let started = Instant::now();
    let model = state.models.ensure_loaded().await.ok_or(Error::ModelUnavailable)?;

    let request: BatchPredictionRequest = parse_object_body(&body)?;
    let node_ids = match request.node_ids {
        Some(Value::Array(ids)) if !ids.is_empty() => ids,
        _ => {
            return Err(Error::Validation {
                message: "nodeIds must be a non-empty list".to_string(),
            });
        }
    };
    let max_nodes = state.config.batch.max_nodes;
    if node_ids.len() > max_nodes {
        return Err(Error::Validation {
            message: format!("nodeIds cannot contain more than {max_nodes} entries"),
        });
    }
    let time_point = validate_time_point(request.time_point.as_ref()).map_err(|e| Error::Validation {
        message: format!("invalid timePoint: {e}"),
    })?;

    let mut predictions = BTreeMap::new();
    let mut skipped = Vec::new();
    for raw in node_ids {
        let Some(node) = coerce_int(&raw).filter(|node| *node > 0) else {
            skipped.push(raw);
            continue;
        };
        match evaluate(&model, &FeatureRow::new(node, time_point), PredictionKind::Batch) {
            Ok(volume) => {
                predictions.insert(node.to_string(), volume);
            }
            Err(e) => {
                warn!("Prediction failed for node {}: {}", node, e);
                skipped.push(raw);
            }
        }
    }
    metrics::record_batch_skipped(skipped.len());

    let processing_time_ms = round_millis(started.elapsed());
    info!(
        time_point,
        count = predictions.len(),
        skipped = skipped.len(),
        "Batch prediction completed in {:.2}ms",
        processing_time_ms
    );

    Ok(Json(BatchPredictionResponse {
        time_point,
        count: predictions.len(),
        predictions,
        skipped,
        processing_time_ms,
        timestamp: Utc::now(),
        success: true,
    }))
}
