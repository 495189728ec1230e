use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::{IntoParams, ToSchema};

/// Query parameters for `GET /predict`
#[derive(Debug, Default, PartialEq, Eq, IntoParams)]
pub struct PredictionQuery {
    /// Road network node id (positive integer)
    pub node: Option<String>,
    /// Hour of day, 0-23
    pub time: Option<String>,
}

impl PredictionQuery {
    /// Build from raw query pairs. A repeated key keeps its first value; unknown keys are ignored.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        let mut query = PredictionQuery::default();
        for (key, value) in pairs {
            let slot = match key.as_str() {
                "node" => &mut query.node,
                "time" => &mut query.time,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value);
            }
        }
        query
    }
}

/// JSON body for `POST /predict`
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct PredictionRequest {
    /// Road network node id (positive integer)
    #[serde(default)]
    #[schema(value_type = i64, example = 5)]
    pub node: Option<Value>,
    /// Hour of day, 0-23
    #[serde(default)]
    #[schema(value_type = i64, example = 8)]
    pub time: Option<Value>,
}

/// A single volume prediction
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PredictionResponse {
    pub node: i64,
    pub time: i64,
    /// Predicted traffic volume, never below 1.0
    pub volume: f64,
    pub processing_time_ms: f64,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
}

/// A single volume prediction as returned in minimal mode
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MinimalPredictionResponse {
    pub node: i64,
    pub time: i64,
    pub volume: f64,
}

/// JSON body for `POST /predict/batch`
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct BatchPredictionRequest {
    /// Node ids to predict for. Invalid entries are skipped, not rejected.
    #[serde(rename = "nodeIds", default)]
    #[schema(value_type = Vec<i64>)]
    pub node_ids: Option<Value>,
    /// Hour of day shared by every node, 0-23
    #[serde(rename = "timePoint", default)]
    #[schema(value_type = i64, example = 8)]
    pub time_point: Option<Value>,
}

/// Volume predictions for many nodes at one hour
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BatchPredictionResponse {
    #[serde(rename = "timePoint")]
    pub time_point: i64,
    /// Predicted volume keyed by node id
    pub predictions: BTreeMap<String, f64>,
    /// Number of nodes with a prediction
    pub count: usize,
    /// Node ids, as sent, that were invalid or failed to predict
    #[schema(value_type = Vec<Object>)]
    pub skipped: Vec<Value>,
    pub processing_time_ms: f64,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(raw: &[(&str, &str)]) -> Vec<(String, String)> {
        raw.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_query_from_pairs_keeps_first_value() {
        let query = PredictionQuery::from_pairs(pairs(&[("node", "1"), ("node", "2"), ("extra", "x"), ("time", "3")]));
        assert_eq!(
            query,
            PredictionQuery {
                node: Some("1".to_string()),
                time: Some("3".to_string()),
            }
        );
    }

    #[test]
    fn test_query_from_pairs_missing_keys() {
        assert_eq!(PredictionQuery::from_pairs(pairs(&[("node", "4")])).time, None);
        assert_eq!(PredictionQuery::from_pairs(Vec::new()), PredictionQuery::default());
    }
}
