//! XGBoost JSON model format and `gbtree` evaluation.
//!
//! Artifacts are produced by `XGBRegressor.save_model("node_volume_model.json")`. Only the
//! fields needed for inference are read; everything else in the file is ignored.
//!
//! ```json
//! {
//!   "learner": {
//!     "feature_names": ["node", "time"],
//!     "gradient_booster": {
//!       "name": "gbtree",
//!       "model": {
//!         "trees": [{
//!           "left_children": [1, -1, -1],
//!           "right_children": [2, -1, -1],
//!           "split_indices": [0, 0, 0],
//!           "split_conditions": [10.5, 120.0, 80.0],
//!           "default_left": [1, 0, 0]
//!         }]
//!       }
//!     },
//!     "learner_model_param": { "base_score": "5E-1", "num_feature": "2" },
//!     "objective": { "name": "reg:squarederror" }
//!   }
//! }
//! ```
//!
//! Traversal follows XGBoost: a node is a leaf when its left child is `-1`, the leaf value is
//! stored in `split_conditions`, a present feature goes left when `value < condition`, and a
//! missing (NaN) feature follows `default_left`. Arithmetic is done in `f32` like XGBoost.

use serde::{Deserialize, Deserializer};

use super::{FEATURE_COLUMNS, FeatureRow, InferenceError, LoadError, ModelSummary, Regressor};

const LEAF: i32 = -1;

#[derive(Debug, Deserialize)]
struct ModelFile {
    learner: Learner,
}

#[derive(Debug, Deserialize)]
struct Learner {
    #[serde(default)]
    feature_names: Vec<String>,
    gradient_booster: GradientBooster,
    learner_model_param: LearnerModelParam,
    objective: ObjectiveSection,
}

#[derive(Debug, Deserialize)]
struct GradientBooster {
    name: String,
    #[serde(default)]
    model: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct GbTreeModel {
    trees: Vec<TreeSection>,
}

#[derive(Debug, Deserialize)]
struct TreeSection {
    left_children: Vec<i32>,
    right_children: Vec<i32>,
    split_indices: Vec<u32>,
    split_conditions: Vec<f32>,
    #[serde(deserialize_with = "flags")]
    default_left: Vec<bool>,
    #[serde(default)]
    split_type: Vec<u8>,
}

/// XGBoost stores every learner parameter as a string.
#[derive(Debug, Deserialize)]
struct LearnerModelParam {
    base_score: String,
    #[serde(default)]
    num_feature: Option<String>,
    #[serde(default)]
    num_class: Option<String>,
    #[serde(default)]
    num_target: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ObjectiveSection {
    name: String,
}

/// `default_left` is written as 0/1 integers by some XGBoost versions and as booleans by others.
fn flags<'de, D>(deserializer: D) -> Result<Vec<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(u8),
    }

    let raw: Vec<Flag> = Deserialize::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|flag| match flag {
            Flag::Bool(b) => b,
            Flag::Int(i) => i != 0,
        })
        .collect())
}

/// How the summed margin is mapped back to the prediction space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Link {
    Identity,
    Logistic,
    Log,
}

impl Link {
    fn for_objective(name: &str) -> Result<Self, LoadError> {
        match name {
            "reg:squarederror" | "reg:linear" | "reg:squaredlogerror" | "reg:pseudohubererror" | "reg:absoluteerror"
            | "reg:quantileerror" => Ok(Link::Identity),
            "reg:logistic" | "binary:logistic" => Ok(Link::Logistic),
            "count:poisson" | "reg:gamma" | "reg:tweedie" => Ok(Link::Log),
            other => Err(LoadError::Invalid(format!("unsupported objective '{other}'"))),
        }
    }

    /// Convert `base_score` (prediction space) into a margin.
    fn margin(self, base_score: f32) -> Result<f32, LoadError> {
        match self {
            Link::Identity => Ok(base_score),
            Link::Logistic if base_score > 0.0 && base_score < 1.0 => Ok((base_score / (1.0 - base_score)).ln()),
            Link::Log if base_score > 0.0 => Ok(base_score.ln()),
            _ => Err(LoadError::Invalid(format!(
                "base_score {base_score} is outside the domain of the objective"
            ))),
        }
    }

    fn apply(self, margin: f32) -> f32 {
        match self {
            Link::Identity => margin,
            Link::Logistic => 1.0 / (1.0 + (-margin).exp()),
            Link::Log => margin.exp(),
        }
    }
}

#[derive(Debug, Clone)]
struct Tree {
    left: Vec<i32>,
    right: Vec<i32>,
    split_index: Vec<u32>,
    split_condition: Vec<f32>,
    default_left: Vec<bool>,
}

impl Tree {
    fn from_section(id: usize, section: TreeSection) -> Result<Self, LoadError> {
        let len = section.left_children.len();
        if len == 0 {
            return Err(LoadError::Invalid(format!("tree {id} has no nodes")));
        }
        let lengths = [
            section.right_children.len(),
            section.split_indices.len(),
            section.split_conditions.len(),
            section.default_left.len(),
        ];
        if lengths.iter().any(|&l| l != len) {
            return Err(LoadError::Invalid(format!("tree {id} has node arrays of different lengths")));
        }
        if section.split_type.iter().any(|&t| t != 0) {
            return Err(LoadError::Invalid(format!("tree {id} uses categorical splits, which are not supported")));
        }

        for node in 0..len {
            let (left, right) = (section.left_children[node], section.right_children[node]);
            if left == LEAF {
                continue;
            }
            let in_range = |child: i32| child >= 0 && (child as usize) < len;
            if !in_range(left) || !in_range(right) {
                return Err(LoadError::Invalid(format!("tree {id} node {node} has a child outside the tree")));
            }
            if section.split_indices[node] as usize >= FEATURE_COLUMNS.len() {
                return Err(LoadError::Invalid(format!(
                    "tree {id} node {node} splits on feature {} but the model has {} features",
                    section.split_indices[node],
                    FEATURE_COLUMNS.len()
                )));
            }
        }

        Ok(Self {
            left: section.left_children,
            right: section.right_children,
            split_index: section.split_indices,
            split_condition: section.split_conditions,
            default_left: section.default_left,
        })
    }

    fn leaf_value(&self, id: usize, features: &[f32]) -> Result<f32, InferenceError> {
        let len = self.left.len();
        let mut node = 0usize;
        // A well-formed tree reaches a leaf in fewer steps than it has nodes.
        for _ in 0..=len {
            let left = self.left[node];
            if left == LEAF {
                return Ok(self.split_condition[node]);
            }
            let value = features[self.split_index[node] as usize];
            let next = if value.is_nan() {
                if self.default_left[node] { left } else { self.right[node] }
            } else if value < self.split_condition[node] {
                left
            } else {
                self.right[node]
            };
            if next < 0 || next as usize >= len {
                return Err(InferenceError::NodeOutOfRange {
                    tree: id,
                    node: next as i64,
                    len,
                });
            }
            node = next as usize;
        }
        Err(InferenceError::Cycle { tree: id, steps: len })
    }
}

/// A parsed XGBoost `gbtree` regressor.
#[derive(Debug, Clone)]
pub struct XgbRegressor {
    trees: Vec<Tree>,
    base_margin: f32,
    link: Link,
    objective: String,
}

impl XgbRegressor {
    /// Parse and validate a model from the bytes of an XGBoost JSON artifact.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, LoadError> {
        let file: ModelFile = serde_json::from_slice(bytes)?;
        Self::from_learner(file.learner)
    }

    fn from_learner(learner: Learner) -> Result<Self, LoadError> {
        if learner.gradient_booster.name != "gbtree" {
            return Err(LoadError::Invalid(format!(
                "unsupported booster '{}', only gbtree models can be served",
                learner.gradient_booster.name
            )));
        }

        let params = &learner.learner_model_param;
        if let Some(num_feature) = params.num_feature.as_deref().map(parse_count).transpose()?
            && num_feature != FEATURE_COLUMNS.len()
        {
            return Err(LoadError::Invalid(format!(
                "model expects {num_feature} features, the service provides {}",
                FEATURE_COLUMNS.len()
            )));
        }
        if params.num_class.as_deref().map(parse_count).transpose()?.unwrap_or(0) > 1 {
            return Err(LoadError::Invalid("multi-class models are not supported".to_string()));
        }
        if params.num_target.as_deref().map(parse_count).transpose()?.unwrap_or(1) > 1 {
            return Err(LoadError::Invalid("multi-target models are not supported".to_string()));
        }
        if !learner.feature_names.is_empty() && learner.feature_names != FEATURE_COLUMNS {
            return Err(LoadError::Invalid(format!(
                "model feature names {:?} do not match {:?}",
                learner.feature_names, FEATURE_COLUMNS
            )));
        }

        let link = Link::for_objective(&learner.objective.name)?;
        let base_margin = link.margin(parse_base_score(&params.base_score)?)?;

        let model = learner
            .gradient_booster
            .model
            .ok_or_else(|| LoadError::Invalid("gbtree booster has no model section".to_string()))?;
        let model: GbTreeModel = serde_json::from_value(model)?;

        let trees = model
            .trees
            .into_iter()
            .enumerate()
            .map(|(id, section)| Tree::from_section(id, section))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            trees,
            base_margin,
            link,
            objective: learner.objective.name,
        })
    }

    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }
}

impl Regressor for XgbRegressor {
    fn predict(&self, row: &FeatureRow) -> Result<f64, InferenceError> {
        let features = row.values();
        let mut margin = self.base_margin;
        for (id, tree) in self.trees.iter().enumerate() {
            margin += tree.leaf_value(id, &features)?;
        }
        Ok(self.link.apply(margin) as f64)
    }

    fn summary(&self) -> ModelSummary {
        ModelSummary {
            num_trees: self.trees.len(),
            objective: self.objective.clone(),
        }
    }
}

fn parse_count(raw: &str) -> Result<usize, LoadError> {
    raw.trim()
        .parse()
        .map_err(|_| LoadError::Invalid(format!("expected an integer model parameter, got '{raw}'")))
}

/// `base_score` is `"5E-1"` in XGBoost 1.x/2.x and `"[5E-1]"` in 3.x.
fn parse_base_score(raw: &str) -> Result<f32, LoadError> {
    let trimmed = raw.trim().trim_start_matches('[').trim_end_matches(']');
    let first = trimmed.split(',').next().unwrap_or_default().trim();
    first
        .parse()
        .map_err(|_| LoadError::Invalid(format!("invalid base_score '{raw}'")))
}
