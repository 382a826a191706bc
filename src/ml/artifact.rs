use std::collections::HashSet;

use serde::Deserialize;

use crate::error::ModelLoadError;
use crate::ml::estimator::{
    DecisionTree, Estimator, LinearRegression, LogisticRegression, MinMaxScaler, Pipeline,
    RandomForest, StandardScaler, Transform, TreeNode,
};
use crate::types::Label;

/// On-disk model artifact.
///
/// ```json
/// {
///   "feature_names": ["Depth (m)", "P (MPa)"],
///   "estimator": {
///     "kind": "pipeline",
///     "steps": [
///       ["scaler", {"kind": "standard_scaler", "mean": [0, 0], "scale": [1, 1]}],
///       ["classifier", {"kind": "logistic_regression", "classes": [0, 1],
///                       "coefficients": [[0.4, -0.2]], "intercepts": [0.1]}]
///     ]
///   }
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct ModelArtifact {
    #[serde(default)]
    pub model_type: Option<String>,
    #[serde(default)]
    pub feature_names: Option<Vec<String>>,
    pub estimator: EstimatorSpec,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EstimatorSpec {
    LinearRegression(LinearRegression),
    LogisticRegression(LogisticRegression),
    DecisionTree(DecisionTree),
    RandomForest(RandomForest),
    StandardScaler(StandardScaler),
    MinMaxScaler(MinMaxScaler),
    Pipeline { steps: Vec<(String, EstimatorSpec)> },
}

pub struct BuiltModel {
    pub model_type: Option<String>,
    pub feature_names: Option<Vec<String>>,
    pub estimator: Box<dyn Estimator>,
}

enum Built {
    Transform(Box<dyn Transform>),
    Estimator(Box<dyn Estimator>),
}

impl ModelArtifact {
    pub fn from_slice(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }

    pub fn build(self) -> Result<BuiltModel, ModelLoadError> {
        let estimator = match build_spec(self.estimator)? {
            Built::Estimator(estimator) => estimator,
            Built::Transform(step) => {
                return Err(invalid(format!(
                    "top-level {} cannot produce predictions",
                    step.kind()
                )))
            }
        };

        if let Some(names) = self.feature_names.as_ref() {
            validate_feature_names(names, estimator.n_features())?;
        }

        Ok(BuiltModel {
            model_type: self
                .model_type
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty()),
            feature_names: self.feature_names,
            estimator,
        })
    }
}

fn invalid(message: impl Into<String>) -> ModelLoadError {
    ModelLoadError::Invalid(message.into())
}

fn build_spec(spec: EstimatorSpec) -> Result<Built, ModelLoadError> {
    match spec {
        EstimatorSpec::LinearRegression(model) => {
            if model.coefficients.is_empty() {
                return Err(invalid("linear_regression has no coefficients"));
            }
            Ok(Built::Estimator(Box::new(model)))
        }
        EstimatorSpec::LogisticRegression(model) => {
            validate_logistic(&model)?;
            Ok(Built::Estimator(Box::new(model)))
        }
        EstimatorSpec::DecisionTree(model) => {
            validate_classes(model.classes.as_deref())?;
            validate_tree(&model.nodes, model.n_features, model.classes.as_ref().map(Vec::len))?;
            Ok(Built::Estimator(Box::new(model)))
        }
        EstimatorSpec::RandomForest(model) => {
            validate_classes(model.classes.as_deref())?;
            if model.trees.is_empty() {
                return Err(invalid("random_forest has no trees"));
            }
            for nodes in &model.trees {
                validate_tree(nodes, model.n_features, model.classes.as_ref().map(Vec::len))?;
            }
            Ok(Built::Estimator(Box::new(model)))
        }
        EstimatorSpec::StandardScaler(step) => {
            validate_scaler("standard_scaler", step.mean.len(), step.scale.len())?;
            Ok(Built::Transform(Box::new(step)))
        }
        EstimatorSpec::MinMaxScaler(step) => {
            validate_scaler("min_max_scaler", step.min.len(), step.scale.len())?;
            Ok(Built::Transform(Box::new(step)))
        }
        EstimatorSpec::Pipeline { steps } => build_pipeline(steps),
    }
}

fn build_pipeline(steps: Vec<(String, EstimatorSpec)>) -> Result<Built, ModelLoadError> {
    let total = steps.len();
    if total == 0 {
        return Err(invalid("pipeline has no steps"));
    }

    let mut transforms: Vec<(String, Box<dyn Transform>)> = Vec::with_capacity(total - 1);
    let mut final_step = None;

    for (position, (name, spec)) in steps.into_iter().enumerate() {
        let is_last = position + 1 == total;
        match (build_spec(spec)?, is_last) {
            (Built::Transform(step), false) => {
                if let Some((_, first)) = transforms.first() {
                    if first.n_features() != step.n_features() {
                        return Err(invalid(format!(
                            "pipeline step '{}' expects {} features, previous steps produce {}",
                            name,
                            step.n_features(),
                            first.n_features()
                        )));
                    }
                }
                transforms.push((name, step));
            }
            (Built::Estimator(estimator), true) => final_step = Some((name, estimator)),
            (Built::Transform(_), true) => {
                return Err(invalid(format!(
                    "pipeline must end with an estimator, '{}' is a transform",
                    name
                )))
            }
            (Built::Estimator(_), false) => {
                return Err(invalid(format!(
                    "pipeline step '{}' is an estimator but is not the last step",
                    name
                )))
            }
        }
    }

    let final_step = final_step.ok_or_else(|| invalid("pipeline has no final estimator"))?;
    if let (Some((_, first)), Some(width)) = (transforms.first(), final_step.1.n_features()) {
        if first.n_features() != width {
            return Err(invalid(format!(
                "pipeline estimator '{}' expects {} features, transforms produce {}",
                final_step.0,
                width,
                first.n_features()
            )));
        }
    }

    Ok(Built::Estimator(Box::new(Pipeline {
        transforms,
        final_step,
    })))
}

fn validate_logistic(model: &LogisticRegression) -> Result<(), ModelLoadError> {
    if model.classes.len() < 2 {
        return Err(invalid("logistic_regression needs at least two classes"));
    }
    validate_classes(Some(model.classes.as_slice()))?;
    let width = model.coefficients.first().map(Vec::len).unwrap_or(0);
    if width == 0 {
        return Err(invalid("logistic_regression has no coefficients"));
    }
    if model.coefficients.iter().any(|row| row.len() != width) {
        return Err(invalid("logistic_regression coefficient rows differ in length"));
    }
    if model.intercepts.len() != model.coefficients.len() {
        return Err(invalid(format!(
            "logistic_regression has {} coefficient rows but {} intercepts",
            model.coefficients.len(),
            model.intercepts.len()
        )));
    }
    let expected_rows = if model.classes.len() == 2 {
        [1, 2]
    } else {
        [model.classes.len(), model.classes.len()]
    };
    if !expected_rows.contains(&model.coefficients.len()) {
        return Err(invalid(format!(
            "logistic_regression has {} classes but {} coefficient rows",
            model.classes.len(),
            model.coefficients.len()
        )));
    }
    Ok(())
}

/// Class names become `probability_<class>` fields, so their display forms
/// must be distinct.
fn validate_classes(classes: Option<&[Label]>) -> Result<(), ModelLoadError> {
    let Some(classes) = classes else {
        return Ok(());
    };
    if classes.is_empty() {
        return Err(invalid("classes must not be empty"));
    }

    let mut seen = HashSet::new();
    for class in classes {
        let name = class.to_string();
        if !seen.insert(name.clone()) {
            return Err(invalid(format!("duplicate class label '{}'", name)));
        }
    }
    Ok(())
}

fn validate_tree(
    nodes: &[TreeNode],
    n_features: usize,
    n_classes: Option<usize>,
) -> Result<(), ModelLoadError> {
    if nodes.is_empty() {
        return Err(invalid("tree has no nodes"));
    }
    if n_features == 0 {
        return Err(invalid("tree must declare n_features"));
    }

    for (index, node) in nodes.iter().enumerate() {
        match node {
            TreeNode::Split {
                feature,
                left,
                right,
                ..
            } => {
                if *feature >= n_features {
                    return Err(invalid(format!(
                        "node {} splits on feature {} of {}",
                        index, feature, n_features
                    )));
                }
                for child in [*left, *right] {
                    if child <= index || child >= nodes.len() {
                        return Err(invalid(format!(
                            "node {} points to invalid child {}",
                            index, child
                        )));
                    }
                }
            }
            TreeNode::Leaf { value } => {
                let expected = n_classes.unwrap_or(1);
                let ok = match n_classes {
                    Some(_) => value.len() == expected,
                    None => !value.is_empty(),
                };
                if !ok {
                    return Err(invalid(format!(
                        "leaf {} holds {} values, expected {}",
                        index,
                        value.len(),
                        expected
                    )));
                }
            }
        }
    }
    Ok(())
}

fn validate_scaler(kind: &str, offsets: usize, scales: usize) -> Result<(), ModelLoadError> {
    if offsets == 0 || offsets != scales {
        return Err(invalid(format!(
            "{} has mismatched parameter lengths ({} vs {})",
            kind, offsets, scales
        )));
    }
    Ok(())
}

fn validate_feature_names(names: &[String], width: Option<usize>) -> Result<(), ModelLoadError> {
    if names.is_empty() {
        return Err(invalid("feature_names must not be empty"));
    }

    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name.as_str()) {
            return Err(invalid(format!("duplicate feature name '{}'", name)));
        }
    }

    if let Some(width) = width {
        if width != names.len() {
            return Err(invalid(format!(
                "{} feature names declared but the estimator expects {}",
                names.len(),
                width
            )));
        }
    }
    Ok(())
}
