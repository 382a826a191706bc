use serde::Deserialize;

use crate::error::PredictionError;
use crate::types::Label;

/// Capability interface over a trained model.
///
/// Optional capabilities (`predict_proba`, `classes`, `pipeline_steps`) report
/// absence through `None` instead of failing.
pub trait Estimator: Send + Sync {
    fn kind(&self) -> &'static str;

    fn n_features(&self) -> Option<usize>;

    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<Label>, PredictionError>;

    fn predict_proba(&self, _rows: &[Vec<f64>]) -> Option<Result<Vec<Vec<f64>>, PredictionError>> {
        None
    }

    fn classes(&self) -> Option<&[Label]> {
        None
    }

    fn pipeline_steps(&self) -> Option<Vec<String>> {
        None
    }
}

/// Preprocessing step inside a pipeline.
pub trait Transform: Send + Sync {
    fn kind(&self) -> &'static str;

    fn n_features(&self) -> usize;

    fn transform(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, PredictionError>;
}

pub fn check_width(rows: &[Vec<f64>], expected: usize, kind: &str) -> Result<(), PredictionError> {
    match rows.iter().find(|row| row.len() != expected) {
        Some(row) => Err(PredictionError::new(format!(
            "X has {} features, but {} is expecting {} features as input",
            row.len(),
            kind,
            expected
        ))),
        None => Ok(()),
    }
}

fn dot(weights: &[f64], row: &[f64]) -> f64 {
    weights.iter().zip(row).map(|(w, x)| w * x).sum()
}

fn sigmoid(value: f64) -> f64 {
    1.0 / (1.0 + (-value).exp())
}

fn softmax(scores: &[f64]) -> Vec<f64> {
    let max = scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let exps = scores.iter().map(|s| (s - max).exp()).collect::<Vec<_>>();
    let total: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / total).collect()
}

fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (index, value) in values.iter().enumerate() {
        if *value > values[best] {
            best = index;
        }
    }
    best
}

fn labels_from_proba(classes: &[Label], proba: &[Vec<f64>]) -> Vec<Label> {
    proba
        .iter()
        .map(|row| classes[argmax(row)].clone())
        .collect()
}

// ============================================================================
// LINEAR MODELS
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct LinearRegression {
    pub coefficients: Vec<f64>,
    #[serde(default)]
    pub intercept: f64,
}

impl Estimator for LinearRegression {
    fn kind(&self) -> &'static str {
        "LinearRegression"
    }

    fn n_features(&self) -> Option<usize> {
        Some(self.coefficients.len())
    }

    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<Label>, PredictionError> {
        check_width(rows, self.coefficients.len(), self.kind())?;
        Ok(rows
            .iter()
            .map(|row| Label::Float(dot(&self.coefficients, row) + self.intercept))
            .collect())
    }
}

/// Binary models carry a single coefficient row scored through a sigmoid;
/// multinomial models carry one row per class scored through softmax.
#[derive(Debug, Clone, Deserialize)]
pub struct LogisticRegression {
    pub classes: Vec<Label>,
    pub coefficients: Vec<Vec<f64>>,
    pub intercepts: Vec<f64>,
}

impl LogisticRegression {
    fn width(&self) -> usize {
        self.coefficients.first().map(Vec::len).unwrap_or(0)
    }

    fn row_proba(&self, index: usize, row: &[f64]) -> Result<Vec<f64>, PredictionError> {
        let scores = self
            .coefficients
            .iter()
            .zip(&self.intercepts)
            .map(|(weights, bias)| dot(weights, row) + bias)
            .collect::<Vec<_>>();

        if scores.iter().any(|score| !score.is_finite()) {
            return Err(PredictionError::new(format!(
                "{} produced a non-finite decision score for row {}",
                self.kind(),
                index
            )));
        }

        if scores.len() == 1 {
            let positive = sigmoid(scores[0]);
            Ok(vec![1.0 - positive, positive])
        } else {
            Ok(softmax(&scores))
        }
    }

    fn proba(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, PredictionError> {
        check_width(rows, self.width(), self.kind())?;
        rows.iter()
            .enumerate()
            .map(|(index, row)| self.row_proba(index, row))
            .collect()
    }
}

impl Estimator for LogisticRegression {
    fn kind(&self) -> &'static str {
        "LogisticRegression"
    }

    fn n_features(&self) -> Option<usize> {
        Some(self.width())
    }

    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<Label>, PredictionError> {
        let proba = self.proba(rows)?;
        Ok(labels_from_proba(&self.classes, &proba))
    }

    fn predict_proba(&self, rows: &[Vec<f64>]) -> Option<Result<Vec<Vec<f64>>, PredictionError>> {
        Some(self.proba(rows))
    }

    fn classes(&self) -> Option<&[Label]> {
        Some(self.classes.as_slice())
    }
}

// ============================================================================
// TREES
// ============================================================================

/// Flat tree node. Children always point forward in the node array.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: Vec<f64>,
    },
}

fn walk<'a>(nodes: &'a [TreeNode], row: &[f64]) -> &'a [f64] {
    let mut index = 0;
    loop {
        match &nodes[index] {
            TreeNode::Leaf { value } => return value,
            TreeNode::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                index = if row[*feature] <= *threshold { *left } else { *right };
            }
        }
    }
}

fn normalize(weights: &[f64]) -> Vec<f64> {
    let total: f64 = weights.iter().sum();
    if total > 0.0 {
        weights.iter().map(|w| w / total).collect()
    } else {
        vec![1.0 / weights.len() as f64; weights.len()]
    }
}

/// Classifier when `classes` is set (leaves hold per-class weights),
/// regressor otherwise (leaves hold a single value).
#[derive(Debug, Clone, Deserialize)]
pub struct DecisionTree {
    pub n_features: usize,
    #[serde(default)]
    pub classes: Option<Vec<Label>>,
    pub nodes: Vec<TreeNode>,
}

impl DecisionTree {
    fn proba(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, PredictionError> {
        check_width(rows, self.n_features, self.kind())?;
        Ok(rows
            .iter()
            .map(|row| normalize(walk(&self.nodes, row)))
            .collect())
    }
}

impl Estimator for DecisionTree {
    fn kind(&self) -> &'static str {
        if self.classes.is_some() {
            "DecisionTreeClassifier"
        } else {
            "DecisionTreeRegressor"
        }
    }

    fn n_features(&self) -> Option<usize> {
        Some(self.n_features)
    }

    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<Label>, PredictionError> {
        match &self.classes {
            Some(classes) => Ok(labels_from_proba(classes, &self.proba(rows)?)),
            None => {
                check_width(rows, self.n_features, self.kind())?;
                Ok(rows
                    .iter()
                    .map(|row| Label::Float(walk(&self.nodes, row)[0]))
                    .collect())
            }
        }
    }

    fn predict_proba(&self, rows: &[Vec<f64>]) -> Option<Result<Vec<Vec<f64>>, PredictionError>> {
        self.classes.as_ref().map(|_| self.proba(rows))
    }

    fn classes(&self) -> Option<&[Label]> {
        self.classes.as_deref()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RandomForest {
    pub n_features: usize,
    #[serde(default)]
    pub classes: Option<Vec<Label>>,
    pub trees: Vec<Vec<TreeNode>>,
}

impl RandomForest {
    fn average<F>(&self, row: &[f64], leaf: F) -> Vec<f64>
    where
        F: Fn(&[f64]) -> Vec<f64>,
    {
        let mut total: Vec<f64> = Vec::new();
        for nodes in &self.trees {
            let values = leaf(walk(nodes, row));
            if total.is_empty() {
                total = values;
            } else {
                for (sum, value) in total.iter_mut().zip(values) {
                    *sum += value;
                }
            }
        }
        let count = self.trees.len() as f64;
        total.into_iter().map(|sum| sum / count).collect()
    }

    fn proba(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, PredictionError> {
        check_width(rows, self.n_features, self.kind())?;
        Ok(rows
            .iter()
            .map(|row| self.average(row, normalize))
            .collect())
    }
}

impl Estimator for RandomForest {
    fn kind(&self) -> &'static str {
        if self.classes.is_some() {
            "RandomForestClassifier"
        } else {
            "RandomForestRegressor"
        }
    }

    fn n_features(&self) -> Option<usize> {
        Some(self.n_features)
    }

    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<Label>, PredictionError> {
        match &self.classes {
            Some(classes) => Ok(labels_from_proba(classes, &self.proba(rows)?)),
            None => {
                check_width(rows, self.n_features, self.kind())?;
                Ok(rows
                    .iter()
                    .map(|row| Label::Float(self.average(row, |leaf| vec![leaf[0]])[0]))
                    .collect())
            }
        }
    }

    fn predict_proba(&self, rows: &[Vec<f64>]) -> Option<Result<Vec<Vec<f64>>, PredictionError>> {
        self.classes.as_ref().map(|_| self.proba(rows))
    }

    fn classes(&self) -> Option<&[Label]> {
        self.classes.as_deref()
    }
}

// ============================================================================
// PIPELINE
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl Transform for StandardScaler {
    fn kind(&self) -> &'static str {
        "StandardScaler"
    }

    fn n_features(&self) -> usize {
        self.mean.len()
    }

    fn transform(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, PredictionError> {
        check_width(rows, self.mean.len(), self.kind())?;
        Ok(rows
            .iter()
            .map(|row| {
                row.iter()
                    .zip(self.mean.iter().zip(&self.scale))
                    .map(|(x, (mean, scale))| {
                        let scale = if *scale == 0.0 { 1.0 } else { *scale };
                        (x - mean) / scale
                    })
                    .collect()
            })
            .collect())
    }
}

/// `x * scale + min`, the fitted form of a min-max scaler.
#[derive(Debug, Clone, Deserialize)]
pub struct MinMaxScaler {
    pub min: Vec<f64>,
    pub scale: Vec<f64>,
}

impl Transform for MinMaxScaler {
    fn kind(&self) -> &'static str {
        "MinMaxScaler"
    }

    fn n_features(&self) -> usize {
        self.min.len()
    }

    fn transform(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, PredictionError> {
        check_width(rows, self.min.len(), self.kind())?;
        Ok(rows
            .iter()
            .map(|row| {
                row.iter()
                    .zip(self.min.iter().zip(&self.scale))
                    .map(|(x, (min, scale))| x * scale + min)
                    .collect()
            })
            .collect())
    }
}

pub struct Pipeline {
    pub transforms: Vec<(String, Box<dyn Transform>)>,
    pub final_step: (String, Box<dyn Estimator>),
}

impl Pipeline {
    fn apply(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, PredictionError> {
        let mut current = rows.to_vec();
        for (name, step) in &self.transforms {
            current = step
                .transform(&current)
                .map_err(|err| PredictionError::new(format!("step '{}': {}", name, err)))?;
        }
        Ok(current)
    }
}

impl Estimator for Pipeline {
    fn kind(&self) -> &'static str {
        "Pipeline"
    }

    fn n_features(&self) -> Option<usize> {
        match self.transforms.first() {
            Some((_, step)) => Some(step.n_features()),
            None => self.final_step.1.n_features(),
        }
    }

    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<Label>, PredictionError> {
        let transformed = self.apply(rows)?;
        self.final_step.1.predict(&transformed)
    }

    fn predict_proba(&self, rows: &[Vec<f64>]) -> Option<Result<Vec<Vec<f64>>, PredictionError>> {
        match self.apply(rows) {
            Ok(transformed) => self.final_step.1.predict_proba(&transformed),
            Err(err) => Some(Err(err)),
        }
    }

    fn classes(&self) -> Option<&[Label]> {
        self.final_step.1.classes()
    }

    fn pipeline_steps(&self) -> Option<Vec<String>> {
        let mut names = self
            .transforms
            .iter()
            .map(|(name, _)| name.clone())
            .collect::<Vec<_>>();
        names.push(self.final_step.0.clone());
        Some(names)
    }
}
