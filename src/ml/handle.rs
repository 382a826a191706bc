use serde::Serialize;

use crate::error::PredictionError;
use crate::ml::artifact::BuiltModel;
use crate::ml::estimator::Estimator;
use crate::types::{FeatureTable, Label};

/// Model availability, fixed once at startup.
pub enum ModelState {
    Absent,
    Loaded(ModelHandle),
}

impl ModelState {
    pub fn handle(&self) -> Option<&ModelHandle> {
        match self {
            ModelState::Absent => None,
            ModelState::Loaded(handle) => Some(handle),
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, ModelState::Loaded(_))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub model_type: String,
    pub model_class: String,
    pub loaded: bool,
    pub file_name: String,
    pub loaded_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_features: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n_features: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classes: Option<Vec<Label>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n_classes: Option<usize>,
    pub is_pipeline: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipeline_steps: Option<Vec<String>>,
}

/// Immutable wrapper around the loaded estimator.
pub struct ModelHandle {
    estimator: Box<dyn Estimator>,
    model_type: String,
    feature_names: Option<Vec<String>>,
    file_name: String,
    loaded_at: String,
}

impl ModelHandle {
    pub fn new(model: BuiltModel, file_name: impl Into<String>, loaded_at: impl Into<String>) -> Self {
        let model_type = model
            .model_type
            .unwrap_or_else(|| model.estimator.kind().to_string());

        Self {
            estimator: model.estimator,
            model_type,
            feature_names: model.feature_names,
            file_name: file_name.into(),
            loaded_at: loaded_at.into(),
        }
    }

    pub fn model_type(&self) -> &str {
        &self.model_type
    }

    pub fn expected_feature_names(&self) -> Option<&[String]> {
        self.feature_names.as_deref()
    }

    pub fn class_labels(&self) -> Option<&[Label]> {
        self.estimator.classes()
    }

    pub fn predict(&self, table: &FeatureTable) -> Result<Vec<Label>, PredictionError> {
        let labels = self.estimator.predict(&table.rows)?;
        if labels.len() != table.rows.len() {
            return Err(PredictionError::new(format!(
                "model returned {} predictions for {} rows",
                labels.len(),
                table.rows.len()
            )));
        }
        Ok(labels)
    }

    /// `None` when the estimator has no probability capability.
    pub fn predict_proba(&self, table: &FeatureTable) -> Option<Result<Vec<Vec<f64>>, PredictionError>> {
        self.estimator.predict_proba(&table.rows)
    }

    pub fn info(&self) -> ModelInfo {
        let classes = self.class_labels().map(|labels| labels.to_vec());
        let pipeline_steps = self.estimator.pipeline_steps();

        ModelInfo {
            model_type: self.model_type.clone(),
            model_class: self.estimator.kind().to_string(),
            loaded: true,
            file_name: self.file_name.clone(),
            loaded_at: self.loaded_at.clone(),
            expected_features: self.feature_names.clone(),
            n_features: self
                .feature_names
                .as_ref()
                .map(Vec::len)
                .or_else(|| self.estimator.n_features()),
            n_classes: classes.as_ref().map(Vec::len),
            classes,
            is_pipeline: pipeline_steps.is_some(),
            pipeline_steps,
        }
    }
}
