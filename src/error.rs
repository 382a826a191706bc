use std::path::PathBuf;

use axum::http::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelLoadError {
    #[error("no model artifact found in {dir} (tried: {tried})")]
    NotFound { dir: PathBuf, tried: String },

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid model artifact: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AlignmentError {
    #[error("Missing expected features: {}", format_names(.0))]
    MissingFeatures(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{0}")]
pub struct PredictionError(pub String);

impl PredictionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Probability enrichment failed; the request still succeeds without it.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("probabilities unavailable: {0}")]
pub struct ProbabilityUnavailable(pub String);

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Model not loaded. Please check server logs.")]
    ModelUnavailable,

    #[error("{0}")]
    InvalidInput(String),

    #[error("Prediction failed: {0}")]
    Alignment(#[from] AlignmentError),

    #[error("Prediction failed: {0}")]
    Prediction(#[from] PredictionError),
}

impl ServiceError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        ServiceError::InvalidInput(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ServiceError::ModelUnavailable
            | ServiceError::Alignment(_)
            | ServiceError::Prediction(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn format_names(names: &[String]) -> String {
    let quoted = names
        .iter()
        .map(|name| format!("'{}'", name))
        .collect::<Vec<_>>();
    format!("[{}]", quoted.join(", "))
}
