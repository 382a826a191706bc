use std::path::Path;

use log::{error, info, warn};
use serde_json::Value;

use crate::align::{align, present_columns, AlignedTable};
use crate::error::{ProbabilityUnavailable, ServiceError};
use crate::ml::{loader, ModelHandle, ModelState};
use crate::response::{shape_records, PredictionResponse, Probabilities};
use crate::types::{timestamp_now, Record};

/// Request-independent prediction entry point. Built once at startup and
/// shared read-only by every handler.
pub struct PredictionService {
    state: ModelState,
}

impl PredictionService {
    pub fn new(state: ModelState) -> Self {
        Self { state }
    }

    /// A missing or unreadable artifact leaves the service in the absent state
    /// instead of failing startup.
    pub fn load(dir: &Path, candidates: &[String]) -> Self {
        match loader::load(dir, candidates) {
            Ok(handle) => Self::new(ModelState::Loaded(handle)),
            Err(err) => {
                warn!("[MODEL] {}", err);
                Self::new(ModelState::Absent)
            }
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.state.is_loaded()
    }

    pub fn model(&self) -> Option<&ModelHandle> {
        self.state.handle()
    }

    pub fn predict_records(&self, body: Option<&Value>) -> Result<PredictionResponse, ServiceError> {
        let handle = self.model().ok_or(ServiceError::ModelUnavailable)?;
        let records = parse_records(body)?;

        info!(
            "[PREDICT] Received {} record(s) with columns {:?}",
            records.len(),
            present_columns(&records)
        );

        let aligned = align(&records, handle.expected_feature_names())?;
        run(handle, records, aligned)
    }

    /// Sends records in a fixed column order, bypassing the model's declared
    /// schema.
    pub fn predict_raw(
        &self,
        records: Vec<Record>,
        column_order: &[String],
    ) -> Result<PredictionResponse, ServiceError> {
        let handle = self.model().ok_or(ServiceError::ModelUnavailable)?;
        if records.is_empty() {
            return Err(ServiceError::invalid_input("Empty dataset provided"));
        }

        let aligned = align(&records, Some(column_order))?;
        run(handle, records, aligned)
    }
}

pub fn parse_records(body: Option<&Value>) -> Result<Vec<Record>, ServiceError> {
    let items = match body {
        None | Some(Value::Null) => return Err(ServiceError::invalid_input("No data provided")),
        Some(Value::Array(items)) => items,
        Some(_) => {
            return Err(ServiceError::invalid_input(
                "Data should be a list of records",
            ))
        }
    };

    let records = items
        .iter()
        .map(|item| match item {
            Value::Object(record) => Ok(record.clone()),
            _ => Err(ServiceError::invalid_input(
                "Data should be a list of records",
            )),
        })
        .collect::<Result<Vec<_>, _>>()?;

    if records.iter().all(|record| record.is_empty()) {
        return Err(ServiceError::invalid_input("Empty dataset provided"));
    }

    Ok(records)
}

fn run(
    handle: &ModelHandle,
    records: Vec<Record>,
    aligned: AlignedTable,
) -> Result<PredictionResponse, ServiceError> {
    let table = aligned.table;
    info!(
        "[PREDICT] Model input shape {:?} ({} dropped column(s), {} coerced, {} filled)",
        table.shape(),
        aligned.dropped.len(),
        aligned.coerced,
        aligned.filled
    );

    let labels = handle.predict(&table).map_err(|err| {
        error!(
            "[PREDICT] Model call failed on shape {:?} with columns {:?}: {}",
            table.shape(),
            table.columns,
            err
        );
        err
    })?;

    let probabilities = handle.predict_proba(&table).and_then(|result| {
        let checked = result
            .map_err(|err| ProbabilityUnavailable(err.to_string()))
            .and_then(|matrix| Probabilities::new(matrix, handle.class_labels(), records.len()));
        match checked {
            Ok(probabilities) => Some(probabilities),
            Err(err) => {
                warn!("[PREDICT] Omitting probabilities: {}", err);
                None
            }
        }
    });

    let predictions = shape_records(records, labels, probabilities.as_ref());
    info!("[PREDICT] Successfully made {} prediction(s)", predictions.len());

    Ok(PredictionResponse {
        success: true,
        total_records: predictions.len(),
        predictions,
        model_type: handle.model_type().to_string(),
        timestamp: timestamp_now(),
    })
}
