use std::collections::HashSet;

use serde::Serialize;
use serde_json::{Number, Value};

use crate::error::ProbabilityUnavailable;
use crate::types::{Label, Record};

pub const PREDICTION_FIELD: &str = "prediction";
pub const MAX_PROBABILITY_FIELD: &str = "prediction_probability";
pub const PROBABILITY_PREFIX: &str = "probability_";

#[derive(Debug, Clone, Serialize)]
pub struct PredictionResponse {
    pub success: bool,
    pub predictions: Vec<Record>,
    pub total_records: usize,
    pub model_type: String,
    pub timestamp: String,
}

/// Probability matrix whose shape has been checked against the request.
#[derive(Debug, Clone, PartialEq)]
pub struct Probabilities {
    class_names: Option<Vec<String>>,
    matrix: Vec<Vec<f64>>,
}

impl Probabilities {
    pub fn new(
        matrix: Vec<Vec<f64>>,
        classes: Option<&[Label]>,
        rows: usize,
    ) -> Result<Self, ProbabilityUnavailable> {
        if matrix.len() != rows {
            return Err(ProbabilityUnavailable(format!(
                "expected {} probability rows, got {}",
                rows,
                matrix.len()
            )));
        }

        let class_names = classes.map(|labels| {
            labels
                .iter()
                .map(|label| format!("{}{}", PROBABILITY_PREFIX, label))
                .collect::<Vec<_>>()
        });

        if let Some(names) = &class_names {
            let mut seen = HashSet::new();
            if let Some(name) = names.iter().find(|name| !seen.insert(name.as_str())) {
                return Err(ProbabilityUnavailable(format!(
                    "class labels collide on '{}'",
                    name
                )));
            }
        }

        for row in &matrix {
            let width_ok = match &class_names {
                Some(names) => row.len() == names.len(),
                None => !row.is_empty(),
            };
            if !width_ok {
                return Err(ProbabilityUnavailable(format!(
                    "probability row has {} columns for {} classes",
                    row.len(),
                    class_names.as_ref().map(Vec::len).unwrap_or(0)
                )));
            }
        }

        Ok(Self {
            class_names,
            matrix,
        })
    }

    fn attach(&self, record: &mut Record, row: &[f64]) {
        match &self.class_names {
            Some(names) => {
                for (name, value) in names.iter().zip(row) {
                    record.insert(name.clone(), number(*value));
                }
            }
            None => {
                let max = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
                record.insert(MAX_PROBABILITY_FIELD.to_string(), number(max));
            }
        }
    }
}

/// Appends the label (and probabilities when available) to each original record.
pub fn shape_records(
    records: Vec<Record>,
    labels: Vec<Label>,
    probabilities: Option<&Probabilities>,
) -> Vec<Record> {
    records
        .into_iter()
        .zip(labels)
        .enumerate()
        .map(|(index, (mut record, label))| {
            record.insert(PREDICTION_FIELD.to_string(), label.to_value());
            if let Some(probabilities) = probabilities {
                probabilities.attach(&mut record, &probabilities.matrix[index]);
            }
            record
        })
        .collect()
}

fn number(value: f64) -> Value {
    Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}
