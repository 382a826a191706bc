use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

// ============================================================================
// INPUT RECORDS
// ============================================================================

/// One input row as submitted by the client. Field order is kept as received.
pub type Record = Map<String, Value>;

/// Scalar produced by the model for a single row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Label {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl Label {
    pub fn to_value(&self) -> Value {
        match self {
            Label::Integer(value) => Value::from(*value),
            Label::Float(value) => Number::from_f64(*value)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Label::Text(value) => Value::String(value.clone()),
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Integer(value) => write!(f, "{}", value),
            // Integral floats keep their trailing ".0" so "probability_1.0"
            // stays distinct from an integer class "probability_1".
            Label::Float(value) if value.is_finite() && value.fract() == 0.0 => {
                write!(f, "{:.1}", value)
            }
            Label::Float(value) => write!(f, "{}", value),
            Label::Text(value) => f.write_str(value),
        }
    }
}

// ============================================================================
// FEATURE TABLE
// ============================================================================

/// Numeric table in the exact column layout handed to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

impl FeatureTable {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<f64>>) -> Self {
        Self { columns, rows }
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows.len(), self.columns.len())
    }

    pub fn to_records(&self) -> Vec<Record> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .zip(row.iter())
                    .map(|(name, value)| {
                        let cell = Number::from_f64(*value)
                            .map(Value::Number)
                            .unwrap_or(Value::Null);
                        (name.clone(), cell)
                    })
                    .collect::<Record>()
            })
            .collect()
    }
}

/// Local ISO-8601 timestamp with microseconds, as reported by every endpoint.
pub fn timestamp_now() -> String {
    chrono::Local::now()
        .naive_local()
        .format("%Y-%m-%dT%H:%M:%S%.6f")
        .to_string()
}
