//! Reconciles client records with the column layout the model expects.
//!
//! Missing expected columns are a hard failure. Extra columns are dropped.
//! Cells are coerced to `f64`; null, absent, unparseable and non-finite cells
//! become `0.0`.

use std::collections::HashSet;

use log::{debug, info, log_enabled, warn, Level};
use serde_json::Value;

use crate::error::AlignmentError;
use crate::types::{FeatureTable, Record};

#[derive(Debug, Clone, PartialEq)]
pub struct AlignedTable {
    pub table: FeatureTable,
    /// Client columns not used by the model.
    pub dropped: Vec<String>,
    /// Cells converted from a non-numeric JSON type.
    pub coerced: usize,
    /// Cells replaced by the `0.0` sentinel.
    pub filled: usize,
}

pub fn align(records: &[Record], expected: Option<&[String]>) -> Result<AlignedTable, AlignmentError> {
    let present = present_columns(records);

    let (columns, dropped) = match expected {
        Some(expected) => {
            let present_set = present.iter().map(String::as_str).collect::<HashSet<_>>();
            let missing = expected
                .iter()
                .filter(|name| !present_set.contains(name.as_str()))
                .cloned()
                .collect::<Vec<_>>();
            if !missing.is_empty() {
                warn!(
                    "[ALIGN] Missing expected features {:?} (received columns {:?})",
                    missing, present
                );
                return Err(AlignmentError::MissingFeatures(missing));
            }

            let expected_set = expected.iter().map(String::as_str).collect::<HashSet<_>>();
            let dropped = present
                .iter()
                .filter(|name| !expected_set.contains(name.as_str()))
                .cloned()
                .collect::<Vec<_>>();
            if !dropped.is_empty() {
                info!("[ALIGN] Extra features will be removed: {:?}", dropped);
            }
            (expected.to_vec(), dropped)
        }
        None => (present, Vec::new()),
    };

    let mut coerced = 0;
    let mut filled = 0;
    let rows = records
        .iter()
        .map(|record| {
            columns
                .iter()
                .map(|name| {
                    let cell = coerce_cell(record.get(name));
                    coerced += cell.coerced as usize;
                    filled += cell.filled as usize;
                    cell.value
                })
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();

    if filled > 0 {
        warn!("[ALIGN] Filled {} missing or non-numeric value(s) with 0", filled);
    }
    if rows.len() > 1 && rows[0] == rows[1] {
        warn!("[ALIGN] First two rows are identical after preprocessing: {:?}", rows[0]);
    }

    let table = FeatureTable::new(columns, rows);
    if log_enabled!(Level::Debug) {
        let preview = table.to_records().into_iter().take(2).collect::<Vec<_>>();
        debug!(
            "[ALIGN] Processed shape {:?}, first rows {:?}",
            table.shape(),
            preview
        );
    }

    Ok(AlignedTable {
        table,
        dropped,
        coerced,
        filled,
    })
}

/// Union of record keys in first-seen order.
pub fn present_columns(records: &[Record]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut columns = Vec::new();
    for record in records {
        for key in record.keys() {
            if seen.insert(key.as_str()) {
                columns.push(key.clone());
            }
        }
    }
    columns
}

struct Cell {
    value: f64,
    coerced: bool,
    filled: bool,
}

fn coerce_cell(value: Option<&Value>) -> Cell {
    let numeric = |value: f64, coerced: bool| Cell {
        value,
        coerced,
        filled: false,
    };
    let sentinel = |coerced: bool| Cell {
        value: 0.0,
        coerced,
        filled: true,
    };

    match value {
        None | Some(Value::Null) => sentinel(false),
        Some(Value::Number(number)) => match number.as_f64() {
            Some(value) => numeric(value, false),
            None => sentinel(true),
        },
        Some(Value::Bool(flag)) => numeric(if *flag { 1.0 } else { 0.0 }, true),
        Some(Value::String(text)) => match text.trim().parse::<f64>() {
            Ok(value) if value.is_finite() => numeric(value, true),
            _ => sentinel(true),
        },
        Some(Value::Array(_)) | Some(Value::Object(_)) => sentinel(true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn records(value: Value) -> Vec<Record> {
        serde_json::from_value(value).unwrap()
    }

    fn names(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn test_reorders_to_expected_and_drops_extras() {
        let input = records(json!([
            {"b": 2, "extra": "x", "a": 1},
            {"a": 3, "b": 4, "extra": "y"}
        ]));
        let expected = names(&["a", "b"]);

        let aligned = align(&input, Some(expected.as_slice())).unwrap();
        assert_eq!(aligned.table.columns, expected);
        assert_eq!(aligned.table.rows, vec![vec![1.0, 2.0], vec![3.0, 4.0]]);
        assert_eq!(aligned.dropped, names(&["extra"]));
        assert_eq!(aligned.filled, 0);
    }

    #[test]
    fn test_missing_features_fail_in_expected_order() {
        let input = records(json!([{"b": 1}]));
        let expected = names(&["a", "b", "c"]);

        let error = align(&input, Some(expected.as_slice())).unwrap_err();
        assert_eq!(error, AlignmentError::MissingFeatures(names(&["a", "c"])));
    }

    #[test]
    fn test_column_present_in_any_row_counts_as_present() {
        let input = records(json!([{"a": 1, "b": 2}, {"a": 5}]));
        let expected = names(&["a", "b"]);

        let aligned = align(&input, Some(expected.as_slice())).unwrap();
        assert_eq!(aligned.table.rows[1], vec![5.0, 0.0]);
        assert_eq!(aligned.filled, 1);
    }

    #[test]
    fn test_unknown_schema_passes_columns_through() {
        let input = records(json!([{"z": 1, "y": "2.5"}, {"x": true}]));

        let aligned = align(&input, None).unwrap();
        assert_eq!(aligned.table.columns, names(&["z", "y", "x"]));
        assert_eq!(
            aligned.table.rows,
            vec![vec![1.0, 2.5, 0.0], vec![0.0, 0.0, 1.0]]
        );
        assert!(aligned.dropped.is_empty());
    }

    #[test]
    fn test_coercion_uses_zero_sentinel() {
        let input = records(json!([
            {"a": " 7 ", "b": "n/a", "c": null, "d": [1], "e": false}
        ]));

        let aligned = align(&input, None).unwrap();
        assert_eq!(aligned.table.rows, vec![vec![7.0, 0.0, 0.0, 0.0, 0.0]]);
        assert_eq!(aligned.coerced, 4);
        assert_eq!(aligned.filled, 3);
    }

    #[test]
    fn test_non_finite_strings_are_filled() {
        let input = records(json!([{"a": "inf", "b": "-Infinity", "c": "NaN", "d": "1e3"}]));

        let aligned = align(&input, None).unwrap();
        assert_eq!(aligned.table.rows, vec![vec![0.0, 0.0, 0.0, 1000.0]]);
        assert_eq!(aligned.filled, 3);
    }

    #[test]
    fn test_alignment_is_idempotent() {
        let input = records(json!([
            {"c": "3", "a": 1, "b": null, "junk": 9},
            {"a": 4, "b": 5.5, "c": 6}
        ]));
        let expected = names(&["a", "b", "c"]);

        let first = align(&input, Some(expected.as_slice())).unwrap();
        let second = align(&first.table.to_records(), Some(expected.as_slice())).unwrap();
        assert_eq!(first.table, second.table);
        assert!(second.dropped.is_empty());
        assert_eq!(second.filled, 0);

        let unknown = align(&first.table.to_records(), None).unwrap();
        assert_eq!(unknown.table, first.table);
    }
}
