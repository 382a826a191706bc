use serde_json::json;

use crate::types::Record;

/// Column order of the reference CO2 storage model.
pub const RAW_FEATURE_ORDER: [&str; 9] = [
    "Depth (m)",
    "P (MPa)",
    "T (°C)",
    "CO2 Density (kg/m3)",
    "GIIP (Mt)",
    "Seal Thickness (m)",
    "Reservoir Thickness (m)",
    "Fault",
    "Stacked",
];

/// Two realistic reservoirs, shallow and deep.
pub fn test_records() -> Vec<Record> {
    to_records(json!([
        {
            "CO2 Density (kg/m3)": 116.9,
            "Depth (m)": 465,
            "Fault": 0,
            "GIIP (Mt)": 10059.38824,
            "P (MPa)": 4.5,
            "Reservoir Thickness (m)": 108.6962682,
            "Seal Thickness (m)": 300,
            "Stacked": 0,
            "T (°C)": 20
        },
        {
            "CO2 Density (kg/m3)": 919.3,
            "Depth (m)": 4262,
            "Fault": 1,
            "GIIP (Mt)": 11057.38641,
            "P (MPa)": 61.8,
            "Reservoir Thickness (m)": 331.7784656,
            "Seal Thickness (m)": 192,
            "Stacked": 1,
            "T (°C)": 81
        }
    ]))
}

/// Extreme low and high values, sent in `RAW_FEATURE_ORDER` without schema checks.
pub fn raw_records() -> Vec<Record> {
    to_records(json!([
        {
            "Depth (m)": 1,
            "P (MPa)": 0.1,
            "T (°C)": -50,
            "CO2 Density (kg/m3)": 1,
            "GIIP (Mt)": 1,
            "Seal Thickness (m)": 1,
            "Reservoir Thickness (m)": 1,
            "Fault": 0,
            "Stacked": 0
        },
        {
            "Depth (m)": 99999,
            "P (MPa)": 999.0,
            "T (°C)": 999,
            "CO2 Density (kg/m3)": 9999,
            "GIIP (Mt)": 99999,
            "Seal Thickness (m)": 99999,
            "Reservoir Thickness (m)": 99999,
            "Fault": 1,
            "Stacked": 1
        }
    ]))
}

pub fn raw_feature_order() -> Vec<String> {
    RAW_FEATURE_ORDER.iter().map(|name| name.to_string()).collect()
}

fn to_records(value: serde_json::Value) -> Vec<Record> {
    match value {
        serde_json::Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                serde_json::Value::Object(record) => Some(record),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}
