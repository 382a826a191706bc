use std::path::Path;

use log::{error, info, warn};

use crate::error::ModelLoadError;
use crate::ml::artifact::ModelArtifact;
use crate::ml::handle::ModelHandle;
use crate::types::timestamp_now;

pub const DEFAULT_MODEL_FILES: [&str; 3] = ["model.json", "your_model.json", "trained_model.json"];

/// Tries each candidate in order; the first artifact that parses wins.
pub fn load(dir: &Path, candidates: &[String]) -> Result<ModelHandle, ModelLoadError> {
    for name in candidates {
        let path = dir.join(name);
        if !path.exists() {
            continue;
        }
        if path.is_dir() {
            warn!("[MODEL] Skipping {}: path is a directory", path.display());
            continue;
        }

        match load_file(&path) {
            Ok(handle) => {
                info!(
                    "[MODEL] Loaded {} from {}",
                    handle.model_type(),
                    path.display()
                );
                return Ok(handle);
            }
            Err(err) => {
                error!("[MODEL] Error loading {}: {}", name, err);
            }
        }
    }

    Err(ModelLoadError::NotFound {
        dir: dir.to_path_buf(),
        tried: candidates.join(", "),
    })
}

pub fn load_file(path: &Path) -> Result<ModelHandle, ModelLoadError> {
    let data = std::fs::read(path).map_err(|source| ModelLoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let artifact = ModelArtifact::from_slice(&data).map_err(|source| ModelLoadError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    let model = artifact.build()?;
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default()
        .to_string();

    Ok(ModelHandle::new(model, file_name, timestamp_now()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const LINEAR: &str =
        r#"{"estimator": {"kind": "linear_regression", "coefficients": [1.0], "intercept": 0.5}}"#;

    fn candidates() -> Vec<String> {
        DEFAULT_MODEL_FILES.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn test_missing_artifacts_report_not_found() {
        let dir = TempDir::new().unwrap();
        let error = load(dir.path(), &candidates()).err().unwrap();
        assert!(matches!(error, ModelLoadError::NotFound { .. }));
        assert!(error.to_string().contains("model.json, your_model.json, trained_model.json"));
    }

    #[test]
    fn test_first_valid_candidate_wins() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("your_model.json"), LINEAR).unwrap();
        std::fs::write(
            dir.path().join("trained_model.json"),
            r#"{"model_type": "Later", "estimator": {"kind": "linear_regression", "coefficients": [1.0]}}"#,
        )
        .unwrap();

        let handle = load(dir.path(), &candidates()).unwrap();
        assert_eq!(handle.model_type(), "LinearRegression");
        assert_eq!(handle.info().file_name, "your_model.json");
    }

    #[test]
    fn test_corrupt_candidate_falls_through() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("model.json"), b"not json").unwrap();
        std::fs::write(dir.path().join("trained_model.json"), LINEAR).unwrap();

        let handle = load(dir.path(), &candidates()).unwrap();
        assert_eq!(handle.info().file_name, "trained_model.json");
    }

    #[test]
    fn test_load_file_reports_parse_errors() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.json");
        std::fs::write(&path, r#"{"estimator": {"kind": "svm"}}"#).unwrap();

        let error = load_file(&path).err().unwrap();
        assert!(matches!(error, ModelLoadError::Parse { .. }));
    }
}
