use std::collections::HashSet;
use std::path::PathBuf;

use crate::ml::loader::DEFAULT_MODEL_FILES;

const DEFAULT_MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub api_addr: String,
    pub cors_origins: String,
    pub model_dir: PathBuf,
    pub model_files: Vec<String>,
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            api_addr: "0.0.0.0:5000".to_string(),
            cors_origins: "http://localhost:3000".to_string(),
            model_dir: PathBuf::from("."),
            model_files: default_model_files(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let mut config = ServerConfig::default();

        if let Some(addr) = env_string("PREDICT_API_ADDR") {
            config.api_addr = addr;
        }
        if let Some(origins) = env_string("PREDICT_CORS_ORIGIN") {
            config.cors_origins = origins;
        }
        if let Some(dir) = env_string("PREDICT_MODEL_DIR") {
            config.model_dir = PathBuf::from(dir);
        }
        if let Ok(value) = std::env::var("PREDICT_MODEL_FILES") {
            config.set_model_files(
                value
                    .split(';')
                    .map(|entry| entry.to_string())
                    .collect::<Vec<_>>(),
            );
        }
        if let Some(value) = std::env::var("PREDICT_MAX_BODY_BYTES")
            .ok()
            .and_then(|value| value.trim().parse::<usize>().ok())
        {
            config.set_max_body_bytes(value);
        }

        config
    }

    pub fn set_model_files(&mut self, entries: Vec<String>) {
        let files = normalize_model_files(entries);
        self.model_files = if files.is_empty() {
            default_model_files()
        } else {
            files
        };
    }

    pub fn set_max_body_bytes(&mut self, value: usize) {
        self.max_body_bytes = clamp_max_body_bytes(value);
    }

    pub fn cors_origin_list(&self) -> Vec<String> {
        self.cors_origins
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect()
    }

    pub fn allows_any_origin(&self) -> bool {
        self.cors_origins.trim() == "*"
    }
}

/// Trims, drops blanks and duplicates, keeps priority order.
pub fn normalize_model_files(entries: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut files = Vec::new();
    for entry in entries {
        let trimmed = entry.trim();
        if trimmed.is_empty() {
            continue;
        }
        if seen.insert(trimmed.to_string()) {
            files.push(trimmed.to_string());
        }
    }
    files
}

fn default_model_files() -> Vec<String> {
    DEFAULT_MODEL_FILES
        .iter()
        .map(|name| name.to_string())
        .collect()
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn clamp_max_body_bytes(value: usize) -> usize {
    let normalized = if value < 1024 { 1024 } else { value };
    normalized.min(64 * 1024 * 1024)
}
