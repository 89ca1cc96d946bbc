//! Error types for the Labmesh core

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Port exhausted: {0}")]
    PortExhausted(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Backend unreachable: {0}")]
    BackendUnreachable(String),

    #[error("Sequencing violation: {0}")]
    SequencingViolation(String),

    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Module error: {0}")]
    ModuleError(String),

    #[error("Compute not found: {0}")]
    ComputeNotFound(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
