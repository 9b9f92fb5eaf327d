//! Error types for podgate

use thiserror::Error;

/// Main error type for the orchestrator
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Configuration file not found, searched: {0}")]
    ConfigNotFound(String),

    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("Runtime command failed: {0}")]
    CommandFailed(String),

    #[error("Image build failed: {0}")]
    BuildFailed(String),

    #[error("Container not found: {0}")]
    ContainerNotFound(String),

    #[error("Deployment error: {0}")]
    DeployError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),
}
