//! Host lifecycle error types

use thiserror::Error;

/// Errors raised while managing a host configuration
#[derive(Error, Debug)]
pub enum HostError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Configuration not applied: no \"{0}\" output available")]
    NotApplied(String),

    #[error(transparent)]
    Core(#[from] forgeflow_core::CoreError),

    #[error(transparent)]
    Config(#[from] forgeflow_config::ConfigError),

    #[error(transparent)]
    Client(#[from] forgeflow_client::ClientError),

    #[error(transparent)]
    Tool(#[from] forgeflow_tools::ToolError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, HostError>;
