//! Tool adapter error types

use thiserror::Error;

/// Errors raised while generating configurations or driving external tools
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Executable not found: {0}")]
    NotFound(String),

    #[error("Error while running: {command}\n\n{message}")]
    CommandFailed { command: String, message: String },

    #[error("Unable to apply after {retries} retries\n\n{source}")]
    ApplyRetriesExceeded {
        retries: u32,
        #[source]
        source: Box<ToolError>,
    },

    #[error("Role dependency cycle detected: {0}")]
    RoleCycle(String),

    #[error("{0}")]
    Runtime(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Template error: {0}")]
    Template(#[from] tera::Error),
}

pub type Result<T> = std::result::Result<T, ToolError>;
