//! Web service client error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Web service error (HTTP {status}): {message}")]
    WebServer { status: u16, message: String },

    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Invalid response body: {0}")]
    InvalidResponse(String),

    #[error(transparent)]
    Core(#[from] forgeflow_core::CoreError),
}

pub type Result<T> = std::result::Result<T, ClientError>;
