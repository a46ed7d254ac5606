use thiserror::Error;
use std::io;

/// Generic error type
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Two profiles share a name
    #[error("Duplicate approval profiles configured: \"{0}\"")]
    DuplicateProfile(String),

    /// Usage token outside the recognized key usage vocabulary
    #[error("Not a supported certificate usage: \"{0}\"")]
    UnsupportedUsage(String),

    /// Request bytes are not a well-formed PKCS#10 request
    #[error("Malformed certificate request: {0}")]
    MalformedRequest(String),

    /// Work queue key that cannot be split into namespace and name
    #[error("Invalid queue key: {0}")]
    InvalidKey(String),

    /// Resource not found
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Write rejected because the stored object changed underneath
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Request store error
    #[error("Store error: {0}")]
    Store(String),

    /// Metrics registry error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// HTTP server error
    #[error("API server error: {0}")]
    ApiServer(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<pem::PemError> for Error {
    fn from(err: pem::PemError) -> Self {
        Error::MalformedRequest(err.to_string())
    }
}
