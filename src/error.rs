use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Registry error: {0}")]
    Registry(String),

    #[error("Task log error: {0}")]
    Store(String),

    #[error("Notification error: {0}")]
    Notify(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Failed to create log directory {}: {source}", .path.display())]
    LogDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Transport error: {0}")]
    TransportError(#[from] tonic::transport::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, WorkerError>;
