//! Error types for the topomap-discover crate.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DiscoverError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Cloud inventory error: {0}")]
    Cloud(String),

    #[error("Remote command on {host} failed: {message}")]
    Remote { host: String, message: String },

    #[error("Could not connect to {host}: {message}")]
    Connect { host: String, message: String },

    #[error("Failed to parse {what}: {message}")]
    Parse { what: String, message: String },

    #[error("Renderer not found at path: {path}")]
    RendererNotFound { path: String },

    #[error("Renderer exited with code {code}: {stderr}")]
    Render { code: i32, stderr: String },

    #[error("Graph model error: {0}")]
    Model(#[from] topomap_core::CoreError),

    #[error("Report store error: {0}")]
    Report(#[from] topomap_report::StoreError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DiscoverError {
    pub(crate) fn parse(what: &str, message: impl Into<String>) -> Self {
        Self::Parse {
            what: what.to_string(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DiscoverError>;
