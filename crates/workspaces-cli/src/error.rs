//! Error types for the CLI

use std::path::PathBuf;

/// CLI Result type
pub type Result<T> = std::result::Result<T, Error>;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid YAML in {path}: {message}")]
    InvalidYaml { path: PathBuf, message: String },

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Compile(#[from] workspaces_desired_config::CompileError),

    #[error(transparent)]
    Render(#[from] workspaces_desired_config::Error),

    #[error(transparent)]
    Telemetry(#[from] workspaces_common::telemetry::TelemetryError),
}

impl Error {
    pub fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Read {
            path: path.into(),
            source,
        }
    }

    pub fn invalid_yaml(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Error::InvalidYaml {
            path: path.into(),
            message: message.into(),
        }
    }
}
