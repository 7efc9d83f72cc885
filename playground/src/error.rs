//! Unified error handling for the playground.

use crate::config::ConfigError;
use std::path::PathBuf;

/// Application error type.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Engine error: {0}")]
    Engine(#[from] kanban_engine::Error),

    #[error("Could not read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid script: {0}")]
    Script(#[from] serde_json::Error),

    #[error("No deletion recorded for '{0}'")]
    UnknownDeletion(String),

    #[error("Step {step}: {message}")]
    Step { step: usize, message: String },
}

/// Result type alias for the playground.
pub type Result<T> = std::result::Result<T, AppError>;
