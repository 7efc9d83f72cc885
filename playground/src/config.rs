//! Configuration management for the playground.

use kanban_engine::EngineConfig;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Playground configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Board fixture to start from
    pub board_path: PathBuf,
    /// Session script to replay
    pub script_path: PathBuf,
    /// Artificial delay added to every gateway call
    pub latency: Option<Duration>,
    /// Engine tunables
    pub engine: EngineConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let board_path = env::var("PLAYGROUND_BOARD")
            .unwrap_or_else(|_| "playground/fixtures/board.json".to_string())
            .into();

        let script_path = env::var("PLAYGROUND_SCRIPT")
            .unwrap_or_else(|_| "playground/fixtures/session.json".to_string())
            .into();

        let latency = match env::var("PLAYGROUND_LATENCY_MS") {
            Ok(raw) => Some(Duration::from_millis(
                raw.trim().parse().map_err(|_| ConfigError::InvalidLatency)?,
            )),
            Err(_) => None,
        };

        let engine = EngineConfig::from_env()?;

        Ok(Self {
            board_path,
            script_path,
            latency,
            engine,
        })
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid PLAYGROUND_LATENCY_MS value")]
    InvalidLatency,

    #[error(transparent)]
    Engine(#[from] kanban_engine::ConfigError),
}
