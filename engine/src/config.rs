//! Engine configuration.

use crate::Position;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Tunables for the board engine.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Grace period before a deletion is committed
    pub undo_ttl: Duration,
    /// How long informational notifications stay up
    pub info_duration: Duration,
    /// How long error notifications stay up
    pub error_duration: Duration,
    /// How often expired undo actions are swept
    pub cleanup_interval: Duration,
    /// Neighbour gap below which a container should be renumbered
    pub min_position_gap: Position,
    /// Spacing used when renumbering a container
    pub rebalance_step: Position,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            undo_ttl: Duration::from_millis(10_000),
            info_duration: Duration::from_millis(3_000),
            error_duration: Duration::from_millis(5_000),
            cleanup_interval: Duration::from_millis(5_000),
            min_position_gap: 1e-6,
            rebalance_step: 1.0,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let millis = |key: &'static str, default: Duration| -> Result<Duration, ConfigError> {
            parse_or(&lookup, key, default.as_millis() as u64).map(Duration::from_millis)
        };

        let config = Self {
            undo_ttl: millis("KANBAN_UNDO_TTL_MS", defaults.undo_ttl)?,
            info_duration: millis("KANBAN_INFO_NOTICE_MS", defaults.info_duration)?,
            error_duration: millis("KANBAN_ERROR_NOTICE_MS", defaults.error_duration)?,
            cleanup_interval: millis("KANBAN_CLEANUP_INTERVAL_MS", defaults.cleanup_interval)?,
            min_position_gap: parse_or(&lookup, "KANBAN_MIN_POSITION_GAP", defaults.min_position_gap)?,
            rebalance_step: parse_or(&lookup, "KANBAN_REBALANCE_STEP", defaults.rebalance_step)?,
        };

        if config.cleanup_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "KANBAN_CLEANUP_INTERVAL_MS",
                value: "0".to_string(),
            });
        }
        if !(config.rebalance_step > 0.0) {
            return Err(ConfigError::InvalidValue {
                key: "KANBAN_REBALANCE_STEP",
                value: config.rebalance_step.to_string(),
            });
        }

        Ok(config)
    }
}

fn parse_or<T, F>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { key, value: raw }),
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: '{value}'")]
    InvalidValue { key: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = EngineConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.undo_ttl, Duration::from_secs(10));
    }

    #[test]
    fn overrides() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("KANBAN_UNDO_TTL_MS", "2500"),
            ("KANBAN_REBALANCE_STEP", "1024"),
        ]))
        .unwrap();

        assert_eq!(config.undo_ttl, Duration::from_millis(2500));
        assert_eq!(config.rebalance_step, 1024.0);
        assert_eq!(config.info_duration, Duration::from_secs(3));
    }

    #[test]
    fn invalid_number() {
        let result = EngineConfig::from_lookup(lookup(&[("KANBAN_UNDO_TTL_MS", "soon")]));
        assert_eq!(
            result,
            Err(ConfigError::InvalidValue {
                key: "KANBAN_UNDO_TTL_MS",
                value: "soon".to_string()
            })
        );
    }

    #[test]
    fn rejects_non_positive_step() {
        let result = EngineConfig::from_lookup(lookup(&[("KANBAN_REBALANCE_STEP", "0")]));
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }
}
