//! Lobby configuration
//!
//! Loaded from a TOML file when one is supplied; every knob has a default
//! so embedders can also run on `LobbyConfig::default()`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Runtime configuration for the lobby coordinator
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LobbyConfig {
    /// Length of generated room codes
    pub code_length: usize,
    /// Alphabet room codes are drawn from
    pub code_alphabet: String,
    /// Redraw attempts before code generation is declared exhausted
    pub code_max_attempts: u32,
    /// Minimum active players required to start a game
    pub min_players_to_start: i64,
    /// Upper bound for a room's configurable capacity
    pub max_players_limit: i64,
    /// Time-to-live for cached room projections, in seconds
    pub cache_ttl_secs: u64,
    /// Per-room live channel capacity (events buffered per subscriber)
    pub stream_buffer: usize,
    /// Keep-alive interval on live subscriptions, in seconds
    pub keepalive_secs: u64,
    /// Where the audit event log is appended
    pub audit_log_path: PathBuf,
    /// Retry policy for the identity and catalog gateways
    pub retry: RetryConfig,
}

/// Bounded-retry knobs shared by the retried gateways
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub call_timeout_secs: u64,
}

impl Default for LobbyConfig {
    fn default() -> Self {
        Self {
            code_length: 6,
            code_alphabet: "ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789".to_string(),
            code_max_attempts: 100,
            min_players_to_start: 2,
            max_players_limit: 12,
            cache_ttl_secs: 7200,
            stream_buffer: 100,
            keepalive_secs: 15,
            audit_log_path: PathBuf::from("greenroom-events.jsonl"),
            retry: RetryConfig::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 2000,
            call_timeout_secs: 5,
        }
    }
}

impl LobbyConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: LobbyConfig = toml::from_str(&content)
            .map_err(|e| Error::Validation(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that cannot generate codes or admit players
    pub fn validate(&self) -> Result<()> {
        if self.code_length == 0 {
            return Err(Error::Validation("code_length must be at least 1".into()));
        }
        if self.code_alphabet.is_empty() {
            return Err(Error::Validation("code_alphabet must not be empty".into()));
        }
        if self.code_max_attempts == 0 {
            return Err(Error::Validation(
                "code_max_attempts must be at least 1".into(),
            ));
        }
        if self.min_players_to_start < 2 {
            return Err(Error::Validation(
                "min_players_to_start must be at least 2".into(),
            ));
        }
        if self.max_players_limit < self.min_players_to_start {
            return Err(Error::Validation(
                "max_players_limit must not be below min_players_to_start".into(),
            ));
        }
        Ok(())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LobbyConfig::default();
        assert_eq!(config.code_length, 6);
        assert_eq!(config.code_alphabet.len(), 36);
        assert_eq!(config.retry.max_attempts, 3);
        config.validate().unwrap();
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: LobbyConfig = toml::from_str(
            r#"
            code_length = 8
            cache_ttl_secs = 60

            [retry]
            max_attempts = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.code_length, 8);
        assert_eq!(config.cache_ttl(), Duration::from_secs(60));
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.initial_backoff_ms, 100);
    }

    #[test]
    fn test_rejects_empty_alphabet() {
        let config = LobbyConfig {
            code_alphabet: String::new(),
            ..LobbyConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
