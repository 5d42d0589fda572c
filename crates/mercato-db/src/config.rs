//! Engine configuration.
//!
//! Process-level settings are loaded from environment variables with
//! fallback to defaults. Business tunables (rider subsidies, rates) live in
//! the `system_settings` table instead.

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::pool::DbConfig;

/// Engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// SQLite database file
    pub database_path: String,

    /// Pool ceiling (default: 100)
    pub max_connections: u32,

    /// Connections kept open (default: 20)
    pub min_connections: u32,

    /// Connection lifetime in seconds (default: 30 min)
    pub max_lifetime_secs: u64,

    /// Business timezone as minutes east of UTC (default: +08:00)
    pub utc_offset_minutes: i32,

    /// Deadline for geocoding and weather calls
    pub outbound_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            database_path: "./mercato.db".to_string(),
            max_connections: 100,
            min_connections: 20,
            max_lifetime_secs: 1800,
            utc_offset_minutes: 480,
            outbound_timeout_ms: 3000,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = EngineConfig::default();
        let config = EngineConfig {
            database_path: env::var("MERCATO_DB_PATH").unwrap_or(defaults.database_path),
            max_connections: parse_var("MERCATO_DB_MAX_CONNECTIONS", defaults.max_connections)?,
            min_connections: parse_var("MERCATO_DB_MIN_CONNECTIONS", defaults.min_connections)?,
            max_lifetime_secs: parse_var("MERCATO_DB_MAX_LIFETIME_SECS", defaults.max_lifetime_secs)?,
            utc_offset_minutes: parse_var("MERCATO_UTC_OFFSET_MINUTES", defaults.utc_offset_minutes)?,
            outbound_timeout_ms: parse_var("MERCATO_OUTBOUND_TIMEOUT_MS", defaults.outbound_timeout_ms)?,
        };

        if config.min_connections > config.max_connections {
            return Err(ConfigError::InvalidValue("MERCATO_DB_MIN_CONNECTIONS".to_string()));
        }
        config.zone()?;

        Ok(config)
    }

    /// The business timezone.
    pub fn zone(&self) -> Result<FixedOffset, ConfigError> {
        FixedOffset::east_opt(self.utc_offset_minutes * 60)
            .ok_or_else(|| ConfigError::InvalidValue("MERCATO_UTC_OFFSET_MINUTES".to_string()))
    }

    pub fn outbound_timeout(&self) -> Duration {
        Duration::from_millis(self.outbound_timeout_ms)
    }

    /// Pool settings for [`crate::Database::new`].
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(&self.database_path)
            .max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .max_lifetime(Duration::from_secs(self.max_lifetime_secs))
    }
}

fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(name.to_string())),
        Err(_) => Ok(default),
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_connections, 100);
        assert_eq!(config.min_connections, 20);
        assert_eq!(config.zone().unwrap(), FixedOffset::east_opt(8 * 3600).unwrap());
        assert_eq!(config.outbound_timeout(), Duration::from_secs(3));
    }

    #[test]
    fn test_out_of_range_offset_rejected() {
        let config = EngineConfig {
            utc_offset_minutes: 24 * 60,
            ..EngineConfig::default()
        };
        assert!(matches!(config.zone(), Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn test_db_config_carries_pool_limits() {
        let db = EngineConfig::default().db_config();
        assert_eq!(db.max_connections, 100);
        assert_eq!(db.min_connections, 20);
        assert_eq!(db.max_lifetime, Some(Duration::from_secs(1800)));
    }
}
