//! Ingest configuration
//!
//! Loaded from environment variables (optionally via a `.env` file) with
//! documented defaults, then checked by [`IngestConfig::validate`].

use namestat_common::ChecksumAlgorithm;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{IngestError, Result};

// ============================================================================
// Defaults
// ============================================================================

/// Published national archive (one `yobYYYY.txt` entry per year).
pub const DEFAULT_NATIONAL_URL: &str = "https://www.ssa.gov/oact/babynames/names.zip";

/// Published state archive (one `XX.TXT` entry per state).
pub const DEFAULT_STATE_URL: &str = "https://www.ssa.gov/oact/babynames/state/namesbystate.zip";

/// Rows buffered per entity kind before a flush.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Upper bound accepted for `NAMESTAT_BATCH_SIZE`.
pub const MAX_BATCH_SIZE: usize = 10_000;

pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;

/// The publisher rejects requests without a browser-like agent.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

pub const DEFAULT_REFERER: &str = "https://www.ssa.gov/";

/// First year covered by the published state archive.
pub const DEFAULT_STATE_FIRST_YEAR: i32 = 1880;

pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/namestat";

pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;

pub const DEFAULT_DATABASE_MIN_CONNECTIONS: u32 = 1;

pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Top-level configuration for the import pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Default source for national imports
    pub national_url: String,
    /// Default source for state imports
    pub state_url: String,
    pub batch_size: usize,
    pub checksum_algorithm: ChecksumAlgorithm,
    pub http: HttpConfig,
    pub database: DatabaseConfig,
}

/// HTTP client settings for archive downloads
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub user_agent: String,
    pub referer: Option<String>,
}

/// PostgreSQL connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
}

impl HttpConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            referer: Some(DEFAULT_REFERER.to_string()),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
            min_connections: DEFAULT_DATABASE_MIN_CONNECTIONS,
            connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            national_url: DEFAULT_NATIONAL_URL.to_string(),
            state_url: DEFAULT_STATE_URL.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            checksum_algorithm: ChecksumAlgorithm::default(),
            http: HttpConfig::default(),
            database: DatabaseConfig::default(),
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl IngestConfig {
    /// Load configuration from environment and defaults
    ///
    /// Environment variables:
    /// - `NAMESTAT_NATIONAL_URL`, `NAMESTAT_STATE_URL`: default archive sources
    /// - `NAMESTAT_BATCH_SIZE`: rows per flush (1..=10000)
    /// - `NAMESTAT_CHECKSUM`: md5 or sha256
    /// - `NAMESTAT_HTTP_CONNECT_TIMEOUT`, `NAMESTAT_HTTP_TIMEOUT`: seconds
    /// - `NAMESTAT_HTTP_USER_AGENT`, `NAMESTAT_HTTP_REFERER` (empty disables)
    /// - `DATABASE_URL`, `DATABASE_MAX_CONNECTIONS`, `DATABASE_MIN_CONNECTIONS`,
    ///   `DATABASE_CONNECT_TIMEOUT`
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = IngestConfig::default();
        let checksum_algorithm = match std::env::var("NAMESTAT_CHECKSUM") {
            Ok(value) => value.parse()?,
            Err(_) => defaults.checksum_algorithm,
        };
        let referer = match std::env::var("NAMESTAT_HTTP_REFERER") {
            Ok(value) if value.trim().is_empty() => None,
            Ok(value) => Some(value),
            Err(_) => defaults.http.referer,
        };

        let config = IngestConfig {
            national_url: std::env::var("NAMESTAT_NATIONAL_URL").unwrap_or(defaults.national_url),
            state_url: std::env::var("NAMESTAT_STATE_URL").unwrap_or(defaults.state_url),
            batch_size: env_or("NAMESTAT_BATCH_SIZE", DEFAULT_BATCH_SIZE),
            checksum_algorithm,
            http: HttpConfig {
                connect_timeout_secs: env_or(
                    "NAMESTAT_HTTP_CONNECT_TIMEOUT",
                    DEFAULT_CONNECT_TIMEOUT_SECS,
                ),
                request_timeout_secs: env_or("NAMESTAT_HTTP_TIMEOUT", DEFAULT_REQUEST_TIMEOUT_SECS),
                user_agent: std::env::var("NAMESTAT_HTTP_USER_AGENT")
                    .unwrap_or(defaults.http.user_agent),
                referer,
            },
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL").unwrap_or(defaults.database.url),
                max_connections: env_or(
                    "DATABASE_MAX_CONNECTIONS",
                    DEFAULT_DATABASE_MAX_CONNECTIONS,
                ),
                min_connections: env_or(
                    "DATABASE_MIN_CONNECTIONS",
                    DEFAULT_DATABASE_MIN_CONNECTIONS,
                ),
                connect_timeout_secs: env_or(
                    "DATABASE_CONNECT_TIMEOUT",
                    DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                ),
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.national_url.trim().is_empty() || self.state_url.trim().is_empty() {
            return Err(IngestError::Validation(
                "Archive source URLs cannot be empty".to_string(),
            ));
        }

        if self.batch_size == 0 || self.batch_size > MAX_BATCH_SIZE {
            return Err(IngestError::Validation(format!(
                "Batch size must be between 1 and {}, got {}",
                MAX_BATCH_SIZE, self.batch_size
            )));
        }

        if self.http.connect_timeout_secs == 0 || self.http.request_timeout_secs == 0 {
            return Err(IngestError::Validation(
                "HTTP timeouts must be greater than 0".to_string(),
            ));
        }

        if self.database.url.is_empty() {
            return Err(IngestError::Validation("Database URL cannot be empty".to_string()));
        }

        if self.database.max_connections == 0 {
            return Err(IngestError::Validation(
                "Database max_connections must be greater than 0".to_string(),
            ));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(IngestError::Validation(format!(
                "Database min_connections ({}) cannot be greater than max_connections ({})",
                self.database.min_connections, self.database.max_connections
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_default_config_is_valid() {
        let config = IngestConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.batch_size, 1000);
        assert_eq!(config.checksum_algorithm, ChecksumAlgorithm::Md5);
        assert_eq!(config.http.connect_timeout(), Duration::from_secs(30));
        assert_eq!(config.http.request_timeout(), Duration::from_secs(300));
    }

    #[test]
    fn test_batch_size_bounds() {
        let mut config = IngestConfig::default();
        config.batch_size = 0;
        assert!(config.validate().is_err());
        config.batch_size = MAX_BATCH_SIZE + 1;
        assert!(config.validate().is_err());
        config.batch_size = MAX_BATCH_SIZE;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_pool_bounds() {
        let mut config = IngestConfig::default();
        config.database.min_connections = 20;
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        std::env::set_var("NAMESTAT_BATCH_SIZE", "250");
        std::env::set_var("NAMESTAT_CHECKSUM", "sha256");
        std::env::set_var("NAMESTAT_HTTP_REFERER", "");

        let config = IngestConfig::from_env().unwrap();

        std::env::remove_var("NAMESTAT_BATCH_SIZE");
        std::env::remove_var("NAMESTAT_CHECKSUM");
        std::env::remove_var("NAMESTAT_HTTP_REFERER");

        assert_eq!(config.batch_size, 250);
        assert_eq!(config.checksum_algorithm, ChecksumAlgorithm::Sha256);
        assert_eq!(config.http.referer, None);
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_oversized_batch() {
        std::env::set_var("NAMESTAT_BATCH_SIZE", "50000");
        let result = IngestConfig::from_env();
        std::env::remove_var("NAMESTAT_BATCH_SIZE");
        assert!(matches!(result, Err(IngestError::Validation(_))));
    }
}
