use serde::Deserialize;
use std::env;

use crate::error::FrameError;
use crate::models::{ConnectorDescriptor, PoolSettings};

#[derive(Debug, Clone, Deserialize)]
pub struct FrameConfig {
    /// Connector used when a query names none
    #[serde(default)]
    pub default_connector: Option<String>,
    pub pool: PoolConfig,
    pub query: QueryConfig,
    pub logging: LoggingConfig,
    /// Connectors declared in the configuration file
    #[serde(default)]
    pub connectors: Vec<ConnectorConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PoolConfig {
    pub max_size: usize,
    pub min_idle: Option<usize>,
    pub acquire_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryConfig {
    pub timeout_secs: u64,
    pub apply_limit: bool,
    pub limit_value: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub style: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConnectorConfig {
    pub name: String,
    pub url: String,
    pub max_pool_size: Option<usize>,
    pub acquire_timeout_ms: Option<u64>,
}

impl FrameConfig {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder()
            .set_default("pool.max_size", 16)?
            .set_default("pool.min_idle", 2)?
            .set_default("pool.acquire_timeout_ms", 5_000)?
            .set_default("query.timeout_secs", 30)?
            .set_default("query.apply_limit", true)?
            .set_default("query.limit_value", 1000)?
            .set_default("logging.level", "info")?
            .set_default("logging.style", "auto")?;

        // Optional configuration file with connector declarations
        if let Ok(path) = env::var("KRYSTAL_CONFIG") {
            builder = builder.add_source(config::File::with_name(&path));
        }

        // Load from environment variables
        if let Ok(name) = env::var("KRYSTAL_DEFAULT_CONNECTOR") {
            builder = builder.set_override("default_connector", name)?;
        }

        if let Ok(max_size) = env::var("KRYSTAL_POOL_MAX_SIZE") {
            builder =
                builder.set_override("pool.max_size", max_size.parse::<i64>().unwrap_or(16))?;
        }

        if let Ok(timeout) = env::var("KRYSTAL_POOL_ACQUIRE_TIMEOUT_MS") {
            builder = builder.set_override(
                "pool.acquire_timeout_ms",
                timeout.parse::<i64>().unwrap_or(5_000),
            )?;
        }

        if let Ok(timeout) = env::var("KRYSTAL_QUERY_TIMEOUT_SECS") {
            builder = builder
                .set_override("query.timeout_secs", timeout.parse::<i64>().unwrap_or(30))?;
        }

        if let Ok(log_level) = env::var("RUST_LOG") {
            builder = builder.set_override("logging.level", log_level)?;
        }

        if let Ok(log_style) = env::var("RUST_LOG_STYLE") {
            builder = builder.set_override("logging.style", log_style)?;
        }

        // Try to load from .env file
        let _ = dotenv::dotenv();

        builder.build()?.try_deserialize()
    }

    /// Descriptors for the declared connectors, with the global pool defaults
    /// applied underneath each connector's own overrides.
    pub fn descriptors(&self) -> Result<Vec<ConnectorDescriptor>, FrameError> {
        self.connectors
            .iter()
            .map(|c| {
                let descriptor = ConnectorDescriptor::new(&c.name, &c.url)?;
                let pool = PoolSettings {
                    max_size: c.max_pool_size.unwrap_or(self.pool.max_size),
                    min_idle: self.pool.min_idle,
                    acquire_timeout_ms: c
                        .acquire_timeout_ms
                        .unwrap_or(self.pool.acquire_timeout_ms),
                };
                Ok(descriptor.with_pool(pool))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        env::remove_var("KRYSTAL_CONFIG");
        env::remove_var("KRYSTAL_POOL_MAX_SIZE");
        env::remove_var("KRYSTAL_DEFAULT_CONNECTOR");

        let config = FrameConfig::from_env();
        assert!(config.is_ok());

        let config = config.unwrap();
        assert_eq!(config.pool.max_size, 16);
        assert_eq!(config.pool.acquire_timeout_ms, 5_000);
        assert_eq!(config.query.timeout_secs, 30);
        assert!(config.query.apply_limit);
        assert!(config.connectors.is_empty());
    }

    #[test]
    fn test_descriptors_apply_pool_defaults() {
        let config = FrameConfig {
            default_connector: Some("primary".to_string()),
            pool: PoolConfig {
                max_size: 8,
                min_idle: Some(1),
                acquire_timeout_ms: 2_000,
            },
            query: QueryConfig {
                timeout_secs: 30,
                apply_limit: true,
                limit_value: 1000,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                style: "auto".to_string(),
            },
            connectors: vec![
                ConnectorConfig {
                    name: "primary".to_string(),
                    url: "postgresql://localhost:5432/app".to_string(),
                    max_pool_size: None,
                    acquire_timeout_ms: None,
                },
                ConnectorConfig {
                    name: "embedded".to_string(),
                    url: "sqlite::memory:".to_string(),
                    max_pool_size: Some(2),
                    acquire_timeout_ms: Some(500),
                },
            ],
        };

        let descriptors = config.descriptors().unwrap();
        assert_eq!(descriptors.len(), 2);
        assert_eq!(descriptors[0].pool.max_size, 8);
        assert_eq!(descriptors[0].pool.acquire_timeout_ms, 2_000);
        assert_eq!(descriptors[1].pool.max_size, 2);
        assert_eq!(descriptors[1].pool.acquire_timeout_ms, 500);
    }

    #[test]
    fn test_descriptor_with_bad_url_fails() {
        let config = FrameConfig {
            default_connector: None,
            pool: PoolConfig {
                max_size: 8,
                min_idle: None,
                acquire_timeout_ms: 2_000,
            },
            query: QueryConfig {
                timeout_secs: 30,
                apply_limit: true,
                limit_value: 1000,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                style: "auto".to_string(),
            },
            connectors: vec![ConnectorConfig {
                name: "bad".to_string(),
                url: "oracle://localhost/xe".to_string(),
                max_pool_size: None,
                acquire_timeout_ms: None,
            }],
        };

        assert!(config.descriptors().is_err());
    }
}
