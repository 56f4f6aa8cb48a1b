//! Configuration module for transaction-service.

use crate::services::cache::DEFAULT_TTL;
use crate::services::dedup::DEFAULT_LOOKBACK_DAYS;
use crate::services::import::DEFAULT_DECISION_TIMEOUT_MINUTES;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

#[derive(Debug, Clone)]
pub struct TransactionConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub dedup: DedupConfig,
    pub import: ImportConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Snapshot age before a read triggers a reload, in minutes.
    pub ttl_minutes: u64,
    /// Load the first snapshot during startup instead of on first read.
    pub warm_on_startup: bool,
}

#[derive(Debug, Clone)]
pub struct DedupConfig {
    /// How far back the duplicate query searches, in days.
    pub lookback_days: i64,
}

#[derive(Debug, Clone)]
pub struct ImportConfig {
    /// How long a duplicate decision may stay open, in minutes.
    pub decision_timeout_minutes: i64,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Root directory for uploaded source artifacts.
    pub artifact_root: String,
}

impl TransactionConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;

        Ok(Self {
            common,
            service_name: env::var("SERVICE_NAME")
                .unwrap_or_else(|_| "transaction-service".to_string()),
            service_version: env::var("SERVICE_VERSION")
                .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok(),
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").map_err(|_| {
                    AppError::ConfigError(anyhow::anyhow!("DATABASE_URL is required"))
                })?,
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
                min_connections: env::var("DATABASE_MIN_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(2),
            },
            cache: CacheConfig {
                ttl_minutes: env::var("CACHE_TTL_MINUTES")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_TTL.as_secs() / 60),
                warm_on_startup: env::var("CACHE_WARM_ON_STARTUP")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(true),
            },
            dedup: DedupConfig {
                lookback_days: env::var("DEDUP_LOOKBACK_DAYS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_LOOKBACK_DAYS),
            },
            import: ImportConfig {
                decision_timeout_minutes: env::var("IMPORT_DECISION_TIMEOUT_MINUTES")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_DECISION_TIMEOUT_MINUTES),
            },
            storage: StorageConfig {
                artifact_root: env::var("ARTIFACT_STORAGE_ROOT")
                    .unwrap_or_else(|_| "/var/lib/transaction-service/artifacts".to_string()),
            },
        })
    }
}
