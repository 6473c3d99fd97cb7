use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct AccountingConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Postgres connection string. Ignored for the memory backend.
    pub url: Option<String>,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Postgres,
}

impl std::str::FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(StorageBackend::Memory),
            "postgres" => Ok(StorageBackend::Postgres),
            _ => Err(format!("Invalid storage backend: {}", s)),
        }
    }
}

impl AccountingConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;

        let backend: StorageBackend = get_env("STORAGE_BACKEND", Some("postgres"))?
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let config = AccountingConfig {
            common,
            service_name: get_env("SERVICE_NAME", Some("accounting-service"))?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")))?,
            log_level: get_env("LOG_LEVEL", Some("info"))?,
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok(),
            storage: StorageConfig {
                backend,
                url: env::var("DATABASE_URL").ok(),
                max_connections: get_env("DB_MAX_CONNECTIONS", Some("10"))?
                    .parse()
                    .unwrap_or(10),
                min_connections: get_env("DB_MIN_CONNECTIONS", Some("1"))?
                    .parse()
                    .unwrap_or(1),
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// In-memory configuration bound to an ephemeral port, for tests.
    pub fn in_memory() -> Self {
        Self {
            common: core_config::Config { port: 0 },
            service_name: "accounting-service".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            log_level: "info".to_string(),
            otlp_endpoint: None,
            storage: StorageConfig {
                backend: StorageBackend::Memory,
                url: None,
                max_connections: 1,
                min_connections: 1,
            },
        }
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.storage.backend == StorageBackend::Postgres && self.storage.url.is_none() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "DATABASE_URL is required for the postgres storage backend"
            )));
        }
        if self.storage.max_connections == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "DB_MAX_CONNECTIONS must be greater than 0"
            )));
        }
        Ok(())
    }
}

fn get_env(key: &str, default: Option<&str>) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}
