//! Configuration module for payorch-server.
//!
//! Handles loading configuration from TOML files, CLI arguments,
//! and environment variables.

pub mod file;

use crate::config::file::FileConfig;
use payorch_core::gateway::MerchantApiConfig;
use payorch_core::processors::ReconcilerConfig;
use payorch_core::service::{RetryPolicy, ServiceConfig};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const DATABASE_URL_ENV: &str = "DATABASE_URL";
pub const GATEWAY_PASSWORD_ENV: &str = "PAYORCH_GATEWAY_PASSWORD";

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("DATABASE_URL environment variable not set")]
    MissingDatabaseUrl,
}

#[derive(Debug, Clone, Copy)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    pub request_timeout: Duration,
}

/// Loaded configuration, ready to wire into the runtime.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub server: ServerConfig,
    pub max_connections: u32,
    pub gateway: MerchantApiConfig,
    pub service: ServiceConfig,
    /// `None` when the sweep is disabled.
    pub reconciler: Option<ReconcilerConfig>,
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: std::path::PathBuf,
    listen_override: Option<SocketAddr>,
}

impl ConfigLoader {
    /// Create a new config loader.
    pub fn new(config_path: impl AsRef<Path>, listen_override: Option<SocketAddr>) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            listen_override,
        }
    }

    /// Load and process the configuration.
    ///
    /// This will:
    /// 1. Read the TOML file
    /// 2. Apply CLI and environment overrides
    /// 3. Validate the configuration
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let config_content = std::fs::read_to_string(&self.config_path)?;
        self.load_str(&config_content, std::env::var(GATEWAY_PASSWORD_ENV).ok())
    }

    fn load_str(
        &self,
        content: &str,
        password_override: Option<String>,
    ) -> Result<LoadedConfig, ConfigError> {
        let mut file_config: FileConfig = toml::from_str(content)?;

        if let Some(listen) = self.listen_override {
            file_config.server.listen = listen;
        }
        if let Some(password) = password_override {
            file_config.gateway.password = Some(password);
        }

        validate(&file_config)?;
        build_loaded_config(file_config)
    }
}

fn validate(config: &FileConfig) -> Result<(), ConfigError> {
    if config.gateway.username.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "gateway.username must not be empty".into(),
        ));
    }
    if config.orchestrator.max_write_attempts == 0 {
        return Err(ConfigError::ValidationError(
            "orchestrator.max_write_attempts must be at least 1".into(),
        ));
    }
    if config.orchestrator.max_page_size == 0 {
        return Err(ConfigError::ValidationError(
            "orchestrator.max_page_size must be at least 1".into(),
        ));
    }
    if config.reconciler.enabled && config.reconciler.interval_secs == 0 {
        return Err(ConfigError::ValidationError(
            "reconciler.interval_secs must be at least 1".into(),
        ));
    }
    Ok(())
}

fn build_loaded_config(file_config: FileConfig) -> Result<LoadedConfig, ConfigError> {
    let FileConfig {
        server,
        database,
        gateway,
        orchestrator,
        reconciler,
    } = file_config;

    let password = gateway.password.ok_or_else(|| {
        ConfigError::ValidationError(format!(
            "gateway.password is not set and {GATEWAY_PASSWORD_ENV} is empty"
        ))
    })?;

    Ok(LoadedConfig {
        server: ServerConfig {
            listen: server.listen,
            request_timeout: Duration::from_secs(server.request_timeout_secs),
        },
        max_connections: database.max_connections,
        gateway: MerchantApiConfig {
            name: gateway.name,
            base_url: gateway.base_url,
            username: gateway.username,
            password,
            timeout: Duration::from_secs(gateway.timeout_secs),
        },
        service: ServiceConfig {
            write_retry: RetryPolicy {
                max_attempts: orchestrator.max_write_attempts,
                base_delay: Duration::from_millis(orchestrator.retry_base_delay_ms),
                max_delay: Duration::from_millis(orchestrator.retry_max_delay_ms),
            },
            post_commit_timeout: Duration::from_secs(orchestrator.post_commit_timeout_secs),
            max_page_size: orchestrator.max_page_size,
            health_timeout: Duration::from_secs(orchestrator.health_timeout_secs),
        },
        reconciler: reconciler.enabled.then(|| ReconcilerConfig {
            interval: Duration::from_secs(reconciler.interval_secs),
            batch_size: reconciler.batch_size,
            min_age: Duration::from_secs(reconciler.min_age_secs),
            deposit_window: Duration::from_secs(reconciler.deposit_window_secs),
        }),
    })
}

/// Get the database URL from the environment.
pub fn get_database_url() -> Result<String, ConfigError> {
    std::env::var(DATABASE_URL_ENV).map_err(|_| ConfigError::MissingDatabaseUrl)
}
