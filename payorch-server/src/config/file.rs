//! TOML file configuration structures.
//!
//! These structs directly map to the `payorch-config.toml` file format.

use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use url::Url;

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub reconciler: ReconcilerConfig,
}

/// Server configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The address and port to listen on (e.g., "0.0.0.0:8080").
    #[serde(default = "default_listen_addr")]
    pub listen: SocketAddr,
    /// Deadline applied to every API request.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen_addr(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8080))
}

fn default_request_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
        }
    }
}

fn default_max_connections() -> u32 {
    10
}

/// Merchant API credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Broker name stored with every payment.
    #[serde(default = "default_gateway_name")]
    pub name: String,
    pub base_url: Url,
    pub username: String,
    /// May be left out and supplied through `PAYORCH_GATEWAY_PASSWORD`.
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_gateway_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_gateway_name() -> String {
    "BEREKE".to_string()
}

fn default_gateway_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default = "default_max_write_attempts")]
    pub max_write_attempts: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
    #[serde(default = "default_post_commit_timeout_secs")]
    pub post_commit_timeout_secs: u64,
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u32,
    #[serde(default = "default_health_timeout_secs")]
    pub health_timeout_secs: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_write_attempts: default_max_write_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            post_commit_timeout_secs: default_post_commit_timeout_secs(),
            max_page_size: default_max_page_size(),
            health_timeout_secs: default_health_timeout_secs(),
        }
    }
}

fn default_max_write_attempts() -> u32 {
    5
}

fn default_retry_base_delay_ms() -> u64 {
    100
}

fn default_retry_max_delay_ms() -> u64 {
    5_000
}

fn default_post_commit_timeout_secs() -> u64 {
    30
}

fn default_max_page_size() -> u32 {
    100
}

fn default_health_timeout_secs() -> u64 {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,
    #[serde(default = "default_min_age_secs")]
    pub min_age_secs: u64,
    #[serde(default = "default_deposit_window_secs")]
    pub deposit_window_secs: u64,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: default_interval_secs(),
            batch_size: default_batch_size(),
            min_age_secs: default_min_age_secs(),
            deposit_window_secs: default_deposit_window_secs(),
        }
    }
}

fn default_interval_secs() -> u64 {
    60
}

fn default_batch_size() -> u64 {
    100
}

fn default_min_age_secs() -> u64 {
    900
}

fn default_deposit_window_secs() -> u64 {
    7 * 24 * 60 * 60
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_parsing() {
        let toml_str = r#"
[server]
listen = "127.0.0.1:3000"

[gateway]
base_url = "https://ecom.bank.test/payment/rest/"
username = "shop-api"
password = "hunter2"

[reconciler]
enabled = true
interval_secs = 30
"#;
        let config: FileConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.listen.port(), 3000);
        assert_eq!(config.server.request_timeout_secs, 30);
        assert_eq!(config.gateway.name, "BEREKE");
        assert_eq!(config.gateway.password.as_deref(), Some("hunter2"));
        assert_eq!(config.orchestrator.max_write_attempts, 5);
        assert_eq!(config.orchestrator.max_page_size, 100);
        assert!(config.reconciler.enabled);
        assert_eq!(config.reconciler.interval_secs, 30);
        assert_eq!(config.reconciler.min_age_secs, 900);
        assert_eq!(config.reconciler.deposit_window_secs, 604_800);
        assert_eq!(config.database.max_connections, 10);
    }

    #[test]
    fn test_gateway_section_is_required() {
        let toml_str = r#"
[server]
listen = "127.0.0.1:3000"
"#;
        assert!(toml::from_str::<FileConfig>(toml_str).is_err());
    }
}
