// logpush-config - Runtime configuration for the push endpoint
//
// Supports configuration from multiple sources:
// 1. Environment variables (highest priority)
// 2. Config file path from LOGPUSH_CONFIG env var
// 3. Config file contents from LOGPUSH_CONFIG_CONTENT env var
// 4. Default config file locations (./config.toml, ./.logpush.toml)
// 5. Built-in defaults (lowest priority)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

mod env_overrides;
mod limits;
mod sources;
mod validation;

pub use env_overrides::{EnvSource, ENV_PREFIX};
pub use limits::{
    load_overrides_file, OverridesFile, PolicyStreamRule, RetentionStreamRule, TenantLimitsConfig,
};

/// Main runtime configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub distributor: DistributorConfig,

    #[serde(default)]
    pub limits: LimitsConfig,

    #[serde(default)]
    pub write_failures: WriteFailuresConfig,
}

/// Server-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub log_level: String,
    pub log_format: LogFormat,
    /// When false every request is attributed to `default_tenant`.
    pub auth_enabled: bool,
    pub default_tenant: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:3100".to_string(),
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            auth_enabled: true,
            default_tenant: "fake".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

/// Push handling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DistributorConfig {
    /// Upper bound on both the raw and the decompressed request body.
    pub max_recv_msg_size: usize,
    pub ingestion_rate_strategy: RateLimitStrategy,
    pub ring: RingConfig,
}

impl Default for DistributorConfig {
    fn default() -> Self {
        Self {
            max_recv_msg_size: 100 << 20,
            ingestion_rate_strategy: RateLimitStrategy::Local,
            ring: RingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateLimitStrategy {
    Local,
    Global,
}

impl std::fmt::Display for RateLimitStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RateLimitStrategy::Local => write!(f, "local"),
            RateLimitStrategy::Global => write!(f, "global"),
        }
    }
}

impl std::str::FromStr for RateLimitStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "local" => Ok(RateLimitStrategy::Local),
            "global" => Ok(RateLimitStrategy::Global),
            _ => anyhow::bail!(
                "Unsupported ingestion rate strategy: {}. Supported: local, global",
                s
            ),
        }
    }
}

/// Distributor ring membership as seen by this instance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RingConfig {
    pub instance_id: String,
    pub members: Vec<String>,
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            instance_id: "distributor-0".to_string(),
            members: Vec::new(),
        }
    }
}

/// Tenant limits: defaults, inline overrides and an optional reloadable file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub defaults: TenantLimitsConfig,
    pub overrides: BTreeMap<String, TenantLimitsConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overrides_path: Option<String>,
    pub reload_period_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            defaults: TenantLimitsConfig::default(),
            overrides: BTreeMap::new(),
            overrides_path: None,
            reload_period_secs: 10,
        }
    }
}

impl LimitsConfig {
    pub fn reload_period(&self) -> Duration {
        Duration::from_secs(self.reload_period_secs)
    }
}

/// Write-failure audit log throttling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WriteFailuresConfig {
    pub rate_bytes_per_sec: u64,
    pub burst_bytes: u64,
    pub add_insights_label: bool,
}

impl Default for WriteFailuresConfig {
    fn default() -> Self {
        Self {
            rate_bytes_per_sec: 1024,
            burst_bytes: 10 * 1024,
            add_insights_label: false,
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from all sources with priority
    pub fn load() -> Result<Self> {
        sources::load_config()
    }

    /// Load configuration from an explicit file (for the CLI --config flag)
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        sources::load_from_file_path(path)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_strategy_from_str() {
        assert_eq!(
            "local".parse::<RateLimitStrategy>().unwrap(),
            RateLimitStrategy::Local
        );
        assert_eq!(
            "GLOBAL".parse::<RateLimitStrategy>().unwrap(),
            RateLimitStrategy::Global
        );
        assert!("shared".parse::<RateLimitStrategy>().is_err());
    }

    #[test]
    fn test_default_configs() {
        let config = RuntimeConfig::default();
        assert_eq!(config.server.listen_addr, "0.0.0.0:3100");
        assert_eq!(config.server.log_format, LogFormat::Text);
        assert!(config.server.auth_enabled);
        assert_eq!(config.distributor.max_recv_msg_size, 100 * 1024 * 1024);
        assert_eq!(
            config.distributor.ingestion_rate_strategy,
            RateLimitStrategy::Local
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: RuntimeConfig = toml::from_str(
            r#"
            [distributor]
            ingestion_rate_strategy = "global"
            max_recv_msg_size = 1048576

            [limits.defaults]
            retention_period_hours = 744

            [limits.overrides.team-a]
            log_push_request = true
            "#,
        )
        .unwrap();

        assert_eq!(
            config.distributor.ingestion_rate_strategy,
            RateLimitStrategy::Global
        );
        assert_eq!(config.distributor.max_recv_msg_size, 1 << 20);
        assert_eq!(config.limits.defaults.retention_period_hours, 744);
        assert!(config.limits.overrides["team-a"].log_push_request);
        assert_eq!(config.server.listen_addr, "0.0.0.0:3100");
    }
}
