// Configuration validation
//
// Validates that required fields are present and values are sensible

use crate::*;
use anyhow::{bail, Result};
use tracing::warn;

pub fn validate_config(config: &RuntimeConfig) -> Result<()> {
    validate_server_config(&config.server)?;
    validate_distributor_config(&config.distributor)?;
    validate_limits_config(&config.limits)?;

    Ok(())
}

fn validate_server_config(config: &ServerConfig) -> Result<()> {
    if config.listen_addr.is_empty() {
        bail!("server.listen_addr must not be empty");
    }

    // Basic validation that it looks like an address
    if !config.listen_addr.contains(':') {
        bail!("server.listen_addr must be in format 'host:port'");
    }

    if !config.auth_enabled && config.default_tenant.is_empty() {
        bail!("server.default_tenant must be set when auth is disabled");
    }

    Ok(())
}

fn validate_distributor_config(config: &DistributorConfig) -> Result<()> {
    if config.max_recv_msg_size == 0 {
        bail!("distributor.max_recv_msg_size must be greater than 0");
    }

    if config.max_recv_msg_size > 1024 * 1024 * 1024 {
        // 1 GB
        warn!(
            max_recv_msg_size = config.max_recv_msg_size,
            "distributor.max_recv_msg_size is very large; may cause memory issues"
        );
    }

    if config.ingestion_rate_strategy == RateLimitStrategy::Global && config.ring.members.is_empty()
    {
        warn!("global ingestion rate strategy configured without ring members");
    }

    Ok(())
}

fn validate_limits_config(config: &LimitsConfig) -> Result<()> {
    validate_tenant_limits("limits.defaults", &config.defaults)?;
    for (tenant, limits) in &config.overrides {
        validate_tenant_limits(&format!("limits.overrides.{}", tenant), limits)?;
    }

    if config.overrides_path.is_some() && config.reload_period_secs == 0 {
        bail!("limits.reload_period_secs must be greater than 0 when overrides_path is set");
    }

    Ok(())
}

fn validate_tenant_limits(scope: &str, limits: &TenantLimitsConfig) -> Result<()> {
    for selector in limits.selectors() {
        let trimmed = selector.trim();
        if !(trimmed.starts_with('{') && trimmed.ends_with('}')) {
            bail!(
                "{}: selector '{}' must be wrapped in braces, e.g. {{app=\"api\"}}",
                scope,
                selector
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_server_config() {
        assert!(validate_server_config(&ServerConfig::default()).is_ok());

        let no_port = ServerConfig {
            listen_addr: "localhost".to_string(),
            ..ServerConfig::default()
        };
        assert!(validate_server_config(&no_port).is_err());

        let anonymous = ServerConfig {
            auth_enabled: false,
            default_tenant: String::new(),
            ..ServerConfig::default()
        };
        assert!(validate_server_config(&anonymous).is_err());
    }

    #[test]
    fn test_validate_distributor_config() {
        let invalid = DistributorConfig {
            max_recv_msg_size: 0,
            ..DistributorConfig::default()
        };
        assert!(validate_distributor_config(&invalid).is_err());
    }

    #[test]
    fn test_validate_selectors() {
        let mut config = LimitsConfig::default();
        config
            .defaults
            .drop_streams
            .push("env=\"dev\"".to_string());
        assert!(validate_limits_config(&config).is_err());

        config.defaults.drop_streams = vec!["{env=\"dev\"}".to_string()];
        assert!(validate_limits_config(&config).is_ok());
    }
}
