use crate::{LogFormat, RateLimitStrategy, RuntimeConfig};
use anyhow::{anyhow, Context, Result};

pub const ENV_PREFIX: &str = "LOGPUSH_";

/// Abstraction over environment-variable lookups so tests can supply
/// their own source of overrides.
pub trait EnvSource {
    /// Look up `key` with the `LOGPUSH_` prefix applied
    fn get(&self, key: &str) -> Option<String>;
}

/// Apply environment-variable overrides (highest priority) to the runtime config.
pub fn apply_env_overrides<E: EnvSource>(config: &mut RuntimeConfig, env: &E) -> Result<()> {
    // Server configuration
    if let Some(addr) = env.get("LISTEN_ADDR") {
        config.server.listen_addr = addr;
    }
    if let Some(level) = env.get("LOG_LEVEL") {
        config.server.log_level = level;
    }
    if let Some(format) = env.get("LOG_FORMAT") {
        config.server.log_format = match format.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Text,
        };
    }
    if let Some(val) = get_env_bool(env, "AUTH_ENABLED")? {
        config.server.auth_enabled = val;
    }
    if let Some(tenant) = env.get("DEFAULT_TENANT") {
        config.server.default_tenant = tenant;
    }

    // Distributor configuration
    if let Some(val) = get_env_usize(env, "MAX_RECV_MSG_SIZE")? {
        config.distributor.max_recv_msg_size = val;
    }
    if let Some(strategy) = env.get("INGESTION_RATE_STRATEGY") {
        config.distributor.ingestion_rate_strategy = strategy
            .parse::<RateLimitStrategy>()
            .context("Invalid LOGPUSH_INGESTION_RATE_STRATEGY value")?;
    }
    if let Some(id) = env.get("RING_INSTANCE_ID") {
        config.distributor.ring.instance_id = id;
    }
    if let Some(members) = env.get("RING_MEMBERS") {
        config.distributor.ring.members = members
            .split(',')
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(String::from)
            .collect();
    }

    // Limits
    if let Some(path) = env.get("OVERRIDES_PATH") {
        config.limits.overrides_path = if path.is_empty() { None } else { Some(path) };
    }
    if let Some(val) = get_env_u64(env, "OVERRIDES_RELOAD_PERIOD_SECS")? {
        config.limits.reload_period_secs = val;
    }

    // Write failures
    if let Some(val) = get_env_u64(env, "WRITE_FAILURES_RATE_BYTES")? {
        config.write_failures.rate_bytes_per_sec = val;
    }
    if let Some(val) = get_env_u64(env, "WRITE_FAILURES_BURST_BYTES")? {
        config.write_failures.burst_bytes = val;
    }

    Ok(())
}

fn get_env_usize<E: EnvSource>(env: &E, key: &str) -> Result<Option<usize>> {
    env.get(key)
        .map(|val| {
            val.parse::<usize>()
                .map_err(|e| anyhow!("Failed to parse {}{}: {}", ENV_PREFIX, key, e))
        })
        .transpose()
}

fn get_env_u64<E: EnvSource>(env: &E, key: &str) -> Result<Option<u64>> {
    env.get(key)
        .map(|val| {
            val.parse::<u64>()
                .map_err(|e| anyhow!("Failed to parse {}{}: {}", ENV_PREFIX, key, e))
        })
        .transpose()
}

fn get_env_bool<E: EnvSource>(env: &E, key: &str) -> Result<Option<bool>> {
    env.get(key)
        .map(|val| {
            val.parse::<bool>().map_err(|e| {
                anyhow!(
                    "Failed to parse {}{} (expected bool): {}",
                    ENV_PREFIX,
                    key,
                    e
                )
            })
        })
        .transpose()
}
