// Initialization utilities for server mode
//
// Logging/tracing setup and construction of the push pipeline from config

use anyhow::{Context, Result};
use logpush_config::{LogFormat, RuntimeConfig};
use logpush_core::{
    Instrumented, JsonPushParser, MetricsDiscardedBytes, OtlpJsonParser, RuntimeLimits, TenantId,
    TenantSource, TracingDistributor, WriteFailuresManager,
};
use std::sync::Arc;
use tracing::info;

use crate::push::PushHandler;
use crate::status::StaticRingStatus;
use crate::AppState;

/// Initialize tracing/logging from RuntimeConfig
pub fn init_tracing(config: &RuntimeConfig) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let env_filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    // Try to set the global subscriber; ignore error if already set (idempotent)
    let _ = match config.server.log_format {
        LogFormat::Json => {
            tracing::subscriber::set_global_default(registry.with(fmt::layer().json()))
        }
        LogFormat::Text => tracing::subscriber::set_global_default(registry.with(fmt::layer())),
    };
}

/// Build the shared state and the limits handle used for reloads
pub(crate) fn init_state(config: &RuntimeConfig) -> Result<(AppState, Arc<RuntimeLimits>)> {
    let limits = Arc::new(
        RuntimeLimits::from_config(&config.limits).context("Failed to load tenant limits")?,
    );

    let tenant_source = if config.server.auth_enabled {
        TenantSource::Header
    } else {
        let tenant = TenantId::new(&config.server.default_tenant)
            .context("Invalid server.default_tenant")?;
        info!(tenant = %tenant, "Authentication disabled, using default tenant");
        TenantSource::Fixed(tenant)
    };

    let write_failures =
        WriteFailuresManager::new(&config.write_failures, Arc::clone(&limits) as _);

    let push = PushHandler {
        tenant_source,
        max_recv_msg_size: config.distributor.max_recv_msg_size,
        limits: Arc::clone(&limits) as _,
        tenant_configs: Arc::clone(&limits) as _,
        parser_wrapper: Some(Arc::new(Instrumented)),
        distributor: Arc::new(TracingDistributor),
        write_failures: Arc::new(write_failures),
        discarded: Arc::new(MetricsDiscardedBytes),
    };

    let state = AppState {
        push: Arc::new(push),
        native_parser: Arc::new(JsonPushParser),
        otlp_parser: Arc::new(OtlpJsonParser),
        ring: Arc::new(StaticRingStatus::from_config(&config.distributor.ring)),
        rate_strategy: config.distributor.ingestion_rate_strategy,
    };

    Ok((state, limits))
}
