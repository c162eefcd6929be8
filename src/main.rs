use anyhow::{Context, Result};
use clap::Parser;
use logpush_config::{RateLimitStrategy, RuntimeConfig};
use std::path::PathBuf;

/// Multi-tenant log push endpoint
#[derive(Parser)]
#[command(name = "logpush")]
#[command(version)]
#[command(about = "Multi-tenant log push endpoint", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// HTTP listen port (overrides config file)
    #[arg(short, long, value_name = "PORT")]
    port: Option<u16>,

    /// Log level: trace, debug, info, warn, error
    #[arg(short = 'v', long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Attribute every request to the default tenant instead of reading X-Scope-OrgID
    #[arg(long)]
    auth_disabled: bool,

    /// Ingestion rate strategy: local or global
    #[arg(long, value_name = "STRATEGY")]
    ingestion_rate_strategy: Option<RateLimitStrategy>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?
        .block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> Result<()> {
    let mut config = if let Some(config_path) = &cli.config {
        RuntimeConfig::load_from_path(config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()))?
    } else {
        RuntimeConfig::load().context("Failed to load configuration")?
    };

    // CLI flags take priority over every other source
    apply_cli_overrides(&mut config, &cli);

    logpush::init_tracing(&config);
    display_startup_info(&config);

    logpush::run_with_config(config).await
}

fn apply_cli_overrides(config: &mut RuntimeConfig, cli: &Cli) {
    if let Some(port) = cli.port {
        config.server.listen_addr = format!("0.0.0.0:{}", port);
    }

    if let Some(level) = &cli.log_level {
        config.server.log_level = level.clone();
    }

    if cli.auth_disabled {
        config.server.auth_enabled = false;
    }

    if let Some(strategy) = cli.ingestion_rate_strategy {
        config.distributor.ingestion_rate_strategy = strategy;
    }
}

fn display_startup_info(config: &RuntimeConfig) {
    use tracing::info;

    info!("╭─────────────────────────────────────────────────");
    info!("│ logpush v{}", env!("CARGO_PKG_VERSION"));
    info!("├─────────────────────────────────────────────────");
    info!("│ Listen address: http://{}", config.server.listen_addr);
    info!("│ Log level: {}", config.server.log_level);
    if config.server.auth_enabled {
        info!("│ Tenant: from X-Scope-OrgID header");
    } else {
        info!("│ Tenant: {} (auth disabled)", config.server.default_tenant);
    }
    info!(
        "│ Max message size: {} MB",
        config.distributor.max_recv_msg_size / 1_048_576
    );
    info!(
        "│ Rate limit strategy: {}",
        config.distributor.ingestion_rate_strategy
    );
    if let Some(path) = &config.limits.overrides_path {
        info!("│ Overrides file: {}", path);
        info!("│   - Reload every {}s", config.limits.reload_period_secs);
    }
    info!("╰─────────────────────────────────────────────────");
}
