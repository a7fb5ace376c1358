//! tcprelay - Transparent TCP Relay
//!
//! Accepts TCP connections and forwards every byte to a fixed upstream
//! address, logging connection lifecycle and transfer counts.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tcprelay::{config::ConfigManager, shutdown, RelayServer};

/// CLI arguments for tcprelay
#[derive(Parser, Debug)]
#[command(name = "tcprelay")]
#[command(about = "Transparent TCP relay to a fixed upstream")]
#[command(version)]
#[command(long_about = "
Transparent TCP relay to a fixed upstream

Configuration priority (highest to lowest):
1. Command-line arguments
2. Configuration file
3. Environment variables
4. Built-in defaults

Environment variables:
  TCPRELAY_LISTEN_ADDR          - Listen address (e.g., :8080, 127.0.0.1:8080)
  TCPRELAY_UPSTREAM_ADDR        - Upstream address (e.g., 127.0.0.1:80)
  TCPRELAY_USE_PROXY_PROTOCOL   - Proxy protocol flag (true/false)
  TCPRELAY_CONNECT_TIMEOUT      - Upstream connect timeout (e.g., 5s)
  TCPRELAY_BUFFER_SIZE          - Copy buffer size in bytes
")]
pub struct CliArgs {
    /// Configuration file path
    #[arg(
        short,
        long,
        default_value = "tcprelay.toml",
        help = "Path to configuration file"
    )]
    pub config: PathBuf,

    /// Address to listen for connections (overrides config file)
    #[arg(short, long, help = "Address to listen for connections")]
    pub listen: Option<String>,

    /// Upstream server address (overrides config file)
    #[arg(short, long, visible_alias = "upstream", help = "Proxy server address")]
    pub proxy: Option<String>,

    /// Enable Proxy Protocol v2 (accepted, not implemented)
    #[arg(short, long, help = "Enable Proxy Protocol v2")]
    pub use_proxy_protocol: bool,

    /// Upstream connect timeout in seconds
    #[arg(long, help = "Upstream connect timeout in seconds")]
    pub connect_timeout: Option<u64>,

    /// Buffer size in bytes
    #[arg(long, help = "Copy buffer size in bytes")]
    pub buffer_size: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", help = "Log level")]
    pub log_level: String,

    /// Enable verbose logging (sets log level to debug)
    #[arg(short, long, help = "Enable verbose logging")]
    pub verbose: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration and exit")]
    pub validate_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    init_tracing(&args)?;

    info!("Starting tcprelay v{}", env!("CARGO_PKG_VERSION"));

    let mut config = if args.config.exists() {
        ConfigManager::load_from_file(&args.config)?
    } else {
        info!("Config file not found, checking environment variables");
        ConfigManager::load_from_env()?
    };

    config.merge_with_cli_args(
        args.listen.as_deref(),
        args.proxy.as_deref(),
        args.use_proxy_protocol,
        args.connect_timeout,
        args.buffer_size,
    );

    config
        .validate()
        .context("Final configuration validation failed")?;

    if args.validate_config {
        info!("Configuration is valid");
        info!("  Listen address: {}", config.relay.listen_addr);
        info!("  Upstream address: {}", config.relay.upstream_addr);
        info!("  Proxy protocol: {}", config.relay.use_proxy_protocol);
        info!("  Connect timeout: {:?}", config.relay.connect_timeout);
        info!("  Buffer size: {} bytes", config.relay.buffer_size);
        return Ok(());
    }

    let listen_addr = config.relay.listen_addr.clone();
    let server = RelayServer::bind(config.relay)
        .await
        .with_context(|| format!("Failed to start listening on {}", listen_addr))?;

    tokio::select! {
        _ = server.serve() => {}
        result = shutdown::wait_for_signal() => {
            result.context("Failed to install signal handlers")?;
        }
    }

    info!("Relay stopped");

    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(args: &CliArgs) -> Result<()> {
    let log_level = if args.verbose {
        "debug"
    } else {
        &args.log_level
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(true)
                .with_level(true),
        )
        .with(env_filter)
        .init();

    Ok(())
}
