//! Configuration Manager

use super::Config;
use crate::Result;
use anyhow::{bail, Context};
use std::path::Path;
use std::time::Duration;

const MIN_BUFFER_SIZE: usize = 512;
const MAX_BUFFER_SIZE: usize = 1024 * 1024;
const MAX_CONNECT_TIMEOUT: Duration = Duration::from_secs(3600);

/// Manages configuration loading and validation
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration from file
    pub fn load_from_file(path: &Path) -> Result<Config> {
        if path.exists() {
            tracing::info!("Loading configuration from: {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;

            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

            config
                .validate()
                .with_context(|| "Configuration validation failed")?;

            tracing::info!("Configuration loaded and validated successfully");
            Ok(config)
        } else {
            tracing::warn!(
                "Configuration file not found at {}, using defaults",
                path.display()
            );
            let config = Config::default();
            config.validate()?;
            Ok(config)
        }
    }

    /// Load configuration from environment variables
    pub fn load_from_env() -> Result<Config> {
        let mut config = Config::default();

        if let Ok(listen_addr) = std::env::var("TCPRELAY_LISTEN_ADDR") {
            config.relay.listen_addr = listen_addr;
        }

        if let Ok(upstream_addr) = std::env::var("TCPRELAY_UPSTREAM_ADDR") {
            config.relay.upstream_addr = upstream_addr;
        }

        if let Ok(flag) = std::env::var("TCPRELAY_USE_PROXY_PROTOCOL") {
            config.relay.use_proxy_protocol = flag
                .parse::<bool>()
                .with_context(|| format!("Invalid TCPRELAY_USE_PROXY_PROTOCOL: {}", flag))?;
        }

        if let Ok(timeout) = std::env::var("TCPRELAY_CONNECT_TIMEOUT") {
            config.relay.connect_timeout = humantime::parse_duration(&timeout)
                .with_context(|| format!("Invalid TCPRELAY_CONNECT_TIMEOUT: {}", timeout))?;
        }

        if let Ok(buffer_size) = std::env::var("TCPRELAY_BUFFER_SIZE") {
            config.relay.buffer_size = buffer_size
                .parse::<usize>()
                .with_context(|| format!("Invalid TCPRELAY_BUFFER_SIZE: {}", buffer_size))?;
        }

        config.validate()?;
        Ok(config)
    }
}

/// Expand the `:port` shorthand to an all-interfaces bind address.
pub fn normalize_listen_addr(addr: &str) -> String {
    let addr = addr.trim();
    if addr.starts_with(':') {
        format!("0.0.0.0{}", addr)
    } else {
        addr.to_string()
    }
}

/// Split `host:port`, accepting bracketed IPv6 hosts.
fn split_host_port(addr: &str) -> Result<(&str, u16)> {
    let (host, port) = addr
        .rsplit_once(':')
        .with_context(|| format!("'{}' is missing a port (expected host:port)", addr))?;

    let port = port
        .parse::<u16>()
        .with_context(|| format!("'{}' has an invalid port", addr))?;

    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        bail!("'{}' is missing a host (expected host:port)", addr);
    }

    Ok((host, port))
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.validate_relay_config()
            .with_context(|| "Relay configuration validation failed")?;

        Ok(())
    }

    fn validate_relay_config(&self) -> Result<()> {
        let relay = &self.relay;

        split_host_port(&normalize_listen_addr(&relay.listen_addr))
            .context("relay.listen_addr is invalid")?;

        let (_, upstream_port) =
            split_host_port(&relay.upstream_addr).context("relay.upstream_addr is invalid")?;
        if upstream_port == 0 {
            bail!("relay.upstream_addr port must be greater than 0");
        }

        if relay.connect_timeout.is_zero() {
            bail!("connect_timeout must be greater than 0");
        }

        if relay.connect_timeout > MAX_CONNECT_TIMEOUT {
            bail!("connect_timeout cannot exceed 1 hour");
        }

        if relay.buffer_size < MIN_BUFFER_SIZE {
            bail!("buffer_size must be at least {} bytes", MIN_BUFFER_SIZE);
        }

        if relay.buffer_size > MAX_BUFFER_SIZE {
            bail!("buffer_size cannot exceed 1MB");
        }

        Ok(())
    }

    /// Merge with CLI arguments
    pub fn merge_with_cli_args(
        &mut self,
        listen: Option<&str>,
        upstream: Option<&str>,
        use_proxy_protocol: bool,
        connect_timeout: Option<u64>,
        buffer_size: Option<usize>,
    ) {
        if let Some(listen) = listen {
            self.relay.listen_addr = listen.to_string();
            tracing::info!("CLI override: listen address set to {}", listen);
        }

        if let Some(upstream) = upstream {
            self.relay.upstream_addr = upstream.to_string();
            tracing::info!("CLI override: upstream address set to {}", upstream);
        }

        // A flag can only switch the option on; absence keeps the file value.
        if use_proxy_protocol {
            self.relay.use_proxy_protocol = true;
            tracing::info!("CLI override: proxy protocol flag enabled");
        }

        if let Some(timeout_secs) = connect_timeout {
            self.relay.connect_timeout = Duration::from_secs(timeout_secs);
            tracing::info!("CLI override: connect timeout set to {}s", timeout_secs);
        }

        if let Some(buffer_size) = buffer_size {
            self.relay.buffer_size = buffer_size;
            tracing::info!("CLI override: buffer size set to {} bytes", buffer_size);
        }
    }
}
