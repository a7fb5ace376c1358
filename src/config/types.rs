//! Configuration Types

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub relay: RelayConfig,
}

/// Relay configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Address the listener binds to, `host:port` or `:port`
    pub listen_addr: String,
    /// Address every session dials
    pub upstream_addr: String,
    /// Accepted for compatibility; the relay does not emit or parse a
    /// PROXY protocol header yet.
    pub use_proxy_protocol: bool,
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Copy buffer size per direction, in bytes
    pub buffer_size: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            upstream_addr: "127.0.0.1:80".to_string(),
            use_proxy_protocol: false,
            connect_timeout: Duration::from_secs(10),
            buffer_size: 8192,
        }
    }
}

impl RelayConfig {
    /// Convenience constructor used by embedders and tests
    pub fn new(listen_addr: impl Into<String>, upstream_addr: impl Into<String>) -> Self {
        Self {
            listen_addr: listen_addr.into(),
            upstream_addr: upstream_addr.into(),
            ..Self::default()
        }
    }
}
