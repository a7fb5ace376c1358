//! tcprelay Library
//!
//! Transparent TCP relay: every accepted connection is paired with a fresh
//! connection to a fixed upstream and bytes are copied in both directions
//! until either side goes away.

pub mod config;
pub mod relay;
pub mod shutdown;

pub use config::Config;
pub use relay::{RelayError, RelayServer, SessionSummary};

/// Common error type for configuration and startup
pub type Result<T> = anyhow::Result<T>;
