//! Configuration Module
//!
//! Handles configuration loading, validation, and CLI overrides.

pub mod manager;
pub mod types;

pub use manager::{normalize_listen_addr, ConfigManager};
pub use types::*;
