//! Data Relay Module
//!
//! Accepts client connections and relays their bytes to the upstream.

pub mod copy;
pub mod error;
pub mod listener;
pub mod session;

pub use copy::{CopyOutcome, Direction};
pub use error::RelayError;
pub use listener::{Acceptor, RelayServer};
pub use session::{RelaySession, SessionSummary};
