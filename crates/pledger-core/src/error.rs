//! Pledger error taxonomy.
//!
//! Only truly fatal conditions become errors. Per-recipient delivery
//! failures and duplicate-key outcomes are domain results, not errors —
//! see the scheduler crate.

use thiserror::Error;

/// Errors shared across the Pledger workspace.
#[derive(Debug, Error)]
pub enum PledgerError {
    /// Configuration could not be loaded or parsed. Fatal for a tick.
    #[error("Config error: {0}")]
    Config(String),

    /// Database open/query/write failure.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Delivery transport could not be constructed. Individual send
    /// failures are reported per recipient, not through this type.
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PledgerError>;
