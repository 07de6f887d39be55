//! # Pledger Core
//!
//! Shared configuration and error types for the Pledger workspace.
//! No scheduler logic lives here — only the config file format and the
//! error taxonomy every other crate builds on.

pub mod config;
pub mod error;

pub use config::PledgerConfig;
pub use error::{PledgerError, Result};
