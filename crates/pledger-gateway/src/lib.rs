//! # Pledger Gateway
//!
//! HTTP surface for the external periodic trigger. The scheduler core is
//! clock-agnostic; whatever cron-like system the deployment uses simply
//! POSTs to `/api/v1/tick` (and `/api/v1/sweep`) once an hour.

pub mod routes;
pub mod server;

pub use server::{AppState, build_router, start};
