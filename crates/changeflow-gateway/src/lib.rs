//! # Changeflow Gateway
//!
//! HTTP API over the scheduling engine: schedule, cancel, inspect, and
//! health-check pending changes.

pub mod routes;
pub mod server;

pub use server::{build_router, run, AppState};
