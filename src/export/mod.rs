//! Reporting: Prometheus metrics, JSON snapshots and the HTTP endpoint that
//! serves them.

pub mod json;
pub mod metrics;
pub mod server;

pub use json::*;
pub use metrics::*;
pub use server::*;
