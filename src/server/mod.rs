//! HTTP surface and process lifecycle
//!
//! - `/healthz`, `/readyz`, `/metrics` on a small axum server
//! - Prometheus registry for experiment operations
//! - Graceful shutdown on SIGTERM/SIGINT

mod health;
pub mod metrics;
pub mod shutdown;

pub use health::{run_health_server, ReadinessState};
pub use metrics::{create_metrics, ServiceMetrics, SharedMetrics};
pub use shutdown::{shutdown_channel, wait_for_signal, ShutdownController, ShutdownSignal};

#[cfg(test)]
#[path = "health_test.rs"]
mod health_tests;

#[cfg(test)]
#[path = "shutdown_test.rs"]
mod shutdown_tests;
