//! Prometheus metrics and structured logging for Lumen wallet synchronization.
//!
//! - Prometheus metrics for the push socket, portal calls and fan-out
//! - Structured logging with tracing (JSON in production)

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::Metrics;
