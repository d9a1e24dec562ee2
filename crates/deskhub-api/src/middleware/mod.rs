//! # Middleware Stack
//!
//! Tower middleware for the API layer:
//! - [`tracing_layer`]: request/response tracing with `TraceLayer`.
//! - [`metrics`]: Prometheus request metrics and domain gauges.
//! - [`rate_limit`]: fixed-window rate limiting per token or client address.

pub mod metrics;
pub mod rate_limit;
pub mod tracing_layer;
