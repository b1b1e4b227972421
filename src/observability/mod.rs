//! Observability: structured logging and metrics.
//!
//! - Structured logging with configurable formats (pretty, compact, JSON)
//! - Counters for authentication attempts and metadata parsing

pub mod metrics;
mod tracing_init;

pub use tracing_init::*;
