//! Prometheus metric families for the runtime core

pub mod metrics;

pub use metrics::MetricsRegistry;
