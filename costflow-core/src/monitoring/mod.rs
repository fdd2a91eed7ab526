//! Monitoring and observability
//!
//! Prometheus metric families for recalculation throughput, cascade activity
//! and queue health. Exposition is left to the embedding service.

pub mod metrics;

pub use metrics::EngineMetrics;
