//! Resilience helpers
//!
//! - Exponential backoff for unit redelivery
//! - Panic hook for the worker processes

pub mod backoff;
pub mod panic;

pub use backoff::BackoffConfig;
pub use panic::install_panic_handler;
