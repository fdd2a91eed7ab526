//! Cost cascade
//!
//! - `guard`: per-chain visited set that breaks recipe cycles
//! - `refresh`: recompute one product and persist it past epsilon
//! - `bus`: fan a cost change out to every dependent product, iteratively

pub mod bus;
pub mod guard;
pub mod refresh;

pub use bus::{CascadeBus, CascadeReport};
pub use guard::PropagationContext;
pub use refresh::{CostOutcome, CostRefresher, Refreshed};
