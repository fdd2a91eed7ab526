//! Recalculation dispatch
//!
//! Units of work ([`RecalcJob`]), the queue contract, per-entity locks, the
//! executor for one unit, and the worker pool that runs units
//! asynchronously with at-least-once delivery.

pub mod job;
pub mod locks;
pub mod pool;
pub mod queue;
pub mod recalculator;

pub use job::{RecalcJob, RecalcMode};
pub use locks::{EntityKey, EntityLocks};
pub use pool::{DeadLetter, PoolConfig, PoolHandle, WorkerPool};
pub use queue::{RecalcQueue, RecordingQueue};
pub use recalculator::{Recalculator, UnitOutcome};
