//! Costflow Core - cost propagation and recalculation engine
//!
//! Keeps derived costs consistent across a multi-tenant restaurant cost
//! graph. When an ingredient price, a recipe, a tax rate or a fee rule
//! changes, the engine recomputes the unit cost of every dependent internal
//! product (cascading through products used as ingredients of other
//! products) and the financials (CMV, taxes, fees, net revenue) of every
//! affected order.
//!
//! ## Architecture
//! - **Change detector**: mutation hooks report which fields changed; only
//!   cost-relevant edits enqueue work
//! - **Worker pool**: recalculation units run on crossbeam-fed threads with
//!   at-least-once delivery and exponential redelivery backoff
//! - **Cascade bus**: a changed product walks its dependents breadth-first,
//!   guarded by a per-chain visited set so recipe cycles terminate
//! - **Epsilon gating**: unit-cost changes below 0.01 are neither persisted
//!   nor propagated
//!
//! ## Modules
//! - `core`: ids, enums, money helpers, errors
//! - `graph`: entities, cost sources, change sets, traversal
//! - `store`: `CostStore` repository trait and the in-memory store
//! - `calculator`: product CMV, order line cost, order totals
//! - `cascade`: propagation context, cost refresher, cascade bus
//! - `detector`: change detector entry points
//! - `dispatch`: jobs, queue, recalculator, worker pool
//! - `events`: outbound domain events and sinks
//! - `engine`: ready-to-run wiring of all of the above

pub mod calculator;
pub mod cascade;
pub mod config;
pub mod core;
pub mod detector;
pub mod dispatch;
pub mod engine;
pub mod events;
pub mod graph;
pub mod monitoring;
pub mod resilience;
pub mod store;
pub mod utils;

// Fixture builders shared by unit tests, integration tests and benches
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use crate::core::{DispatchError, RecalcError, StoreError, TenantId, DEFAULT_COST_EPSILON};
pub use config::EngineConfig;
pub use detector::ChangeDetector;
pub use dispatch::{RecalcJob, RecalcMode, RecalcQueue, Recalculator, WorkerPool};
pub use engine::CostEngine;
pub use events::{DomainEvent, EventSink, ProductCostChanged};
pub use store::{CostStore, InMemoryStore, Snapshot};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::core::{
        ChangeKind, IngredientId, MappingType, Marketplace, OrderId, OrderItemId, OrderStatus,
        PizzaSize, ProductId, TenantId,
    };
    pub use crate::graph::{
        ChangeSet, CostSource, Ingredient, InternalProduct, Order, OrderItem, OrderItemMapping,
        RecipeComponent,
    };

    pub use crate::detector::ChangeDetector;
    pub use crate::dispatch::{RecalcJob, RecalcQueue, Recalculator, WorkerPool};
    pub use crate::engine::CostEngine;
    pub use crate::events::{DomainEvent, EventSink};
    pub use crate::store::{CostStore, InMemoryStore};

    pub use crate::{DispatchError, RecalcError, StoreError};
}
