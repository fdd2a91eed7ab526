//! Error types for the recalculation engine
//!
//! Only persistence-level failures are errors. Missing references and
//! recipe cycles are absorbed where they occur and logged as warnings.

use crate::core::types::{OrderId, ProductId, TenantId};
use thiserror::Error;

/// Failures reported by a [`CostStore`](crate::store::CostStore)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// A write targeted an entity that does not exist in the tenant
    #[error("{entity} {id} not found in {tenant}")]
    NotFound {
        tenant: TenantId,
        entity: &'static str,
        id: u64,
    },

    /// Backend could not be reached or the transaction was aborted
    #[error("store unavailable: {reason}")]
    Unavailable { reason: String },

    /// Concurrent modification detected while committing
    #[error("write conflict on {entity} {id}")]
    Conflict { entity: &'static str, id: u64 },
}

/// Failures of one recalculation unit
///
/// Any of these aborts the unit; the queue decides about redelivery.
#[derive(Debug, Error)]
pub enum RecalcError {
    #[error("store failure: {0}")]
    Store(#[from] StoreError),

    #[error("unknown recalculation mode '{0}', must be 'product' or 'order'")]
    UnknownMode(String),

    #[error("failed to serialize cost breakdown for {order}: {source}")]
    Serialization {
        order: OrderId,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to enqueue follow-up work for {product}: {source}")]
    Enqueue {
        product: ProductId,
        #[source]
        source: DispatchError,
    },

    #[error("failed to enqueue recalculation: {0}")]
    Dispatch(#[from] DispatchError),
}

/// Failures of the queue boundary
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The queue no longer accepts work (pool shut down)
    #[error("recalculation queue is closed")]
    Closed,
}
