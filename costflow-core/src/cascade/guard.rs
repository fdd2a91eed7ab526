//! Per-chain cycle guard

use crate::core::{ProductId, TenantId};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_CHAIN_ID: AtomicU64 = AtomicU64::new(1);

/// Visited set of one propagation chain
///
/// Owned by the worker running the chain and handed down by `&mut`. Never
/// shared between chains or tenants; dropping it ends the chain.
#[derive(Debug)]
pub struct PropagationContext {
    tenant: TenantId,
    chain_id: u64,
    visited: HashSet<ProductId>,
}

impl PropagationContext {
    pub fn new(tenant: TenantId) -> Self {
        Self {
            tenant,
            chain_id: NEXT_CHAIN_ID.fetch_add(1, Ordering::Relaxed),
            visited: HashSet::new(),
        }
    }

    pub fn tenant(&self) -> TenantId {
        self.tenant
    }

    /// Process-unique id used to correlate log lines of one chain
    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Mark `product` as processed in this chain
    ///
    /// Returns false when it was already visited (a recipe cycle); the
    /// caller must skip it.
    pub fn visit(&mut self, product: ProductId) -> bool {
        self.visited.insert(product)
    }

    pub fn contains(&self, product: ProductId) -> bool {
        self.visited.contains(&product)
    }

    pub fn len(&self) -> usize {
        self.visited.len()
    }

    pub fn is_empty(&self) -> bool {
        self.visited.is_empty()
    }
}
