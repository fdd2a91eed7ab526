//! Reverse-closure and cycle checks over recipe edges

use crate::core::{ProductId, StoreError, TenantId};
use crate::graph::source::CostSource;
use crate::store::CostStore;
use std::collections::{HashSet, VecDeque};

/// Every product that (transitively) consumes `source`, excluding `source` itself
///
/// Breadth-first over "used-as-ingredient-in" edges. Terminates on cyclic
/// recipes because each product is expanded once.
pub fn dependents_closure(
    store: &dyn CostStore,
    tenant: TenantId,
    source: CostSource,
) -> Result<Vec<ProductId>, StoreError> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    let mut queue = VecDeque::from([source]);

    while let Some(current) = queue.pop_front() {
        for owner in store.products_using(tenant, current)? {
            if Some(owner) == source.as_product() || !seen.insert(owner) {
                continue;
            }
            out.push(owner);
            queue.push_back(CostSource::Product(owner));
        }
    }

    Ok(out)
}

/// Whether adding `owner -> source` to a recipe would close a cycle
///
/// A cycle exists when `owner` is `source` itself or when `owner` is already
/// among the products consuming `source`'s product.
pub fn would_create_cycle(
    store: &dyn CostStore,
    tenant: TenantId,
    owner: ProductId,
    source: CostSource,
) -> Result<bool, StoreError> {
    let Some(source_product) = source.as_product() else {
        return Ok(false);
    };
    if source_product == owner {
        return Ok(true);
    }
    // owner -> source closes a loop iff source already (transitively) uses owner
    let users_of_owner = dependents_closure(store, tenant, CostSource::Product(owner))?;
    Ok(users_of_owner.contains(&source_product))
}
