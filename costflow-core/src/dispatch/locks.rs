//! Per-entity serialisation

use crate::core::{OrderId, ProductId, TenantId};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKey {
    Product(TenantId, ProductId),
    Order(TenantId, OrderId),
}

/// One mutex per entity, created on first use
///
/// Two units touching the same product (or order) run one after the other;
/// different entities proceed in parallel. Callers never hold two locks at
/// once, so lock ordering cannot deadlock.
#[derive(Default)]
pub struct EntityLocks {
    locks: DashMap<EntityKey, Arc<Mutex<()>>>,
}

impl EntityLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lock<T>(&self, key: EntityKey, f: impl FnOnce() -> T) -> T {
        // Clone the Arc so the DashMap shard is released before we block
        let lock = self.locks.entry(key).or_default().clone();
        let _guard = lock.lock();
        f()
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_same_key_is_serialised() {
        let locks = Arc::new(EntityLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));
        let key = EntityKey::Product(TenantId::new(1), ProductId::new(1));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let (locks, inside, max_inside) = (locks.clone(), inside.clone(), max_inside.clone());
                thread::spawn(move || {
                    locks.with_lock(key, || {
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_inside.fetch_max(now, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(5));
                        inside.fetch_sub(1, Ordering::SeqCst);
                    })
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert_eq!(locks.len(), 1);
    }

    #[test]
    fn test_keys_are_tenant_scoped() {
        let locks = EntityLocks::new();
        locks.with_lock(EntityKey::Order(TenantId::new(1), OrderId::new(1)), || ());
        locks.with_lock(EntityKey::Order(TenantId::new(2), OrderId::new(1)), || ());
        assert_eq!(locks.len(), 2);
    }
}
