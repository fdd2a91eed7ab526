//! In-memory [`CostStore`] backed by `DashMap`
//!
//! Each table is keyed by `(TenantId, id)`. Writes of one row happen under
//! that row's shard lock, so an order's financial block is replaced
//! atomically. The store also supports injected write failures and records
//! which tenants were touched, for tests that exercise rollback and
//! isolation.

use super::{CostStore, Snapshot, StoreResult};
use crate::core::{
    CommissionId, IngredientId, MappingId, Marketplace, OrderId, OrderItemId, PaymentMappingId,
    ProductId, RecipeComponentId, StoreError, TaxCategoryId, TenantId,
};
use crate::graph::{
    CommissionKind, CostCommission, CostSource, Ingredient, InternalProduct, Order,
    OrderFinancials, OrderItem, OrderItemMapping, PaymentMethodMapping, RecipeComponent,
    TaxCategory,
};
use dashmap::DashMap;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

type Table<K, V> = DashMap<(TenantId, K), V>;

#[derive(Default)]
pub struct InMemoryStore {
    ingredients: Table<IngredientId, Ingredient>,
    products: Table<ProductId, InternalProduct>,
    recipe: Table<RecipeComponentId, RecipeComponent>,
    tax_categories: Table<TaxCategoryId, TaxCategory>,
    commissions: Table<CommissionId, CostCommission>,
    payment_mappings: Table<PaymentMappingId, PaymentMethodMapping>,
    orders: Table<OrderId, Order>,
    items: Table<OrderItemId, OrderItem>,
    mappings: Table<MappingId, OrderItemMapping>,
    /// Remaining writes that will fail with `Unavailable`
    failing_writes: AtomicUsize,
    /// Remaining cost saves that will fail, per product
    failing_products: Mutex<HashMap<(TenantId, ProductId), usize>>,
    touched_tenants: Mutex<HashSet<TenantId>>,
}

fn sorted<T: Ord>(values: impl IntoIterator<Item = T>) -> Vec<T> {
    values.into_iter().collect::<BTreeSet<_>>().into_iter().collect()
}

fn get_cloned<K: Eq + Hash + Copy, V: Clone>(table: &Table<K, V>, tenant: TenantId, id: K) -> Option<V> {
    table.get(&(tenant, id)).map(|row| row.value().clone())
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store holding every row of `snapshot`
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        let store = Self::new();
        store.load_snapshot(snapshot);
        store
    }

    pub fn load_snapshot(&self, snapshot: Snapshot) {
        for row in snapshot.ingredients {
            self.upsert_ingredient(row);
        }
        for row in snapshot.products {
            self.upsert_product(row);
        }
        for row in snapshot.recipe {
            self.upsert_component(row);
        }
        for row in snapshot.tax_categories {
            self.upsert_tax_category(row);
        }
        for row in snapshot.commissions {
            self.upsert_commission(row);
        }
        for row in snapshot.payment_mappings {
            self.upsert_payment_mapping(row);
        }
        for row in snapshot.orders {
            self.upsert_order(row);
        }
        for row in snapshot.items {
            self.upsert_item(row);
        }
        for row in snapshot.mappings {
            self.upsert_mapping(row);
        }
    }

    /// Export every row of `tenant`
    pub fn snapshot(&self, tenant: TenantId) -> Snapshot {
        fn rows<K, V: Clone>(table: &Table<K, V>, tenant: TenantId) -> Vec<V>
        where
            K: Eq + Hash + Ord + Copy,
        {
            let mut keyed: Vec<(K, V)> = table
                .iter()
                .filter(|row| row.key().0 == tenant)
                .map(|row| (row.key().1, row.value().clone()))
                .collect();
            keyed.sort_by_key(|(k, _)| *k);
            keyed.into_iter().map(|(_, v)| v).collect()
        }

        Snapshot {
            ingredients: rows(&self.ingredients, tenant),
            products: rows(&self.products, tenant),
            recipe: rows(&self.recipe, tenant),
            tax_categories: rows(&self.tax_categories, tenant),
            commissions: rows(&self.commissions, tenant),
            payment_mappings: rows(&self.payment_mappings, tenant),
            orders: rows(&self.orders, tenant),
            items: rows(&self.items, tenant),
            mappings: rows(&self.mappings, tenant),
        }
    }

    // ===== MUTATION BOUNDARY =====
    //
    // Direct row writes used by hooks, fixtures and the replay tool. They do
    // not trigger recalculation; callers report changes to the detector.

    pub fn upsert_ingredient(&self, row: Ingredient) {
        self.ingredients.insert((row.tenant_id, row.id), row);
    }

    pub fn upsert_product(&self, row: InternalProduct) {
        self.products.insert((row.tenant_id, row.id), row);
    }

    pub fn upsert_component(&self, row: RecipeComponent) {
        self.recipe.insert((row.tenant_id, row.id), row);
    }

    pub fn remove_component(&self, tenant: TenantId, id: RecipeComponentId) -> Option<RecipeComponent> {
        self.recipe.remove(&(tenant, id)).map(|(_, row)| row)
    }

    pub fn upsert_tax_category(&self, row: TaxCategory) {
        self.tax_categories.insert((row.tenant_id, row.id), row);
    }

    pub fn upsert_commission(&self, row: CostCommission) {
        self.commissions.insert((row.tenant_id, row.id), row);
    }

    pub fn upsert_payment_mapping(&self, row: PaymentMethodMapping) {
        self.payment_mappings.insert((row.tenant_id, row.id), row);
    }

    pub fn upsert_order(&self, row: Order) {
        self.orders.insert((row.tenant_id, row.id), row);
    }

    pub fn upsert_item(&self, row: OrderItem) {
        self.items.insert((row.tenant_id, row.id), row);
    }

    pub fn remove_item(&self, tenant: TenantId, id: OrderItemId) -> Option<OrderItem> {
        self.mappings
            .retain(|key, mapping| !(key.0 == tenant && mapping.order_item_id == id));
        self.items.remove(&(tenant, id)).map(|(_, row)| row)
    }

    pub fn upsert_mapping(&self, row: OrderItemMapping) {
        self.mappings.insert((row.tenant_id, row.id), row);
    }

    pub fn remove_mapping(&self, tenant: TenantId, id: MappingId) -> Option<OrderItemMapping> {
        self.mappings.remove(&(tenant, id)).map(|(_, row)| row)
    }

    /// Edit a product row in place; returns the row before and after the edit
    pub fn update_product(
        &self,
        tenant: TenantId,
        id: ProductId,
        edit: impl FnOnce(&mut InternalProduct),
    ) -> Option<(InternalProduct, InternalProduct)> {
        let mut row = self.products.get_mut(&(tenant, id))?;
        let before = row.clone();
        edit(row.value_mut());
        Some((before, row.clone()))
    }

    pub fn update_ingredient(
        &self,
        tenant: TenantId,
        id: IngredientId,
        edit: impl FnOnce(&mut Ingredient),
    ) -> Option<(Ingredient, Ingredient)> {
        let mut row = self.ingredients.get_mut(&(tenant, id))?;
        let before = row.clone();
        edit(row.value_mut());
        Some((before, row.clone()))
    }

    pub fn update_order(
        &self,
        tenant: TenantId,
        id: OrderId,
        edit: impl FnOnce(&mut Order),
    ) -> Option<(Order, Order)> {
        let mut row = self.orders.get_mut(&(tenant, id))?;
        let before = row.clone();
        edit(row.value_mut());
        Some((before, row.clone()))
    }

    pub fn update_component(
        &self,
        tenant: TenantId,
        id: RecipeComponentId,
        edit: impl FnOnce(&mut RecipeComponent),
    ) -> Option<(RecipeComponent, RecipeComponent)> {
        let mut row = self.recipe.get_mut(&(tenant, id))?;
        let before = row.clone();
        edit(row.value_mut());
        Some((before, row.clone()))
    }

    // ===== TEST SUPPORT =====

    /// Make the next `count` writes fail with [`StoreError::Unavailable`]
    pub fn fail_next_writes(&self, count: usize) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    /// Make the next `count` cost saves of one product fail
    pub fn fail_product_saves(&self, tenant: TenantId, product: ProductId, count: usize) {
        self.failing_products.lock().insert((tenant, product), count);
    }

    /// Tenants passed to any [`CostStore`] method so far
    pub fn touched_tenants(&self) -> HashSet<TenantId> {
        self.touched_tenants.lock().clone()
    }

    pub fn clear_touched_tenants(&self) {
        self.touched_tenants.lock().clear();
    }

    fn touch(&self, tenant: TenantId) {
        self.touched_tenants.lock().insert(tenant);
    }

    fn check_write(&self) -> StoreResult<()> {
        let injected = self
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StoreError::Unavailable {
                reason: "injected write failure".to_string(),
            });
        }
        Ok(())
    }

    fn check_product_write(&self, tenant: TenantId, product: ProductId) -> StoreResult<()> {
        let mut failing = self.failing_products.lock();
        match failing.get_mut(&(tenant, product)) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(StoreError::Unavailable {
                    reason: format!("injected write failure for {}", product),
                })
            }
            _ => Ok(()),
        }
    }

    fn item_ids_mapped_to(&self, tenant: TenantId, product: ProductId) -> Vec<OrderItemId> {
        self.mappings
            .iter()
            .filter(|row| row.key().0 == tenant && row.internal_product_id == product)
            .map(|row| row.order_item_id)
            .collect()
    }
}

impl CostStore for InMemoryStore {
    fn ingredient(&self, tenant: TenantId, id: IngredientId) -> StoreResult<Option<Ingredient>> {
        self.touch(tenant);
        Ok(get_cloned(&self.ingredients, tenant, id))
    }

    fn product(&self, tenant: TenantId, id: ProductId) -> StoreResult<Option<InternalProduct>> {
        self.touch(tenant);
        Ok(get_cloned(&self.products, tenant, id))
    }

    fn recipe(&self, tenant: TenantId, product: ProductId) -> StoreResult<Vec<RecipeComponent>> {
        self.touch(tenant);
        let mut rows: Vec<RecipeComponent> = self
            .recipe
            .iter()
            .filter(|row| row.key().0 == tenant && row.product_id == product)
            .map(|row| row.value().clone())
            .collect();
        rows.sort_by_key(|c| c.id);
        Ok(rows)
    }

    fn products_using(&self, tenant: TenantId, source: CostSource) -> StoreResult<Vec<ProductId>> {
        self.touch(tenant);
        Ok(sorted(
            self.recipe
                .iter()
                .filter(|row| row.key().0 == tenant && row.active && row.source == source)
                .map(|row| row.product_id),
        ))
    }

    fn products_in_tax_category(
        &self,
        tenant: TenantId,
        category: TaxCategoryId,
    ) -> StoreResult<Vec<ProductId>> {
        self.touch(tenant);
        Ok(sorted(
            self.products
                .iter()
                .filter(|row| row.key().0 == tenant && row.tax_category_id == Some(category))
                .map(|row| row.id),
        ))
    }

    fn tax_category(&self, tenant: TenantId, id: TaxCategoryId) -> StoreResult<Option<TaxCategory>> {
        self.touch(tenant);
        Ok(get_cloned(&self.tax_categories, tenant, id))
    }

    fn save_product_cost(
        &self,
        tenant: TenantId,
        id: ProductId,
        unit_cost: Decimal,
    ) -> StoreResult<()> {
        self.touch(tenant);
        self.check_write()?;
        self.check_product_write(tenant, id)?;
        let mut row = self
            .products
            .get_mut(&(tenant, id))
            .ok_or(StoreError::NotFound {
                tenant,
                entity: "product",
                id: id.get(),
            })?;
        row.unit_cost = unit_cost;
        debug!(%tenant, product = %id, %unit_cost, "Product cost saved");
        Ok(())
    }

    fn order(&self, tenant: TenantId, id: OrderId) -> StoreResult<Option<Order>> {
        self.touch(tenant);
        Ok(get_cloned(&self.orders, tenant, id))
    }

    fn order_items(&self, tenant: TenantId, order: OrderId) -> StoreResult<Vec<OrderItem>> {
        self.touch(tenant);
        let mut rows: Vec<OrderItem> = self
            .items
            .iter()
            .filter(|row| row.key().0 == tenant && row.order_id == order)
            .map(|row| row.value().clone())
            .collect();
        rows.sort_by_key(|i| i.id);
        Ok(rows)
    }

    fn order_item(&self, tenant: TenantId, id: OrderItemId) -> StoreResult<Option<OrderItem>> {
        self.touch(tenant);
        Ok(get_cloned(&self.items, tenant, id))
    }

    fn item_mappings(
        &self,
        tenant: TenantId,
        item: OrderItemId,
    ) -> StoreResult<Vec<OrderItemMapping>> {
        self.touch(tenant);
        let mut rows: Vec<OrderItemMapping> = self
            .mappings
            .iter()
            .filter(|row| row.key().0 == tenant && row.order_item_id == item)
            .map(|row| row.value().clone())
            .collect();
        rows.sort_by_key(|m| m.id);
        Ok(rows)
    }

    fn open_orders_referencing_product(
        &self,
        tenant: TenantId,
        product: ProductId,
    ) -> StoreResult<Vec<OrderId>> {
        self.touch(tenant);
        let mapped: HashSet<OrderItemId> =
            self.item_ids_mapped_to(tenant, product).into_iter().collect();
        let is_open = |order: OrderId| {
            self.orders
                .get(&(tenant, order))
                .is_some_and(|row| row.status.is_open())
        };
        Ok(sorted(
            self.items
                .iter()
                .filter(|row| row.key().0 == tenant)
                .filter(|row| mapped.contains(&row.id) || row.legacy_product_id == Some(product))
                .map(|row| row.order_id)
                .filter(|order| is_open(*order)),
        ))
    }

    fn payment_mapping(
        &self,
        tenant: TenantId,
        marketplace: Marketplace,
        external_method: &str,
    ) -> StoreResult<Option<PaymentMethodMapping>> {
        self.touch(tenant);
        let mut matches: Vec<PaymentMethodMapping> = self
            .payment_mappings
            .iter()
            .filter(|row| {
                row.key().0 == tenant
                    && row.marketplace == marketplace
                    && row.external_method == external_method
            })
            .map(|row| row.value().clone())
            .collect();
        matches.sort_by_key(|m| m.id);
        Ok(matches.into_iter().next())
    }

    fn payment_mappings_with_fee(
        &self,
        tenant: TenantId,
        commission: CommissionId,
    ) -> StoreResult<Vec<PaymentMethodMapping>> {
        self.touch(tenant);
        let mut rows: Vec<PaymentMethodMapping> = self
            .payment_mappings
            .iter()
            .filter(|row| row.key().0 == tenant && row.cost_commission_id == Some(commission))
            .map(|row| row.value().clone())
            .collect();
        rows.sort_by_key(|m| m.id);
        Ok(rows)
    }

    fn orders_with_payment_method(
        &self,
        tenant: TenantId,
        marketplace: Marketplace,
        external_method: &str,
    ) -> StoreResult<Vec<OrderId>> {
        self.touch(tenant);
        Ok(sorted(
            self.orders
                .iter()
                .filter(|row| {
                    row.key().0 == tenant
                        && row.marketplace == marketplace
                        && row.payment_method.as_deref() == Some(external_method)
                })
                .map(|row| row.id),
        ))
    }

    fn orders_in_marketplace(
        &self,
        tenant: TenantId,
        marketplace: Marketplace,
    ) -> StoreResult<Vec<OrderId>> {
        self.touch(tenant);
        Ok(sorted(
            self.orders
                .iter()
                .filter(|row| row.key().0 == tenant && row.marketplace == marketplace)
                .map(|row| row.id),
        ))
    }

    fn commission(&self, tenant: TenantId, id: CommissionId) -> StoreResult<Option<CostCommission>> {
        self.touch(tenant);
        Ok(get_cloned(&self.commissions, tenant, id))
    }

    fn marketplace_commissions(
        &self,
        tenant: TenantId,
        marketplace: Marketplace,
    ) -> StoreResult<Vec<CostCommission>> {
        self.touch(tenant);
        let mut rows: Vec<CostCommission> = self
            .commissions
            .iter()
            .filter(|row| {
                row.key().0 == tenant
                    && row.kind == CommissionKind::Marketplace
                    && row.marketplace == Some(marketplace)
            })
            .map(|row| row.value().clone())
            .collect();
        rows.sort_by_key(|c| c.id);
        Ok(rows)
    }

    fn commit_order_financials(
        &self,
        tenant: TenantId,
        order: OrderId,
        financials: OrderFinancials,
    ) -> StoreResult<()> {
        self.touch(tenant);
        self.check_write()?;
        let mut row = self
            .orders
            .get_mut(&(tenant, order))
            .ok_or(StoreError::NotFound {
                tenant,
                entity: "order",
                id: order.get(),
            })?;
        row.financials = financials;
        Ok(())
    }
}
