//! Fixtures for unit and integration tests
//!
//! [`GraphBuilder`] writes rows for one tenant straight into an
//! [`InMemoryStore`] without going through the change detector.

use crate::core::{
    CommissionId, IngredientId, MappingId, MappingType, Marketplace, OrderId, OrderItemId,
    OrderStatus, PaymentMappingId, PizzaSize, ProductId, RecipeComponentId, StoreError,
    TaxCategoryId, TenantId,
};
use crate::graph::{
    CommissionKind, CostCommission, CostSource, Ingredient, InternalProduct, Order,
    OrderFinancials, OrderItem, OrderItemMapping, PaymentMethodMapping, RecipeComponent,
    TaxCategory, Unit,
};
use crate::store::{CostStore, InMemoryStore, StoreResult};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

pub struct GraphBuilder {
    store: InMemoryStore,
    tenant: TenantId,
    next_component: u64,
    next_item: u64,
    next_mapping: u64,
}

impl GraphBuilder {
    pub fn new(tenant: u64) -> Self {
        Self::with_store(InMemoryStore::new(), tenant)
    }

    /// Keep adding rows to an existing store, under another tenant if needed
    pub fn with_store(store: InMemoryStore, tenant: u64) -> Self {
        Self {
            store,
            tenant: TenantId::new(tenant),
            next_component: 1,
            next_item: 1,
            next_mapping: 1,
        }
    }

    pub fn tenant(&self) -> TenantId {
        self.tenant
    }

    pub fn store(&self) -> &InMemoryStore {
        &self.store
    }

    pub fn build(self) -> (InMemoryStore, TenantId) {
        (self.store, self.tenant)
    }

    pub fn ingredient(&mut self, id: u64, unit_price: Decimal) -> IngredientId {
        let id = IngredientId::new(id);
        self.store.upsert_ingredient(Ingredient {
            id,
            tenant_id: self.tenant,
            name: format!("ingredient {}", id.get()),
            unit: Unit::Kg,
            unit_price,
        });
        id
    }

    pub fn product(&mut self, id: u64, unit_cost: Decimal) -> ProductId {
        let id = ProductId::new(id);
        self.store.upsert_product(InternalProduct {
            id,
            tenant_id: self.tenant,
            name: format!("product {}", id.get()),
            unit_cost,
            is_ingredient: false,
            tax_category_id: None,
            size_costs: BTreeMap::new(),
        });
        id
    }

    /// Add an active recipe line; a product source becomes an ingredient
    pub fn component(
        &mut self,
        owner: ProductId,
        source: CostSource,
        quantity: Decimal,
    ) -> RecipeComponentId {
        let id = RecipeComponentId::new(self.next_component);
        self.next_component += 1;

        self.store.upsert_component(RecipeComponent {
            id,
            tenant_id: self.tenant,
            product_id: owner,
            source,
            quantity,
            active: true,
        });
        if let Some(product) = source.as_product() {
            self.set_ingredient_flag(product, true);
        }
        id
    }

    pub fn deactivate(&mut self, component: RecipeComponentId) {
        self.store
            .update_component(self.tenant, component, |c| c.active = false);
    }

    pub fn set_ingredient_flag(&mut self, product: ProductId, is_ingredient: bool) {
        self.store
            .update_product(self.tenant, product, |p| p.is_ingredient = is_ingredient);
    }

    pub fn size_cost(&mut self, product: ProductId, size: PizzaSize, cost: Decimal) {
        self.store.update_product(self.tenant, product, |p| {
            p.size_costs.insert(size, cost);
        });
    }

    pub fn tax_category(&mut self, id: u64, rates: &[(&str, Decimal)]) -> TaxCategoryId {
        let id = TaxCategoryId::new(id);
        self.store.upsert_tax_category(TaxCategory {
            id,
            tenant_id: self.tenant,
            name: format!("tax {}", id.get()),
            rates: rates.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        });
        id
    }

    pub fn set_tax_category(&mut self, product: ProductId, category: TaxCategoryId) {
        self.store
            .update_product(self.tenant, product, |p| p.tax_category_id = Some(category));
    }

    pub fn commission(
        &mut self,
        id: u64,
        kind: CommissionKind,
        marketplace: Option<Marketplace>,
        percentage: Decimal,
        fixed_amount: Decimal,
    ) -> CommissionId {
        let id = CommissionId::new(id);
        self.store.upsert_commission(CostCommission {
            id,
            tenant_id: self.tenant,
            name: format!("commission {}", id.get()),
            kind,
            marketplace,
            percentage,
            fixed_amount,
        });
        id
    }

    pub fn payment_mapping(
        &mut self,
        id: u64,
        marketplace: Marketplace,
        external_method: &str,
        fee: Option<CommissionId>,
        no_fee: bool,
    ) -> PaymentMappingId {
        let id = PaymentMappingId::new(id);
        self.store.upsert_payment_mapping(PaymentMethodMapping {
            id,
            tenant_id: self.tenant,
            marketplace,
            external_method: external_method.to_string(),
            cost_commission_id: fee,
            no_fee,
            category: "card".to_string(),
        });
        id
    }

    pub fn order(&mut self, id: u64, gross_total: Decimal) -> OrderId {
        self.order_in(id, Marketplace::Ifood, gross_total)
    }

    pub fn order_in(&mut self, id: u64, marketplace: Marketplace, gross_total: Decimal) -> OrderId {
        let id = OrderId::new(id);
        self.store.upsert_order(Order {
            id,
            tenant_id: self.tenant,
            marketplace,
            external_id: format!("EXT-{}", id.get()),
            status: OrderStatus::Placed,
            payment_method: None,
            gross_total,
            financials: OrderFinancials::default(),
        });
        id
    }

    pub fn set_status(&mut self, order: OrderId, status: OrderStatus) {
        self.store.update_order(self.tenant, order, |o| o.status = status);
    }

    pub fn set_payment_method(&mut self, order: OrderId, method: &str) {
        self.store.update_order(self.tenant, order, |o| {
            o.payment_method = Some(method.to_string());
        });
    }

    pub fn item(
        &mut self,
        order: OrderId,
        name: &str,
        quantity: Decimal,
        total_price: Decimal,
    ) -> OrderItemId {
        self.insert_item(order, name, quantity, total_price, None)
    }

    /// Item carrying only the direct product link of older orders
    pub fn legacy_item(
        &mut self,
        order: OrderId,
        name: &str,
        quantity: Decimal,
        total_price: Decimal,
        product: ProductId,
    ) -> OrderItemId {
        self.insert_item(order, name, quantity, total_price, Some(product))
    }

    fn insert_item(
        &mut self,
        order: OrderId,
        name: &str,
        quantity: Decimal,
        total_price: Decimal,
        legacy_product_id: Option<ProductId>,
    ) -> OrderItemId {
        let id = OrderItemId::new(self.next_item);
        self.next_item += 1;

        self.store.upsert_item(OrderItem {
            id,
            tenant_id: self.tenant,
            order_id: order,
            name: name.to_string(),
            quantity,
            total_price,
            legacy_product_id,
        });
        id
    }

    pub fn mapping(
        &mut self,
        item: OrderItemId,
        product: ProductId,
        quantity: Decimal,
        mapping_type: MappingType,
    ) -> MappingId {
        self.insert_mapping(item, product, quantity, mapping_type, None)
    }

    pub fn mapping_with_override(
        &mut self,
        item: OrderItemId,
        product: ProductId,
        quantity: Decimal,
        mapping_type: MappingType,
        unit_cost: Decimal,
    ) -> MappingId {
        self.insert_mapping(item, product, quantity, mapping_type, Some(unit_cost))
    }

    fn insert_mapping(
        &mut self,
        item: OrderItemId,
        product: ProductId,
        quantity: Decimal,
        mapping_type: MappingType,
        unit_cost_override: Option<Decimal>,
    ) -> MappingId {
        let id = MappingId::new(self.next_mapping);
        self.next_mapping += 1;

        self.store.upsert_mapping(OrderItemMapping {
            id,
            tenant_id: self.tenant,
            order_item_id: item,
            internal_product_id: product,
            quantity,
            mapping_type,
            external_reference: None,
            unit_cost_override,
        });
        id
    }
}

/// Look up an item row; panics when absent
pub fn find_item(store: &InMemoryStore, tenant: TenantId, id: OrderItemId) -> OrderItem {
    store
        .snapshot(tenant)
        .items
        .into_iter()
        .find(|item| item.id == id)
        .unwrap_or_else(|| panic!("{} not found in {}", id, tenant))
}

/// Look up an order row; panics when absent
pub fn find_order(store: &InMemoryStore, tenant: TenantId, id: OrderId) -> Order {
    store
        .snapshot(tenant)
        .orders
        .into_iter()
        .find(|order| order.id == id)
        .unwrap_or_else(|| panic!("{} not found in {}", id, tenant))
}

/// Store whose every call fails with [`StoreError::Unavailable`]
pub struct UnavailableStore;

fn offline<T>() -> StoreResult<T> {
    Err(StoreError::Unavailable {
        reason: "connection refused".to_string(),
    })
}

impl CostStore for UnavailableStore {
    fn ingredient(&self, _: TenantId, _: IngredientId) -> StoreResult<Option<Ingredient>> {
        offline()
    }

    fn product(&self, _: TenantId, _: ProductId) -> StoreResult<Option<InternalProduct>> {
        offline()
    }

    fn recipe(&self, _: TenantId, _: ProductId) -> StoreResult<Vec<RecipeComponent>> {
        offline()
    }

    fn products_using(&self, _: TenantId, _: CostSource) -> StoreResult<Vec<ProductId>> {
        offline()
    }

    fn products_in_tax_category(&self, _: TenantId, _: TaxCategoryId) -> StoreResult<Vec<ProductId>> {
        offline()
    }

    fn tax_category(&self, _: TenantId, _: TaxCategoryId) -> StoreResult<Option<TaxCategory>> {
        offline()
    }

    fn save_product_cost(&self, _: TenantId, _: ProductId, _: Decimal) -> StoreResult<()> {
        offline()
    }

    fn order(&self, _: TenantId, _: OrderId) -> StoreResult<Option<Order>> {
        offline()
    }

    fn order_items(&self, _: TenantId, _: OrderId) -> StoreResult<Vec<OrderItem>> {
        offline()
    }

    fn order_item(&self, _: TenantId, _: OrderItemId) -> StoreResult<Option<OrderItem>> {
        offline()
    }

    fn item_mappings(&self, _: TenantId, _: OrderItemId) -> StoreResult<Vec<OrderItemMapping>> {
        offline()
    }

    fn open_orders_referencing_product(&self, _: TenantId, _: ProductId) -> StoreResult<Vec<OrderId>> {
        offline()
    }

    fn payment_mapping(
        &self,
        _: TenantId,
        _: Marketplace,
        _: &str,
    ) -> StoreResult<Option<PaymentMethodMapping>> {
        offline()
    }

    fn payment_mappings_with_fee(
        &self,
        _: TenantId,
        _: CommissionId,
    ) -> StoreResult<Vec<PaymentMethodMapping>> {
        offline()
    }

    fn orders_with_payment_method(
        &self,
        _: TenantId,
        _: Marketplace,
        _: &str,
    ) -> StoreResult<Vec<OrderId>> {
        offline()
    }

    fn orders_in_marketplace(&self, _: TenantId, _: Marketplace) -> StoreResult<Vec<OrderId>> {
        offline()
    }

    fn commission(&self, _: TenantId, _: CommissionId) -> StoreResult<Option<CostCommission>> {
        offline()
    }

    fn marketplace_commissions(&self, _: TenantId, _: Marketplace) -> StoreResult<Vec<CostCommission>> {
        offline()
    }

    fn commit_order_financials(&self, _: TenantId, _: OrderId, _: OrderFinancials) -> StoreResult<()> {
        offline()
    }
}
