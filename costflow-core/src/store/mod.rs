//! Repository boundary consumed by the engine
//!
//! The engine never talks to a database directly. Everything it reads or
//! writes goes through [`CostStore`], and every method is partitioned by
//! [`TenantId`]: an id that belongs to another tenant is indistinguishable
//! from a missing one.

pub mod memory;
pub mod snapshot;

pub use memory::InMemoryStore;
pub use snapshot::Snapshot;

use crate::core::{
    CommissionId, IngredientId, Marketplace, OrderId, OrderItemId, ProductId, StoreError,
    TaxCategoryId, TenantId,
};
use crate::graph::{
    CostCommission, CostSource, Ingredient, InternalProduct, Order, OrderFinancials, OrderItem,
    OrderItemMapping, PaymentMethodMapping, RecipeComponent, TaxCategory,
};
use rust_decimal::Decimal;

pub type StoreResult<T> = Result<T, StoreError>;

/// Tenant-partitioned access to the cost graph
///
/// Implementations must be safe to share across worker threads. Lists are
/// returned sorted by id so traversal order is deterministic.
pub trait CostStore: Send + Sync {
    fn ingredient(&self, tenant: TenantId, id: IngredientId) -> StoreResult<Option<Ingredient>>;

    fn product(&self, tenant: TenantId, id: ProductId) -> StoreResult<Option<InternalProduct>>;

    /// All recipe components owned by `product`, active or not
    fn recipe(&self, tenant: TenantId, product: ProductId) -> StoreResult<Vec<RecipeComponent>>;

    /// Owners of an active recipe component consuming `source`
    fn products_using(&self, tenant: TenantId, source: CostSource) -> StoreResult<Vec<ProductId>>;

    fn products_in_tax_category(
        &self,
        tenant: TenantId,
        category: TaxCategoryId,
    ) -> StoreResult<Vec<ProductId>>;

    fn tax_category(&self, tenant: TenantId, id: TaxCategoryId) -> StoreResult<Option<TaxCategory>>;

    /// Persist a product's derived unit cost
    fn save_product_cost(&self, tenant: TenantId, id: ProductId, unit_cost: Decimal)
        -> StoreResult<()>;

    fn order(&self, tenant: TenantId, id: OrderId) -> StoreResult<Option<Order>>;

    fn order_items(&self, tenant: TenantId, order: OrderId) -> StoreResult<Vec<OrderItem>>;

    fn order_item(&self, tenant: TenantId, id: OrderItemId) -> StoreResult<Option<OrderItem>>;

    fn item_mappings(&self, tenant: TenantId, item: OrderItemId)
        -> StoreResult<Vec<OrderItemMapping>>;

    /// Open orders with an item mapped to `product` (any mapping type or the
    /// legacy link)
    fn open_orders_referencing_product(
        &self,
        tenant: TenantId,
        product: ProductId,
    ) -> StoreResult<Vec<OrderId>>;

    fn payment_mapping(
        &self,
        tenant: TenantId,
        marketplace: Marketplace,
        external_method: &str,
    ) -> StoreResult<Option<PaymentMethodMapping>>;

    fn payment_mappings_with_fee(
        &self,
        tenant: TenantId,
        commission: CommissionId,
    ) -> StoreResult<Vec<PaymentMethodMapping>>;

    fn orders_with_payment_method(
        &self,
        tenant: TenantId,
        marketplace: Marketplace,
        external_method: &str,
    ) -> StoreResult<Vec<OrderId>>;

    fn orders_in_marketplace(
        &self,
        tenant: TenantId,
        marketplace: Marketplace,
    ) -> StoreResult<Vec<OrderId>>;

    fn commission(&self, tenant: TenantId, id: CommissionId) -> StoreResult<Option<CostCommission>>;

    /// Marketplace-kind commissions charged on `marketplace` orders
    fn marketplace_commissions(
        &self,
        tenant: TenantId,
        marketplace: Marketplace,
    ) -> StoreResult<Vec<CostCommission>>;

    /// Replace an order's financial block in one atomic write
    fn commit_order_financials(
        &self,
        tenant: TenantId,
        order: OrderId,
        financials: OrderFinancials,
    ) -> StoreResult<()>;
}
