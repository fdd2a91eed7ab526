//! Cost graph entities
//!
//! Edges of the graph are carried as foreign keys:
//! - `RecipeComponent.product_id -> source` (recipe-of / used-as-ingredient-in)
//! - `OrderItemMapping.order_item_id -> internal_product_id` (mapped-to)
//! - `OrderItem.order_id` and `Order.payment_method`
//!
//! Every entity carries its `tenant_id`.

use crate::core::{
    CommissionId, IngredientId, MappingId, MappingType, Marketplace, OrderId, OrderItemId,
    OrderStatus, PaymentMappingId, PizzaSize, ProductId, RecipeComponentId, TaxCategoryId,
    TenantId,
};
use crate::graph::source::CostSource;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::SystemTime;

/// Unit of measure of an ingredient's price
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    Unit,
    Kg,
    G,
    L,
    Ml,
}

/// Raw ingredient; the leaf cost source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ingredient {
    pub id: IngredientId,
    pub tenant_id: TenantId,
    pub name: String,
    pub unit: Unit,
    pub unit_price: Decimal,
}

/// Internal recipe product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InternalProduct {
    pub id: ProductId,
    pub tenant_id: TenantId,
    pub name: String,
    /// Cached CMV, or user input when the product has no recipe
    pub unit_cost: Decimal,
    /// Whether other recipes may use this product as a component
    #[serde(default)]
    pub is_ingredient: bool,
    #[serde(default)]
    pub tax_category_id: Option<TaxCategoryId>,
    /// Per-size unit cost table used when pricing flavors
    #[serde(default)]
    pub size_costs: BTreeMap<PizzaSize, Decimal>,
}

impl InternalProduct {
    /// Size-specific cost if the table has one for `size`
    pub fn cost_for_size(&self, size: Option<PizzaSize>) -> Option<Decimal> {
        size.and_then(|s| self.size_costs.get(&s).copied())
    }
}

/// One line of a product's recipe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeComponent {
    pub id: RecipeComponentId,
    pub tenant_id: TenantId,
    /// Owning product
    pub product_id: ProductId,
    pub source: CostSource,
    pub quantity: Decimal,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

/// Link between a marketplace line item (or one of its add-ons) and an internal product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItemMapping {
    pub id: MappingId,
    pub tenant_id: TenantId,
    pub order_item_id: OrderItemId,
    pub internal_product_id: ProductId,
    /// Fraction of the product consumed (0.25 for one of four flavors)
    pub quantity: Decimal,
    pub mapping_type: MappingType,
    #[serde(default)]
    pub external_reference: Option<String>,
    /// Fixed unit cost replacing the catalog cost for this mapping
    #[serde(default)]
    pub unit_cost_override: Option<Decimal>,
}

/// Marketplace line item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub tenant_id: TenantId,
    pub order_id: OrderId,
    /// Display name as sent by the marketplace; may embed a size keyword
    pub name: String,
    pub quantity: Decimal,
    pub total_price: Decimal,
    /// Pre-mapping direct product link
    #[serde(default)]
    pub legacy_product_id: Option<ProductId>,
}

/// Aggregated financial fields of an order; written only by the recompute
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderFinancials {
    pub total_costs: Decimal,
    pub total_commissions: Decimal,
    pub net_revenue: Decimal,
    pub costs_calculated_at: Option<SystemTime>,
    /// JSON cost breakdown of the last recompute
    pub calculated_costs: Option<serde_json::Value>,
}

/// Marketplace order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub tenant_id: TenantId,
    pub marketplace: Marketplace,
    pub external_id: String,
    pub status: OrderStatus,
    /// Marketplace payment-method identifier
    #[serde(default)]
    pub payment_method: Option<String>,
    pub gross_total: Decimal,
    #[serde(default)]
    pub financials: OrderFinancials,
}

/// Marketplace payment method linked to a fee rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentMethodMapping {
    pub id: PaymentMappingId,
    pub tenant_id: TenantId,
    pub marketplace: Marketplace,
    pub external_method: String,
    #[serde(default)]
    pub cost_commission_id: Option<CommissionId>,
    #[serde(default)]
    pub no_fee: bool,
    pub category: String,
}

/// What a fee rule is charged for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommissionKind {
    /// Charged through a payment method mapping
    Payment,
    /// Charged by the marketplace on every order of its channel
    Marketplace,
}

/// Fee rule: `gross * percentage / 100 + fixed_amount`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostCommission {
    pub id: CommissionId,
    pub tenant_id: TenantId,
    pub name: String,
    pub kind: CommissionKind,
    /// Channel a marketplace commission applies to
    #[serde(default)]
    pub marketplace: Option<Marketplace>,
    pub percentage: Decimal,
    #[serde(default)]
    pub fixed_amount: Decimal,
}

impl CostCommission {
    pub fn charge(&self, gross: Decimal) -> Decimal {
        crate::core::percent_of(gross, self.percentage) + self.fixed_amount
    }
}

/// Tax category with named component rates (percent)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxCategory {
    pub id: TaxCategoryId,
    pub tenant_id: TenantId,
    pub name: String,
    #[serde(default)]
    pub rates: BTreeMap<String, Decimal>,
}

impl TaxCategory {
    /// Effective rate in percent
    pub fn total_rate(&self) -> Decimal {
        self.rates.values().copied().sum()
    }
}
