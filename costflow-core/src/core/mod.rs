//! Core types shared by every layer
//!
//! - Tenant-scoped entity identifiers
//! - Marketplace, mapping and status enums
//! - Fixed-point money helpers
//! - Error types

pub mod errors;
pub mod money;
pub mod types;

pub use errors::{DispatchError, RecalcError, StoreError};
pub use money::{
    is_significant_change, percent_of, round_cost, round_currency, COST_SCALE, CURRENCY_SCALE,
    DEFAULT_COST_EPSILON,
};
pub use types::{
    ChangeKind, CommissionId, IngredientId, MappingId, MappingType, Marketplace, OrderId,
    OrderItemId, OrderStatus, PaymentMappingId, PizzaSize, ProductId, RecipeComponentId,
    TaxCategoryId, TenantId,
};
