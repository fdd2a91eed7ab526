//! Order-level financial recompute
//!
//! ```text
//! cmv               = Σ line totals
//! taxes             = Σ item total_price × tax rate of its main (or legacy) product
//! payment_fee       = payment mapping → fee rule, charged on gross
//! total_costs       = cmv + taxes + payment_fee
//! total_commissions = Σ marketplace commissions, charged on gross
//! net_revenue       = gross_total − total_costs − total_commissions
//! ```
//!
//! Currency figures are rounded to cents only here.

use super::line::{price_line, LineCost};
use crate::core::{percent_of, round_currency, MappingType, OrderId, ProductId, StoreError, TenantId};
use crate::graph::{Order, OrderFinancials, OrderItem, OrderItemMapping};
use crate::store::CostStore;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use tracing::{debug, warn};

/// Full cost breakdown of one order; persisted as `calculated_costs`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCostBreakdown {
    pub order_id: OrderId,
    pub lines: Vec<LineCost>,
    pub gross_total: Decimal,
    pub cmv: Decimal,
    pub taxes: Decimal,
    pub payment_fee: Decimal,
    pub marketplace_commissions: Decimal,
    pub total_costs: Decimal,
    pub total_commissions: Decimal,
    pub net_revenue: Decimal,
}

impl OrderCostBreakdown {
    /// Financial block to commit, stamped with `calculated_at`
    pub fn to_financials(&self, calculated_at: SystemTime) -> Result<OrderFinancials, serde_json::Error> {
        Ok(OrderFinancials {
            total_costs: self.total_costs,
            total_commissions: self.total_commissions,
            net_revenue: self.net_revenue,
            costs_calculated_at: Some(calculated_at),
            calculated_costs: Some(serde_json::to_value(self)?),
        })
    }
}

/// Recompute every financial figure of `order` from the current graph
pub fn compute_order_costs(
    store: &dyn CostStore,
    tenant: TenantId,
    order: &Order,
) -> Result<OrderCostBreakdown, StoreError> {
    let mut lines = Vec::new();
    let mut cmv = Decimal::ZERO;
    let mut taxes = Decimal::ZERO;

    for item in store.order_items(tenant, order.id)? {
        let mappings = store.item_mappings(tenant, item.id)?;
        let line = price_line(store, tenant, &item, &mappings)?;
        cmv += line.total();
        taxes += item_tax(store, tenant, &item, &mappings)?;
        lines.push(line);
    }

    let payment_fee = payment_fee(store, tenant, order)?;

    let mut marketplace_commissions = Decimal::ZERO;
    for commission in store.marketplace_commissions(tenant, order.marketplace)? {
        marketplace_commissions += commission.charge(order.gross_total);
    }

    let cmv = round_currency(cmv);
    let taxes = round_currency(taxes);
    let payment_fee = round_currency(payment_fee);
    let marketplace_commissions = round_currency(marketplace_commissions);

    let total_costs = cmv + taxes + payment_fee;
    let total_commissions = marketplace_commissions;
    let net_revenue = round_currency(order.gross_total) - total_costs - total_commissions;

    debug!(
        %tenant,
        order = %order.id,
        %cmv,
        %taxes,
        %payment_fee,
        %total_commissions,
        %net_revenue,
        "Order costs computed"
    );

    Ok(OrderCostBreakdown {
        order_id: order.id,
        lines,
        gross_total: order.gross_total,
        cmv,
        taxes,
        payment_fee,
        marketplace_commissions,
        total_costs,
        total_commissions,
        net_revenue,
    })
}

/// Product whose tax category applies to the item: first main mapping, else legacy link
fn taxed_product(item: &OrderItem, mappings: &[OrderItemMapping]) -> Option<ProductId> {
    mappings
        .iter()
        .find(|m| m.mapping_type == MappingType::Main)
        .map(|m| m.internal_product_id)
        .or(item.legacy_product_id)
}

fn item_tax(
    store: &dyn CostStore,
    tenant: TenantId,
    item: &OrderItem,
    mappings: &[OrderItemMapping],
) -> Result<Decimal, StoreError> {
    let Some(product_id) = taxed_product(item, mappings) else {
        return Ok(Decimal::ZERO);
    };
    let Some(category_id) = store
        .product(tenant, product_id)?
        .and_then(|p| p.tax_category_id)
    else {
        return Ok(Decimal::ZERO);
    };

    match store.tax_category(tenant, category_id)? {
        Some(category) => Ok(percent_of(item.total_price, category.total_rate())),
        None => {
            warn!(%tenant, item = %item.id, category = %category_id, "Tax category not found, no tax applied");
            Ok(Decimal::ZERO)
        }
    }
}

fn payment_fee(store: &dyn CostStore, tenant: TenantId, order: &Order) -> Result<Decimal, StoreError> {
    let Some(method) = order.payment_method.as_deref() else {
        return Ok(Decimal::ZERO);
    };
    let Some(mapping) = store.payment_mapping(tenant, order.marketplace, method)? else {
        debug!(%tenant, order = %order.id, method, "Payment method not mapped, no fee");
        return Ok(Decimal::ZERO);
    };
    if mapping.no_fee {
        return Ok(Decimal::ZERO);
    }
    let Some(fee_id) = mapping.cost_commission_id else {
        return Ok(Decimal::ZERO);
    };

    match store.commission(tenant, fee_id)? {
        Some(fee) => Ok(fee.charge(order.gross_total)),
        None => {
            warn!(%tenant, order = %order.id, commission = %fee_id, "Payment fee rule not found, no fee applied");
            Ok(Decimal::ZERO)
        }
    }
}
