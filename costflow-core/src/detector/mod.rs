//! Change detector
//!
//! Entry points called synchronously by persistence-layer mutation hooks
//! after a commit. Each decides from the changed fields whether the edit
//! can move a cost and, if so, enqueues the narrowest recalculation units
//! that cover it:
//!
//! | Trigger                  | Units                                               |
//! |--------------------------|-----------------------------------------------------|
//! | ingredient               | product (all orders) per owning product             |
//! | recipe component         | product (all orders) for the owner                  |
//! | internal product         | product (all orders) for the product                |
//! | tax category             | product (all orders) per product in the category    |
//! | payment method mapping   | order per order paid with that method               |
//! | cost commission          | order per order charged by it                       |
//! | order item / mapping     | order for the item's order                          |
//! | order created            | order                                               |
//!
//! Every method returns how many units it enqueued.

use crate::core::{ChangeKind, OrderId, OrderStatus, ProductId, RecalcError, TenantId};
use crate::dispatch::{RecalcJob, RecalcQueue};
use crate::events::{DomainEvent, EventSink};
use crate::graph::{
    would_create_cycle, ChangeSet, CommissionField, CommissionKind, CostCommission, CostSource,
    Ingredient, IngredientField, InternalProduct, Order, OrderItem, OrderItemMapping,
    PaymentMappingField, PaymentMethodMapping, ProductField, RecipeComponent, RecipeField,
    TaxCategory, TaxCategoryField,
};
use crate::store::CostStore;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct ChangeDetector {
    store: Arc<dyn CostStore>,
    queue: Arc<dyn RecalcQueue>,
    events: Arc<dyn EventSink>,
}

impl ChangeDetector {
    pub fn new(
        store: Arc<dyn CostStore>,
        queue: Arc<dyn RecalcQueue>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            store,
            queue,
            events,
        }
    }

    pub fn on_ingredient_updated(
        &self,
        ingredient: &Ingredient,
        changes: &ChangeSet<IngredientField>,
    ) -> Result<usize, RecalcError> {
        if !changes.is_cost_relevant() {
            return Ok(0);
        }
        let tenant = ingredient.tenant_id;
        let owners = self
            .store
            .products_using(tenant, CostSource::Ingredient(ingredient.id))?;
        debug!(%tenant, ingredient = %ingredient.id, owners = owners.len(), "Ingredient cost changed");
        self.enqueue_products(tenant, owners)
    }

    pub fn on_product_recipe_changed(
        &self,
        component: &RecipeComponent,
        changes: &ChangeSet<RecipeField>,
    ) -> Result<usize, RecalcError> {
        if !changes.is_cost_relevant() {
            return Ok(0);
        }
        let tenant = component.tenant_id;
        let owner = component.product_id;

        if component.active
            && would_create_cycle(self.store.as_ref(), tenant, owner, component.source)?
        {
            warn!(
                %tenant,
                product = %owner,
                source = %component.source,
                "Recipe component closes a dependency cycle, cascades will stop at the repeated product"
            );
        }
        self.enqueue_products(tenant, [owner])
    }

    pub fn on_product_updated(
        &self,
        product: &InternalProduct,
        changes: &ChangeSet<ProductField>,
    ) -> Result<usize, RecalcError> {
        if !changes.is_cost_relevant() {
            return Ok(0);
        }
        self.enqueue_products(product.tenant_id, [product.id])
    }

    pub fn on_tax_category_updated(
        &self,
        category: &TaxCategory,
        changes: &ChangeSet<TaxCategoryField>,
    ) -> Result<usize, RecalcError> {
        if !changes.is_cost_relevant() {
            return Ok(0);
        }
        let tenant = category.tenant_id;
        let products = self.store.products_in_tax_category(tenant, category.id)?;
        self.enqueue_products(tenant, products)
    }

    pub fn on_payment_mapping_changed(
        &self,
        mapping: &PaymentMethodMapping,
        changes: &ChangeSet<PaymentMappingField>,
    ) -> Result<usize, RecalcError> {
        if !changes.is_cost_relevant() {
            return Ok(0);
        }
        let tenant = mapping.tenant_id;
        let orders =
            self.store
                .orders_with_payment_method(tenant, mapping.marketplace, &mapping.external_method)?;
        self.enqueue_orders(tenant, orders)
    }

    pub fn on_cost_commission_updated(
        &self,
        commission: &CostCommission,
        changes: &ChangeSet<CommissionField>,
    ) -> Result<usize, RecalcError> {
        if !changes.is_cost_relevant() {
            return Ok(0);
        }
        let tenant = commission.tenant_id;
        let mut orders = BTreeSet::new();

        match commission.kind {
            CommissionKind::Payment => {
                for mapping in self.store.payment_mappings_with_fee(tenant, commission.id)? {
                    orders.extend(self.store.orders_with_payment_method(
                        tenant,
                        mapping.marketplace,
                        &mapping.external_method,
                    )?);
                }
            }
            CommissionKind::Marketplace => {
                if let Some(marketplace) = commission.marketplace {
                    orders.extend(self.store.orders_in_marketplace(tenant, marketplace)?);
                }
            }
        }
        self.enqueue_orders(tenant, orders)
    }

    pub fn on_order_item_changed(
        &self,
        item: &OrderItem,
        kind: ChangeKind,
    ) -> Result<usize, RecalcError> {
        debug!(tenant = %item.tenant_id, item = %item.id, ?kind, "Order item changed");
        self.enqueue_orders(item.tenant_id, [item.order_id])
    }

    pub fn on_item_mapping_changed(
        &self,
        mapping: &OrderItemMapping,
        kind: ChangeKind,
    ) -> Result<usize, RecalcError> {
        let tenant = mapping.tenant_id;
        let Some(item) = self.store.order_item(tenant, mapping.order_item_id)? else {
            warn!(%tenant, item = %mapping.order_item_id, mapping = %mapping.id, "Mapping points at unknown order item");
            return Ok(0);
        };

        if kind == ChangeKind::Created {
            self.events.publish(DomainEvent::ItemTriaged {
                tenant_id: tenant,
                order_id: item.order_id,
                item_id: item.id,
                product_id: mapping.internal_product_id,
                message: format!("Item '{}' mapped to {}", item.name, mapping.internal_product_id),
            });
        }
        self.enqueue_orders(tenant, [item.order_id])
    }

    pub fn on_order_created(&self, order: &Order) -> Result<usize, RecalcError> {
        self.events.publish(DomainEvent::OrderCreated {
            tenant_id: order.tenant_id,
            order_id: order.id,
            external_id: order.external_id.clone(),
            marketplace: order.marketplace,
            message: format!("New {} order {}", order.marketplace, order.external_id),
        });
        self.enqueue_orders(order.tenant_id, [order.id])
    }

    /// Status does not feed any cost; this only notifies
    pub fn on_order_status_changed(
        &self,
        order: &Order,
        previous: OrderStatus,
    ) -> Result<usize, RecalcError> {
        if previous == order.status {
            return Ok(0);
        }
        self.events.publish(DomainEvent::OrderStatusChanged {
            tenant_id: order.tenant_id,
            order_id: order.id,
            external_id: order.external_id.clone(),
            from: previous,
            to: order.status,
            message: format!(
                "Order {} moved from {} to {}",
                order.external_id, previous, order.status
            ),
        });
        Ok(0)
    }

    fn enqueue_products(
        &self,
        tenant: TenantId,
        products: impl IntoIterator<Item = ProductId>,
    ) -> Result<usize, RecalcError> {
        let unique: BTreeSet<ProductId> = products.into_iter().collect();
        for &product in &unique {
            self.queue.enqueue(RecalcJob::product(tenant, product, true))?;
        }
        Ok(unique.len())
    }

    fn enqueue_orders(
        &self,
        tenant: TenantId,
        orders: impl IntoIterator<Item = OrderId>,
    ) -> Result<usize, RecalcError> {
        let unique: BTreeSet<OrderId> = orders.into_iter().collect();
        for &order in &unique {
            self.queue.enqueue(RecalcJob::order(tenant, order))?;
        }
        Ok(unique.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{MappingType, Marketplace};
    use crate::dispatch::RecordingQueue;
    use crate::events::CollectingSink;
    use crate::store::InMemoryStore;
    use crate::testing::{find_item, find_order, GraphBuilder};
    use rust_decimal_macros::dec;

    struct Fixture {
        store: Arc<InMemoryStore>,
        queue: Arc<RecordingQueue>,
        sink: Arc<CollectingSink>,
        detector: ChangeDetector,
    }

    fn fixture(store: InMemoryStore) -> Fixture {
        let store = Arc::new(store);
        let queue = Arc::new(RecordingQueue::new());
        let sink = Arc::new(CollectingSink::new());
        let detector = ChangeDetector::new(store.clone(), queue.clone(), sink.clone());
        Fixture {
            store,
            queue,
            sink,
            detector,
        }
    }

    #[test]
    fn test_ingredient_price_enqueues_each_owner_once() {
        let mut g = GraphBuilder::new(1);
        let cheese = g.ingredient(1, dec!(40));
        let pizza = g.product(1, dec!(0));
        let lasagna = g.product(2, dec!(0));
        g.component(pizza, CostSource::Ingredient(cheese), dec!(0.2));
        g.component(pizza, CostSource::Ingredient(cheese), dec!(0.1));
        g.component(lasagna, CostSource::Ingredient(cheese), dec!(0.3));
        let (store, tenant) = g.build();
        let f = fixture(store);

        let (before, after) = f
            .store
            .update_ingredient(tenant, cheese, |i| i.unit_price = dec!(45))
            .unwrap();
        let enqueued = f
            .detector
            .on_ingredient_updated(&after, &Ingredient::diff(&before, &after))
            .unwrap();

        assert_eq!(enqueued, 2);
        assert_eq!(
            f.queue.jobs(),
            vec![
                RecalcJob::product(tenant, pizza, true),
                RecalcJob::product(tenant, lasagna, true)
            ]
        );
    }

    #[test]
    fn test_irrelevant_edit_is_a_no_op() {
        let mut g = GraphBuilder::new(1);
        let cheese = g.ingredient(1, dec!(40));
        let pizza = g.product(1, dec!(0));
        g.component(pizza, CostSource::Ingredient(cheese), dec!(0.2));
        let (store, tenant) = g.build();
        let f = fixture(store);

        let (before, after) = f
            .store
            .update_ingredient(tenant, cheese, |i| i.name = "Mussarela".into())
            .unwrap();
        let enqueued = f
            .detector
            .on_ingredient_updated(&after, &Ingredient::diff(&before, &after))
            .unwrap();

        assert_eq!(enqueued, 0);
        assert!(f.queue.is_empty());
    }

    #[test]
    fn test_tax_category_enqueues_its_products() {
        let mut g = GraphBuilder::new(1);
        let a = g.product(1, dec!(5));
        let b = g.product(2, dec!(5));
        g.product(3, dec!(5));
        let tax = g.tax_category(1, &[("icms", dec!(5))]);
        g.set_tax_category(a, tax);
        g.set_tax_category(b, tax);
        let (store, tenant) = g.build();
        let f = fixture(store);

        let category = f.store.tax_category(tenant, tax).unwrap().unwrap();
        let changes = ChangeSet::new().with(TaxCategoryField::TotalRate);
        assert_eq!(f.detector.on_tax_category_updated(&category, &changes).unwrap(), 2);
    }

    #[test]
    fn test_payment_mapping_enqueues_orders_paid_with_it() {
        let mut g = GraphBuilder::new(1);
        let card = g.commission(1, CommissionKind::Payment, None, dec!(3), dec!(0));
        let mapping = g.payment_mapping(1, Marketplace::Ifood, "CREDIT", Some(card), false);
        let paid = g.order(10, dec!(50));
        g.set_payment_method(paid, "CREDIT");
        let cash = g.order(11, dec!(50));
        g.set_payment_method(cash, "CASH");
        let (store, tenant) = g.build();
        let f = fixture(store);

        let row = f.store.snapshot(tenant).payment_mappings.remove(0);
        assert_eq!(row.id, mapping);
        let changes = ChangeSet::new().with(PaymentMappingField::NoFee);
        assert_eq!(f.detector.on_payment_mapping_changed(&row, &changes).unwrap(), 1);
        assert_eq!(f.queue.jobs(), vec![RecalcJob::order(tenant, paid)]);
    }

    #[test]
    fn test_marketplace_commission_enqueues_marketplace_orders() {
        let mut g = GraphBuilder::new(1);
        let fee = g.commission(1, CommissionKind::Marketplace, Some(Marketplace::Rappi), dec!(15), dec!(0));
        let rappi = g.order_in(10, Marketplace::Rappi, dec!(50));
        g.order_in(11, Marketplace::Ifood, dec!(50));
        let (store, tenant) = g.build();
        let f = fixture(store);

        let commission = f.store.commission(tenant, fee).unwrap().unwrap();
        let changes = ChangeSet::new().with(CommissionField::Percentage);
        assert_eq!(f.detector.on_cost_commission_updated(&commission, &changes).unwrap(), 1);
        assert_eq!(f.queue.jobs(), vec![RecalcJob::order(tenant, rappi)]);
    }

    #[test]
    fn test_new_mapping_triages_item() {
        let mut g = GraphBuilder::new(1);
        let pizza = g.product(1, dec!(10));
        let order = g.order(10, dec!(50));
        let item = g.item(order, "Pizza Calabresa", dec!(1), dec!(50));
        g.mapping(item, pizza, dec!(1), MappingType::Main);
        let (store, tenant) = g.build();
        let f = fixture(store);

        let mapping = f.store.item_mappings(tenant, item).unwrap().remove(0);
        assert_eq!(f.detector.on_item_mapping_changed(&mapping, ChangeKind::Created).unwrap(), 1);

        let events = f.sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind(), "item_triaged");
        assert_eq!(events[0].message(), "Item 'Pizza Calabresa' mapped to product#1");

        f.detector
            .on_item_mapping_changed(&mapping, ChangeKind::Updated)
            .unwrap();
        assert_eq!(f.sink.events().len(), 1);
        assert_eq!(f.queue.len(), 2);
        assert_eq!(find_item(&f.store, tenant, item).order_id, order);
    }

    #[test]
    fn test_order_lifecycle_events() {
        let mut g = GraphBuilder::new(1);
        let order = g.order(10, dec!(50));
        let (store, tenant) = g.build();
        let f = fixture(store);

        let row = find_order(&f.store, tenant, order);
        assert_eq!(f.detector.on_order_created(&row).unwrap(), 1);

        let (before, after) = f
            .store
            .update_order(tenant, order, |o| o.status = OrderStatus::Dispatched)
            .unwrap();
        assert_eq!(f.detector.on_order_status_changed(&after, before.status).unwrap(), 0);
        assert_eq!(f.detector.on_order_status_changed(&after, after.status).unwrap(), 0);

        let kinds: Vec<&str> = f.sink.events().iter().map(|e| e.kind()).collect();
        assert_eq!(kinds, vec!["order_created", "order_status_changed"]);
        assert_eq!(f.sink.events()[1].message(), "Order EXT-10 moved from placed to dispatched");
    }

    #[test]
    fn test_cyclic_component_still_enqueues_owner() {
        let mut g = GraphBuilder::new(1);
        let a = g.product(1, dec!(1));
        let b = g.product(2, dec!(1));
        g.component(b, CostSource::Product(a), dec!(1));
        let c = g.component(a, CostSource::Product(b), dec!(1));
        let (store, tenant) = g.build();
        let f = fixture(store);

        let component = f
            .store
            .recipe(tenant, a)
            .unwrap()
            .into_iter()
            .find(|row| row.id == c)
            .unwrap();
        let changes = ChangeSet::new().with(RecipeField::Existence);
        assert_eq!(f.detector.on_product_recipe_changed(&component, &changes).unwrap(), 1);
    }
}
