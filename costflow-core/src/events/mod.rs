//! Outbound domain events
//!
//! The engine publishes fire-and-forget notifications for UI and
//! notification collaborators. Delivery and ordering to subscribers are the
//! sink's business; publishing never fails and never blocks recalculation.

pub mod journal;

pub use journal::{EventJournal, JournalEntry};

use crate::core::{Marketplace, OrderId, OrderItemId, OrderStatus, ProductId, TenantId};
use crossbeam::channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

/// A product's persisted unit cost moved by at least epsilon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCostChanged {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub old_cost: Decimal,
    pub new_cost: Decimal,
}

impl ProductCostChanged {
    pub fn delta(&self) -> Decimal {
        self.new_cost - self.old_cost
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    ProductCostChanged(ProductCostChanged),
    OrderCreated {
        tenant_id: TenantId,
        order_id: OrderId,
        external_id: String,
        marketplace: Marketplace,
        message: String,
    },
    OrderStatusChanged {
        tenant_id: TenantId,
        order_id: OrderId,
        external_id: String,
        from: OrderStatus,
        to: OrderStatus,
        message: String,
    },
    ItemTriaged {
        tenant_id: TenantId,
        order_id: OrderId,
        item_id: OrderItemId,
        product_id: ProductId,
        message: String,
    },
}

impl DomainEvent {
    pub fn tenant_id(&self) -> TenantId {
        match self {
            Self::ProductCostChanged(e) => e.tenant_id,
            Self::OrderCreated { tenant_id, .. }
            | Self::OrderStatusChanged { tenant_id, .. }
            | Self::ItemTriaged { tenant_id, .. } => *tenant_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::ProductCostChanged(_) => "product_cost_changed",
            Self::OrderCreated { .. } => "order_created",
            Self::OrderStatusChanged { .. } => "order_status_changed",
            Self::ItemTriaged { .. } => "item_triaged",
        }
    }

    /// Human-readable summary
    pub fn message(&self) -> String {
        match self {
            Self::ProductCostChanged(e) => format!(
                "Cost of {} changed from {} to {}",
                e.product_id, e.old_cost, e.new_cost
            ),
            Self::OrderCreated { message, .. }
            | Self::OrderStatusChanged { message, .. }
            | Self::ItemTriaged { message, .. } => message.clone(),
        }
    }
}

/// Receiver of outbound events
pub trait EventSink: Send + Sync {
    fn publish(&self, event: DomainEvent);
}

/// Logs every event at info level
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn publish(&self, event: DomainEvent) {
        info!(tenant = %event.tenant_id(), kind = event.kind(), "{}", event.message());
    }
}

/// Forwards events into a crossbeam channel
pub struct ChannelSink {
    sender: Sender<DomainEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, Receiver<DomainEvent>) {
        let (sender, receiver) = unbounded();
        (Self { sender }, receiver)
    }
}

impl EventSink for ChannelSink {
    fn publish(&self, event: DomainEvent) {
        // A dropped receiver means nobody is listening any more
        let _ = self.sender.send(event);
    }
}

/// Keeps events in memory; handy for tests and the replay report
#[derive(Default)]
pub struct CollectingSink {
    events: Mutex<Vec<DomainEvent>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DomainEvent> {
        self.events.lock().clone()
    }

    pub fn cost_changes(&self) -> Vec<ProductCostChanged> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                DomainEvent::ProductCostChanged(change) => Some(*change),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for CollectingSink {
    fn publish(&self, event: DomainEvent) {
        self.events.lock().push(event);
    }
}

/// Fans one event out to several sinks
pub struct FanoutSink {
    sinks: Vec<std::sync::Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<std::sync::Arc<dyn EventSink>>) -> Self {
        Self { sinks }
    }
}

impl EventSink for FanoutSink {
    fn publish(&self, event: DomainEvent) {
        for sink in &self.sinks {
            sink.publish(event.clone());
        }
    }
}
