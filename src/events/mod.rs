use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Creates a sender and the receiver that should be handed to [`process_events`].
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Publishes an event for a transition that has already committed.
    /// Delivery failure is logged and swallowed.
    pub async fn publish(&self, event: Event) {
        let name = event.name();
        if let Err(e) = self.send(event).await {
            crate::metrics::EVENT_PUBLISH_FAILURES.inc();
            warn!(event = name, error = %e, "Failed to publish domain event");
        }
    }
}

/// Domain events emitted after a fulfillment or ledger transition commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    OrderConfirmed {
        order_id: Uuid,
        reserved_units: i64,
    },
    OrderCancelled {
        order_id: Uuid,
        released_units: i64,
    },
    OrderReturned {
        order_id: Uuid,
        returned_units: i64,
        fully_returned: bool,
    },
    PurchaseOrderApproved(Uuid),
    PurchaseOrderReceived {
        purchase_order_id: Uuid,
        receipt_id: Uuid,
        units: i64,
    },
    StockAdjusted {
        movement_id: Uuid,
        product_id: Option<Uuid>,
        variant_id: Option<Uuid>,
        qty_delta: i32,
    },
    StockMovementVoided {
        movement_id: Uuid,
        voided_movement_id: Uuid,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::OrderConfirmed { .. } => "order.confirmed",
            Event::OrderCancelled { .. } => "order.cancelled",
            Event::OrderReturned { .. } => "order.returned",
            Event::PurchaseOrderApproved(_) => "purchase_order.approved",
            Event::PurchaseOrderReceived { .. } => "purchase_order.received",
            Event::StockAdjusted { .. } => "stock.adjusted",
            Event::StockMovementVoided { .. } => "stock.movement_voided",
        }
    }
}

/// Drains the event channel, logging each event until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match serde_json::to_string(&event) {
            Ok(payload) => info!(event = event.name(), %payload, "Domain event"),
            Err(_) => info!(event = event.name(), "Domain event: {:?}", event),
        }
    }

    info!("Event processing loop stopped");
}
