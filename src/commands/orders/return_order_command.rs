use super::OrderTransition;
use crate::{
    commands::Command,
    db::{self, DbPool},
    entities::{
        order, order_item,
        sea_orm_active_enums::{
            FulfillmentStatus, MovementSource, MovementType, OrderStatus,
        },
    },
    errors::ServiceError,
    events::{Event, EventSender},
    metrics::{record_transition, register_int_counter},
    repositories::OrderRepository,
    services::{
        fulfillment::{
            derive_fulfillment_status, derive_order_status, is_fully_returned, ItemCounters,
        },
        idempotency::{scoped_key, IdempotencyKey, Operation},
        ledger::{LedgerWriter, NewMovement},
        stock::StockTarget,
    },
};
use chrono::Utc;
use lazy_static::lazy_static;
use prometheus::IntCounter;
use sea_orm::{ActiveModelTrait, IntoActiveModel, Set};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

lazy_static! {
    static ref ORDER_RETURNS: IntCounter =
        register_int_counter("order_returns_total", "Total number of order returns processed");
    static ref ORDER_RETURN_FAILURES: IntCounter = register_int_counter(
        "order_return_failures_total",
        "Total number of rejected order returns"
    );
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReturnRequestItem {
    pub order_item_id: Uuid,
    pub qty: i32,
}

/// Restocks shipped units coming back from the customer.
#[derive(Debug, Clone)]
pub struct ReturnOrderCommand {
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub items: Vec<ReturnRequestItem>,
    pub note: Option<String>,
    pub idempotency_key: Option<IdempotencyKey>,
}

#[derive(Debug, Default)]
struct ReturnOutcome {
    returned_units: i64,
    fully_returned: bool,
}

impl ReturnOrderCommand {
    /// De-duplicates the request into `order_item_id -> qty`. A later entry
    /// for the same item replaces an earlier one; non-positive quantities
    /// are dropped.
    pub fn requested_quantities(items: &[ReturnRequestItem]) -> HashMap<Uuid, i32> {
        let mut requested = HashMap::with_capacity(items.len());
        for item in items {
            requested.insert(item.order_item_id, item.qty);
        }
        requested.retain(|_, qty| *qty > 0);
        requested
    }
}

#[async_trait::async_trait]
impl Command for ReturnOrderCommand {
    type Result = OrderTransition;

    #[instrument(skip(self, db_pool, event_sender), fields(order_id = %self.order_id, idempotency_key = ?self.idempotency_key))]
    async fn execute(
        &self,
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
    ) -> Result<Self::Result, ServiceError> {
        let (transition, outcome) = match self.return_in_db(&db_pool).await {
            Ok(result) => result,
            Err(e) => {
                ORDER_RETURN_FAILURES.inc();
                record_transition("order.return", "failed");
                warn!(order_id = %self.order_id, error = %e, "Order return rejected");
                return Err(e);
            }
        };

        if transition.applied {
            self.log_and_trigger_event(&event_sender, &outcome).await;
            ORDER_RETURNS.inc();
            record_transition("order.return", "applied");
        } else {
            record_transition("order.return", "noop");
        }

        Ok(transition)
    }
}

impl ReturnOrderCommand {
    async fn return_in_db(&self, db: &DbPool) -> Result<(OrderTransition, ReturnOutcome), ServiceError> {
        let requested = Self::requested_quantities(&self.items);
        if requested.is_empty() {
            return Err(ServiceError::ReturnItemsRequired);
        }

        let order_id = self.order_id;
        let user_id = self.user_id;
        let key = self.idempotency_key.clone();
        let note = self.note.clone();

        db::transaction(db, "order.return", move |txn| {
            Box::pin(async move {
                let order = OrderRepository::find_owned(txn, user_id, order_id).await?;
                if order.status == OrderStatus::Cancelled {
                    return Err(ServiceError::OrderCancelled(order_id));
                }

                let items = OrderRepository::items(txn, order_id).await?;
                if let Some(unknown) = requested
                    .keys()
                    .find(|id| !items.iter().any(|item| item.id == **id))
                {
                    return Err(ServiceError::ReturnItemNotFound(*unknown));
                }

                let mut accepted: Vec<(usize, i32, Option<String>)> = Vec::new();
                for (idx, item) in items.iter().enumerate() {
                    let Some(qty) = requested.get(&item.id) else {
                        continue;
                    };
                    let qty = ItemCounters::from(item).accept_return(*qty);
                    if qty == 0 {
                        continue;
                    }
                    let movement_key = scoped_key(key.as_ref(), Operation::Return, item.id);
                    if let Some(k) = movement_key.as_deref() {
                        if LedgerWriter::find_by_key(txn, k).await?.is_some() {
                            continue;
                        }
                    }
                    accepted.push((idx, qty, movement_key));
                }

                // Nothing returnable, or every line replayed: leave the order as it is.
                if accepted.is_empty() {
                    info!(%order_id, "No returnable units in request");
                    return Ok((
                        OrderTransition {
                            order,
                            items,
                            applied: false,
                        },
                        ReturnOutcome::default(),
                    ));
                }

                let version = OrderRepository::bump_version(txn, order_id, order.version).await?;

                let mut updated_items = items;
                let mut returned_units = 0i64;
                for (idx, qty, movement_key) in accepted {
                    let item = updated_items[idx].clone();
                    let movement = NewMovement::new(
                        StockTarget::resolve(item.product_id, item.variant_id),
                        MovementType::ReturnIn,
                        MovementSource::Order,
                        qty,
                        user_id,
                    )
                    .with_order_item(item.id)
                    .with_reference(Some(order.order_number.clone()))
                    .with_note(note.clone())
                    .with_idempotency_key(movement_key);

                    let recorded = LedgerWriter::post(txn, movement).await?;
                    if recorded.already_applied {
                        continue;
                    }

                    let returned = item.qty_returned + qty;
                    let mut active: order_item::ActiveModel = item.into_active_model();
                    active.qty_returned = Set(returned);
                    updated_items[idx] = active.update(txn).await?;
                    returned_units += i64::from(qty);
                }

                let counters: Vec<ItemCounters> =
                    updated_items.iter().map(ItemCounters::from).collect();
                let fully_returned = is_fully_returned(&counters);
                let previous_status = order.status;

                let mut active: order::ActiveModel = order.into_active_model();
                if fully_returned {
                    active.status = Set(OrderStatus::Returned);
                    active.fulfillment_status = Set(FulfillmentStatus::Returned);
                    active.returned_at = Set(Some(Utc::now()));
                } else {
                    active.fulfillment_status = Set(derive_fulfillment_status(&counters));
                    if previous_status != OrderStatus::Delivered {
                        active.status = Set(derive_order_status(&counters));
                    }
                }
                active.version = Set(version);
                let order = active.update(txn).await?;

                Ok((
                    OrderTransition {
                        order,
                        items: updated_items,
                        applied: true,
                    },
                    ReturnOutcome {
                        returned_units,
                        fully_returned,
                    },
                ))
            })
        })
        .await
    }

    async fn log_and_trigger_event(&self, event_sender: &EventSender, outcome: &ReturnOutcome) {
        info!(
            order_id = %self.order_id,
            returned_units = outcome.returned_units,
            fully_returned = outcome.fully_returned,
            "Order return processed"
        );
        event_sender
            .publish(Event::OrderReturned {
                order_id: self.order_id,
                returned_units: outcome.returned_units,
                fully_returned: outcome.fully_returned,
            })
            .await;
    }
}
