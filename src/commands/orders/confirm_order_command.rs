use super::OrderTransition;
use crate::{
    commands::Command,
    db::{self, DbPool},
    entities::{
        order, order_item,
        sea_orm_active_enums::{MovementType, OrderStatus},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    metrics::{record_transition, register_int_counter},
    repositories::OrderRepository,
    services::{
        fulfillment::{derive_fulfillment_status, ItemCounters},
        idempotency::{scoped_key, IdempotencyKey, Operation},
        ledger::{LedgerWriter, NewMovement},
        stock::StockTarget,
    },
};
use lazy_static::lazy_static;
use prometheus::IntCounter;
use sea_orm::{ActiveModelTrait, IntoActiveModel, Set};
use std::sync::Arc;
use tracing::{error, info, instrument};
use uuid::Uuid;

lazy_static! {
    static ref ORDERS_CONFIRMED: IntCounter =
        register_int_counter("orders_confirmed_total", "Total number of orders confirmed");
    static ref ORDER_CONFIRM_FAILURES: IntCounter = register_int_counter(
        "order_confirm_failures_total",
        "Total number of failed order confirmations"
    );
}

/// Reserves every unreserved unit of a PENDING order and moves it to
/// CONFIRMED. Orders already past PENDING are returned unchanged.
#[derive(Debug, Clone)]
pub struct ConfirmOrderCommand {
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub idempotency_key: Option<IdempotencyKey>,
}

#[async_trait::async_trait]
impl Command for ConfirmOrderCommand {
    type Result = OrderTransition;

    #[instrument(skip(self, db_pool, event_sender), fields(order_id = %self.order_id, idempotency_key = ?self.idempotency_key))]
    async fn execute(
        &self,
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
    ) -> Result<Self::Result, ServiceError> {
        let (transition, reserved_units) = match self.confirm_in_db(&db_pool).await {
            Ok(outcome) => outcome,
            Err(e) => {
                ORDER_CONFIRM_FAILURES.inc();
                record_transition("order.confirm", "failed");
                error!(order_id = %self.order_id, error = %e, "Failed to confirm order");
                return Err(e);
            }
        };

        if transition.applied {
            self.log_and_trigger_event(&event_sender, reserved_units).await;
            ORDERS_CONFIRMED.inc();
            record_transition("order.confirm", "applied");
        } else {
            record_transition("order.confirm", "noop");
        }

        Ok(transition)
    }
}

impl ConfirmOrderCommand {
    async fn confirm_in_db(&self, db: &DbPool) -> Result<(OrderTransition, i64), ServiceError> {
        let order_id = self.order_id;
        let user_id = self.user_id;
        let key = self.idempotency_key.clone();

        db::transaction(db, "order.confirm", move |txn| {
            Box::pin(async move {
                let order = OrderRepository::find_owned(txn, user_id, order_id).await?;
                let items = OrderRepository::items(txn, order_id).await?;

                if order.status != OrderStatus::Pending {
                    info!(%order_id, status = %order.status, "Order already confirmed; nothing to do");
                    return Ok((
                        OrderTransition {
                            order,
                            items,
                            applied: false,
                        },
                        0,
                    ));
                }

                if items.is_empty() {
                    return Err(ServiceError::EmptyItems(order_id));
                }

                let version = OrderRepository::bump_version(txn, order_id, order.version).await?;

                let mut reserved_units = 0i64;
                let mut updated_items = Vec::with_capacity(items.len());
                for item in items {
                    let remain = ItemCounters::from(&item).reserve_remainder();
                    if remain == 0 {
                        updated_items.push(item);
                        continue;
                    }

                    let movement = NewMovement::reservation_intent(
                        StockTarget::resolve(item.product_id, item.variant_id),
                        MovementType::Reserve,
                        item.id,
                        user_id,
                    )
                    .with_reference(Some(order.order_number.clone()))
                    .with_idempotency_key(scoped_key(key.as_ref(), Operation::Reserve, item.id));

                    let recorded = LedgerWriter::post(txn, movement).await?;
                    if recorded.already_applied {
                        updated_items.push(item);
                        continue;
                    }

                    let reserved = item.qty_reserved + remain;
                    let mut active: order_item::ActiveModel = item.into_active_model();
                    active.qty_reserved = Set(reserved);
                    updated_items.push(active.update(txn).await?);
                    reserved_units += i64::from(remain);
                }

                let counters: Vec<ItemCounters> =
                    updated_items.iter().map(ItemCounters::from).collect();
                let mut active: order::ActiveModel = order.into_active_model();
                active.status = Set(OrderStatus::Confirmed);
                active.fulfillment_status = Set(derive_fulfillment_status(&counters));
                active.version = Set(version);
                let order = active.update(txn).await?;

                Ok((
                    OrderTransition {
                        order,
                        items: updated_items,
                        applied: true,
                    },
                    reserved_units,
                ))
            })
        })
        .await
    }

    async fn log_and_trigger_event(&self, event_sender: &EventSender, reserved_units: i64) {
        info!(
            order_id = %self.order_id,
            reserved_units,
            "Order confirmed"
        );
        event_sender
            .publish(Event::OrderConfirmed {
                order_id: self.order_id,
                reserved_units,
            })
            .await;
    }
}
