use super::OrderTransition;
use crate::{
    commands::Command,
    db::{self, DbPool},
    entities::{
        order, order_item,
        sea_orm_active_enums::{FulfillmentStatus, MovementType, OrderStatus, PaymentStatus},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    metrics::{record_transition, register_int_counter},
    repositories::OrderRepository,
    services::{
        idempotency::{scoped_key, IdempotencyKey, Operation},
        ledger::{LedgerWriter, NewMovement},
        stock::StockTarget,
    },
};
use chrono::Utc;
use lazy_static::lazy_static;
use prometheus::IntCounter;
use sea_orm::{ActiveModelTrait, IntoActiveModel, Set};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

lazy_static! {
    static ref ORDER_CANCELLATIONS: IntCounter = register_int_counter(
        "order_cancellations_total",
        "Total number of order cancellations"
    );
    static ref ORDER_CANCELLATION_FAILURES: IntCounter = register_int_counter(
        "order_cancellation_failures_total",
        "Total number of failed order cancellations"
    );
}

/// Releases every reservation of an unshipped order and cancels it.
#[derive(Debug, Clone)]
pub struct CancelOrderCommand {
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub idempotency_key: Option<IdempotencyKey>,
}

#[async_trait::async_trait]
impl Command for CancelOrderCommand {
    type Result = OrderTransition;

    #[instrument(skip(self, db_pool, event_sender), fields(order_id = %self.order_id, idempotency_key = ?self.idempotency_key))]
    async fn execute(
        &self,
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
    ) -> Result<Self::Result, ServiceError> {
        let (transition, released_units) = match self.cancel_in_db(&db_pool).await {
            Ok(outcome) => outcome,
            Err(e) => {
                ORDER_CANCELLATION_FAILURES.inc();
                record_transition("order.cancel", "failed");
                warn!(order_id = %self.order_id, error = %e, "Order cancellation rejected");
                return Err(e);
            }
        };

        if transition.applied {
            self.log_and_trigger_event(&event_sender, released_units).await;
            ORDER_CANCELLATIONS.inc();
            record_transition("order.cancel", "applied");
        } else {
            record_transition("order.cancel", "noop");
        }

        Ok(transition)
    }
}

impl CancelOrderCommand {
    async fn cancel_in_db(&self, db: &DbPool) -> Result<(OrderTransition, i64), ServiceError> {
        let order_id = self.order_id;
        let user_id = self.user_id;
        let key = self.idempotency_key.clone();

        db::transaction(db, "order.cancel", move |txn| {
            Box::pin(async move {
                let order = OrderRepository::find_owned(txn, user_id, order_id).await?;
                let items = OrderRepository::items(txn, order_id).await?;

                if order.status == OrderStatus::Cancelled {
                    return Ok((
                        OrderTransition {
                            order,
                            items,
                            applied: false,
                        },
                        0,
                    ));
                }

                if items.iter().any(|item| item.qty_shipped > 0) {
                    return Err(ServiceError::AlreadyShipped(order_id));
                }

                let version = OrderRepository::bump_version(txn, order_id, order.version).await?;

                let mut released_units = 0i64;
                let mut updated_items = Vec::with_capacity(items.len());
                for item in items {
                    if item.qty_reserved <= 0 {
                        updated_items.push(item);
                        continue;
                    }

                    let movement = NewMovement::reservation_intent(
                        StockTarget::resolve(item.product_id, item.variant_id),
                        MovementType::Release,
                        item.id,
                        user_id,
                    )
                    .with_reference(Some(order.order_number.clone()))
                    .with_idempotency_key(scoped_key(key.as_ref(), Operation::Release, item.id));

                    let recorded = LedgerWriter::post(txn, movement).await?;
                    if recorded.already_applied {
                        updated_items.push(item);
                        continue;
                    }

                    released_units += i64::from(item.qty_reserved);
                    let mut active: order_item::ActiveModel = item.into_active_model();
                    active.qty_reserved = Set(0);
                    updated_items.push(active.update(txn).await?);
                }

                let payment_status = if order.payment_status == PaymentStatus::Paid {
                    PaymentStatus::Refunded
                } else {
                    PaymentStatus::Cancelled
                };

                let mut active: order::ActiveModel = order.into_active_model();
                active.status = Set(OrderStatus::Cancelled);
                active.fulfillment_status = Set(FulfillmentStatus::Cancelled);
                active.payment_status = Set(payment_status);
                active.cancelled_at = Set(Some(Utc::now()));
                active.version = Set(version);
                let order = active.update(txn).await?;

                Ok((
                    OrderTransition {
                        order,
                        items: updated_items,
                        applied: true,
                    },
                    released_units,
                ))
            })
        })
        .await
    }

    async fn log_and_trigger_event(&self, event_sender: &EventSender, released_units: i64) {
        info!(
            order_id = %self.order_id,
            released_units,
            "Order cancelled"
        );
        event_sender
            .publish(Event::OrderCancelled {
                order_id: self.order_id,
                released_units,
            })
            .await;
    }
}
