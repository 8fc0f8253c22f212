use async_trait::async_trait;
use chrono::Utc;
use lazy_static::lazy_static;
use prometheus::IntCounter;
use sea_orm::{ActiveModelTrait, IntoActiveModel, Set};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::PurchaseOrderTransition;
use crate::{
    commands::Command,
    db::{self, DbPool},
    entities::{purchase_order, sea_orm_active_enums::PurchaseOrderStatus},
    errors::ServiceError,
    events::{Event, EventSender},
    metrics::{record_transition, register_int_counter},
    repositories::PurchaseOrderRepository,
};

lazy_static! {
    static ref PURCHASE_ORDER_APPROVALS: IntCounter = register_int_counter(
        "purchase_order_approvals_total",
        "Total number of purchase orders approved"
    );
    static ref PURCHASE_ORDER_APPROVAL_FAILURES: IntCounter = register_int_counter(
        "purchase_order_approval_failures_total",
        "Total number of rejected purchase order approvals"
    );
}

#[derive(Debug, Clone)]
pub struct ApprovePurchaseOrderCommand {
    pub purchase_order_id: Uuid,
    pub user_id: Uuid,
}

#[async_trait]
impl Command for ApprovePurchaseOrderCommand {
    type Result = PurchaseOrderTransition;

    #[instrument(skip(self, db_pool, event_sender), fields(purchase_order_id = %self.purchase_order_id))]
    async fn execute(
        &self,
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
    ) -> Result<Self::Result, ServiceError> {
        let transition = match self.approve_in_db(&db_pool).await {
            Ok(transition) => transition,
            Err(e) => {
                PURCHASE_ORDER_APPROVAL_FAILURES.inc();
                record_transition("purchase_order.approve", "failed");
                warn!(purchase_order_id = %self.purchase_order_id, error = %e, "Purchase order approval rejected");
                return Err(e);
            }
        };

        if transition.applied {
            info!(
                purchase_order_id = %self.purchase_order_id,
                po_number = %transition.purchase_order.po_number,
                "Purchase order approved"
            );
            event_sender
                .publish(Event::PurchaseOrderApproved(self.purchase_order_id))
                .await;
            PURCHASE_ORDER_APPROVALS.inc();
            record_transition("purchase_order.approve", "applied");
        } else {
            record_transition("purchase_order.approve", "noop");
        }

        Ok(transition)
    }
}

impl ApprovePurchaseOrderCommand {
    async fn approve_in_db(&self, db: &DbPool) -> Result<PurchaseOrderTransition, ServiceError> {
        let purchase_order_id = self.purchase_order_id;
        let user_id = self.user_id;

        db::transaction(db, "purchase_order.approve", move |txn| {
            Box::pin(async move {
                let purchase_order =
                    PurchaseOrderRepository::find_owned(txn, user_id, purchase_order_id).await?;
                let lines = PurchaseOrderRepository::lines(txn, purchase_order_id).await?;

                match purchase_order.status {
                    PurchaseOrderStatus::Draft => {}
                    PurchaseOrderStatus::Approved => {
                        return Ok(PurchaseOrderTransition {
                            purchase_order,
                            lines,
                            applied: false,
                        });
                    }
                    other => {
                        return Err(ServiceError::InvalidTransition {
                            action: "approve",
                            from: other.to_string(),
                        });
                    }
                }

                if lines.is_empty() {
                    return Err(ServiceError::PurchaseOrderLinesRequired(purchase_order_id));
                }

                let version = PurchaseOrderRepository::bump_version(
                    txn,
                    purchase_order_id,
                    purchase_order.version,
                )
                .await?;

                let mut active: purchase_order::ActiveModel = purchase_order.into_active_model();
                active.status = Set(PurchaseOrderStatus::Approved);
                active.approved_at = Set(Some(Utc::now()));
                active.version = Set(version);
                let purchase_order = active.update(txn).await?;

                Ok(PurchaseOrderTransition {
                    purchase_order,
                    lines,
                    applied: true,
                })
            })
        })
        .await
    }
}
