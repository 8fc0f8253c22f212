use crate::{
    commands::purchaseorders::{
        ApprovePurchaseOrderCommand, PurchaseOrderTransition, ReceiptOutcome, ReceiveLine,
        ReceivePurchaseOrderCommand,
    },
    db::DbPool,
    entities::{purchase_order, purchase_order_line},
    errors::ServiceError,
    events::EventSender,
    middleware_helpers::RetryConfig,
    repositories::PurchaseOrderRepository,
    services::{execute_with_retry, idempotency::IdempotencyKey},
};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

#[derive(Clone)]
pub struct PurchaseOrderService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    retry: RetryConfig,
}

impl PurchaseOrderService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>, retry: RetryConfig) -> Self {
        Self {
            db_pool,
            event_sender,
            retry,
        }
    }

    #[instrument(skip(self))]
    pub async fn get_purchase_order(
        &self,
        user_id: Uuid,
        purchase_order_id: Uuid,
    ) -> Result<(purchase_order::Model, Vec<purchase_order_line::Model>), ServiceError> {
        let db = &*self.db_pool;
        let purchase_order = PurchaseOrderRepository::find_owned(db, user_id, purchase_order_id).await?;
        let lines = PurchaseOrderRepository::lines(db, purchase_order_id).await?;
        Ok((purchase_order, lines))
    }

    #[instrument(skip(self))]
    pub async fn approve(
        &self,
        user_id: Uuid,
        purchase_order_id: Uuid,
    ) -> Result<PurchaseOrderTransition, ServiceError> {
        let command = ApprovePurchaseOrderCommand {
            purchase_order_id,
            user_id,
        };
        execute_with_retry(&self.retry, &self.db_pool, &self.event_sender, &command).await
    }

    #[instrument(skip(self, lines, note), fields(line_count = lines.len(), idempotency_key = ?idempotency_key))]
    pub async fn receive(
        &self,
        user_id: Uuid,
        purchase_order_id: Uuid,
        lines: Vec<ReceiveLine>,
        note: Option<String>,
        idempotency_key: Option<IdempotencyKey>,
    ) -> Result<ReceiptOutcome, ServiceError> {
        let command = ReceivePurchaseOrderCommand {
            purchase_order_id,
            user_id,
            lines,
            note,
            idempotency_key,
        };
        execute_with_retry(&self.retry, &self.db_pool, &self.event_sender, &command).await
    }
}
