use crate::{
    commands::orders::{
        CancelOrderCommand, ConfirmOrderCommand, OrderTransition, ReturnOrderCommand,
        ReturnRequestItem,
    },
    db::DbPool,
    entities::{order, order_item},
    errors::ServiceError,
    events::EventSender,
    middleware_helpers::RetryConfig,
    repositories::OrderRepository,
    services::{execute_with_retry, idempotency::IdempotencyKey},
};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// Order state machine entry points used by the HTTP layer.
#[derive(Clone)]
pub struct OrderService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    retry: RetryConfig,
}

impl OrderService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>, retry: RetryConfig) -> Self {
        Self {
            db_pool,
            event_sender,
            retry,
        }
    }

    #[instrument(skip(self))]
    pub async fn get_order(
        &self,
        user_id: Uuid,
        order_id: Uuid,
    ) -> Result<(order::Model, Vec<order_item::Model>), ServiceError> {
        let db = &*self.db_pool;
        let order = OrderRepository::find_owned(db, user_id, order_id).await?;
        let items = OrderRepository::items(db, order_id).await?;
        Ok((order, items))
    }

    #[instrument(skip(self), fields(idempotency_key = ?idempotency_key))]
    pub async fn confirm(
        &self,
        user_id: Uuid,
        order_id: Uuid,
        idempotency_key: Option<IdempotencyKey>,
    ) -> Result<OrderTransition, ServiceError> {
        let command = ConfirmOrderCommand {
            order_id,
            user_id,
            idempotency_key,
        };
        execute_with_retry(&self.retry, &self.db_pool, &self.event_sender, &command).await
    }

    #[instrument(skip(self), fields(idempotency_key = ?idempotency_key))]
    pub async fn cancel(
        &self,
        user_id: Uuid,
        order_id: Uuid,
        idempotency_key: Option<IdempotencyKey>,
    ) -> Result<OrderTransition, ServiceError> {
        let command = CancelOrderCommand {
            order_id,
            user_id,
            idempotency_key,
        };
        execute_with_retry(&self.retry, &self.db_pool, &self.event_sender, &command).await
    }

    #[instrument(skip(self, items, note), fields(item_count = items.len(), idempotency_key = ?idempotency_key))]
    pub async fn return_items(
        &self,
        user_id: Uuid,
        order_id: Uuid,
        items: Vec<ReturnRequestItem>,
        note: Option<String>,
        idempotency_key: Option<IdempotencyKey>,
    ) -> Result<OrderTransition, ServiceError> {
        let command = ReturnOrderCommand {
            order_id,
            user_id,
            items,
            note,
            idempotency_key,
        };
        execute_with_retry(&self.retry, &self.db_pool, &self.event_sender, &command).await
    }
}
