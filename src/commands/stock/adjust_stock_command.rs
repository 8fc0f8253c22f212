use crate::{
    commands::Command,
    db::{self, DbPool},
    entities::sea_orm_active_enums::{MovementSource, MovementType},
    errors::ServiceError,
    events::{Event, EventSender},
    metrics::{record_transition, register_int_counter},
    repositories::ProductRepository,
    services::{
        idempotency::{scoped_key, IdempotencyKey, Operation},
        ledger::{LedgerWriter, NewMovement, RecordedMovement, MAX_MOVEMENT_QTY},
    },
};
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use prometheus::IntCounter;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

lazy_static! {
    static ref STOCK_ADJUSTMENTS: IntCounter = register_int_counter(
        "stock_adjustments_total",
        "Total number of manual stock adjustments"
    );
    static ref STOCK_ADJUSTMENT_FAILURES: IntCounter = register_int_counter(
        "stock_adjustment_failures_total",
        "Total number of rejected manual stock adjustments"
    );
}

/// Manual correction of on-hand stock, recorded as an ADJUST movement.
#[derive(Debug, Clone)]
pub struct AdjustStockCommand {
    pub user_id: Uuid,
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub qty_delta: i32,
    pub reference: Option<String>,
    pub note: Option<String>,
    pub occurred_at: Option<DateTime<Utc>>,
    pub idempotency_key: Option<IdempotencyKey>,
}

#[async_trait::async_trait]
impl Command for AdjustStockCommand {
    type Result = RecordedMovement;

    #[instrument(skip(self, db_pool, event_sender), fields(product_id = %self.product_id, qty_delta = self.qty_delta))]
    async fn execute(
        &self,
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
    ) -> Result<Self::Result, ServiceError> {
        let recorded = match self.adjust_in_db(&db_pool).await {
            Ok(recorded) => recorded,
            Err(e) => {
                STOCK_ADJUSTMENT_FAILURES.inc();
                record_transition("stock.adjust", "failed");
                warn!(product_id = %self.product_id, error = %e, "Stock adjustment rejected");
                return Err(e);
            }
        };

        if recorded.already_applied {
            record_transition("stock.adjust", "noop");
            return Ok(recorded);
        }

        let movement = &recorded.movement;
        info!(
            movement_id = %movement.id,
            product_id = ?movement.product_id,
            variant_id = ?movement.variant_id,
            qty_delta = movement.qty_delta,
            "Stock adjusted"
        );
        event_sender
            .publish(Event::StockAdjusted {
                movement_id: movement.id,
                product_id: movement.product_id,
                variant_id: movement.variant_id,
                qty_delta: movement.qty_delta,
            })
            .await;
        STOCK_ADJUSTMENTS.inc();
        record_transition("stock.adjust", "applied");

        Ok(recorded)
    }
}

impl AdjustStockCommand {
    async fn adjust_in_db(&self, db: &DbPool) -> Result<RecordedMovement, ServiceError> {
        if self.qty_delta == 0 {
            return Err(ServiceError::InvalidQuantity(
                "qtyDelta must be non-zero".to_string(),
            ));
        }
        if self.qty_delta.unsigned_abs() > MAX_MOVEMENT_QTY.unsigned_abs() {
            return Err(ServiceError::InvalidQuantity(format!(
                "qtyDelta must be between -{0} and {0}",
                MAX_MOVEMENT_QTY
            )));
        }

        let command = self.clone();
        db::transaction(db, "stock.adjust", move |txn| {
            Box::pin(async move {
                let target = ProductRepository::owned_target(
                    txn,
                    command.user_id,
                    command.product_id,
                    command.variant_id,
                )
                .await?;

                let mut movement = NewMovement::new(
                    target,
                    MovementType::Adjust,
                    MovementSource::Manual,
                    command.qty_delta,
                    command.user_id,
                )
                .with_reference(command.reference)
                .with_note(command.note)
                .with_idempotency_key(scoped_key(
                    command.idempotency_key.as_ref(),
                    Operation::Adjust,
                    target.id(),
                ));
                if let Some(occurred_at) = command.occurred_at {
                    movement = movement.occurred_at(occurred_at);
                }

                LedgerWriter::post(txn, movement).await
            })
        })
        .await
    }
}
