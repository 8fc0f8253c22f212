use crate::{
    commands::Command,
    db::{self, DbPool},
    errors::ServiceError,
    events::{Event, EventSender},
    metrics::{record_transition, register_int_counter},
    repositories::ProductRepository,
    services::{
        idempotency::{scoped_key, IdempotencyKey, Operation},
        ledger::{LedgerWriter, RecordedMovement},
    },
};
use lazy_static::lazy_static;
use prometheus::IntCounter;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

lazy_static! {
    static ref MOVEMENT_VOIDS: IntCounter =
        register_int_counter("stock_movement_voids_total", "Total number of voided movements");
    static ref MOVEMENT_VOID_FAILURES: IntCounter = register_int_counter(
        "stock_movement_void_failures_total",
        "Total number of rejected void requests"
    );
}

/// Reverses a physical movement with a compensating VOID row. Order item
/// and purchase order line counters are not touched.
#[derive(Debug, Clone)]
pub struct VoidMovementCommand {
    pub movement_id: Uuid,
    pub user_id: Uuid,
    pub note: Option<String>,
    pub idempotency_key: Option<IdempotencyKey>,
}

#[async_trait::async_trait]
impl Command for VoidMovementCommand {
    type Result = RecordedMovement;

    #[instrument(skip(self, db_pool, event_sender), fields(movement_id = %self.movement_id, idempotency_key = ?self.idempotency_key))]
    async fn execute(
        &self,
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
    ) -> Result<Self::Result, ServiceError> {
        let recorded = match self.void_in_db(&db_pool).await {
            Ok(recorded) => recorded,
            Err(e) => {
                MOVEMENT_VOID_FAILURES.inc();
                record_transition("stock.void", "failed");
                warn!(movement_id = %self.movement_id, error = %e, "Void rejected");
                return Err(e);
            }
        };

        if recorded.already_applied {
            record_transition("stock.void", "noop");
            return Ok(recorded);
        }

        info!(movement_id = %self.movement_id, void_id = %recorded.movement.id, "Movement voided");
        event_sender
            .publish(Event::StockMovementVoided {
                movement_id: recorded.movement.id,
                voided_movement_id: self.movement_id,
            })
            .await;
        MOVEMENT_VOIDS.inc();
        record_transition("stock.void", "applied");

        Ok(recorded)
    }
}

impl VoidMovementCommand {
    async fn void_in_db(&self, db: &DbPool) -> Result<RecordedMovement, ServiceError> {
        let movement_id = self.movement_id;
        let user_id = self.user_id;
        let note = self.note.clone();
        let key = scoped_key(self.idempotency_key.as_ref(), Operation::Void, movement_id);

        db::transaction(db, "stock.void", move |txn| {
            Box::pin(async move {
                let original = ProductRepository::find_owned_movement(txn, user_id, movement_id).await?;
                LedgerWriter::void(txn, &original, key, note, user_id).await
            })
        })
        .await
    }
}
