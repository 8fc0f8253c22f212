//! The stock movement ledger.
//!
//! Rows are appended, never updated or deleted. Every physical change to an
//! on-hand counter goes through [`LedgerWriter::post`], which writes the row
//! and applies its delta through the [`StockProjector`] in the same
//! transaction. Reservation intents are written as zero-delta rows and never
//! reach the projector.

use crate::{
    entities::{
        sea_orm_active_enums::{MovementSource, MovementType},
        stock_movement,
    },
    errors::ServiceError,
    metrics::{IDEMPOTENT_REPLAYS, LEDGER_MOVEMENTS},
    services::stock::{StockProjector, StockTarget},
};
use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set};
use tracing::{debug, info};
use uuid::Uuid;

/// Largest quantity a single movement may carry in either direction.
pub const MAX_MOVEMENT_QTY: i32 = 1_000_000_000;

/// What a movement does to stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovementKind {
    Physical(i32),
    ReservationIntent,
}

impl MovementKind {
    pub fn stock_delta(self) -> i32 {
        match self {
            MovementKind::Physical(delta) => delta,
            MovementKind::ReservationIntent => 0,
        }
    }
}

/// A ledger row about to be written.
#[derive(Debug, Clone)]
pub struct NewMovement {
    pub target: StockTarget,
    pub movement_type: MovementType,
    pub source: MovementSource,
    pub qty_delta: i32,
    pub occurred_at: DateTime<Utc>,
    pub order_item_id: Option<Uuid>,
    pub receipt_item_id: Option<Uuid>,
    pub voided_movement_id: Option<Uuid>,
    pub reference: Option<String>,
    pub note: Option<String>,
    pub idempotency_key: Option<String>,
    pub user_id: Uuid,
}

impl NewMovement {
    pub fn new(
        target: StockTarget,
        movement_type: MovementType,
        source: MovementSource,
        qty_delta: i32,
        user_id: Uuid,
    ) -> Self {
        Self {
            target,
            movement_type,
            source,
            qty_delta,
            occurred_at: Utc::now(),
            order_item_id: None,
            receipt_item_id: None,
            voided_movement_id: None,
            reference: None,
            note: None,
            idempotency_key: None,
            user_id,
        }
    }

    /// A zero-delta RESERVE or RELEASE row for an order item.
    pub fn reservation_intent(
        target: StockTarget,
        movement_type: MovementType,
        order_item_id: Uuid,
        user_id: Uuid,
    ) -> Self {
        Self::new(target, movement_type, MovementSource::Order, 0, user_id)
            .with_order_item(order_item_id)
    }

    pub fn with_order_item(mut self, order_item_id: Uuid) -> Self {
        self.order_item_id = Some(order_item_id);
        self
    }

    pub fn with_receipt_item(mut self, receipt_item_id: Uuid) -> Self {
        self.receipt_item_id = Some(receipt_item_id);
        self
    }

    pub fn with_idempotency_key(mut self, key: Option<String>) -> Self {
        self.idempotency_key = key;
        self
    }

    pub fn with_reference(mut self, reference: Option<String>) -> Self {
        self.reference = reference;
        self
    }

    pub fn with_note(mut self, note: Option<String>) -> Self {
        self.note = note;
        self
    }

    pub fn occurred_at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = occurred_at;
        self
    }

    pub fn kind(&self) -> MovementKind {
        if self.movement_type.is_reservation_intent() {
            MovementKind::ReservationIntent
        } else {
            MovementKind::Physical(self.qty_delta)
        }
    }

    /// Checks the delta sign against the movement type.
    fn validate(&self) -> Result<(), ServiceError> {
        let delta = self.qty_delta;
        if delta.unsigned_abs() > MAX_MOVEMENT_QTY.unsigned_abs() {
            return Err(ServiceError::InvalidQuantity(format!(
                "qtyDelta {} exceeds the per-movement limit of {}",
                delta, MAX_MOVEMENT_QTY
            )));
        }
        let ok = match self.movement_type {
            MovementType::Reserve | MovementType::Release => delta == 0,
            MovementType::In | MovementType::ReturnIn => delta > 0,
            MovementType::Out => delta < 0,
            MovementType::Adjust | MovementType::Void => delta != 0,
        };
        if ok {
            Ok(())
        } else {
            Err(ServiceError::InvalidQuantity(format!(
                "qtyDelta {} is not valid for a {} movement",
                delta, self.movement_type
            )))
        }
    }
}

/// Result of writing a movement. When `already_applied` is set, a row with
/// the same idempotency key existed and the caller must skip every dependent
/// counter mutation.
#[derive(Debug, Clone)]
pub struct RecordedMovement {
    pub movement: stock_movement::Model,
    pub already_applied: bool,
}

pub struct LedgerWriter;

impl LedgerWriter {
    /// Appends one immutable row inside the caller's transaction.
    pub async fn record<C>(db: &C, new: NewMovement) -> Result<RecordedMovement, ServiceError>
    where
        C: ConnectionTrait,
    {
        new.validate()?;

        if let Some(key) = new.idempotency_key.as_deref() {
            if let Some(existing) = Self::find_by_key(db, key).await? {
                IDEMPOTENT_REPLAYS.inc();
                debug!(idempotency_key = key, movement_id = %existing.id, "Movement already applied");
                return Ok(RecordedMovement {
                    movement: existing,
                    already_applied: true,
                });
            }
        }

        let (product_id, variant_id) = new.target.columns();
        let conflict_id = new.target.id();
        let row = stock_movement::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(product_id),
            variant_id: Set(variant_id),
            r#type: Set(new.movement_type),
            source: Set(new.source),
            qty_delta: Set(new.qty_delta),
            occurred_at: Set(new.occurred_at),
            order_item_id: Set(new.order_item_id),
            receipt_item_id: Set(new.receipt_item_id),
            voided_movement_id: Set(new.voided_movement_id),
            reference: Set(new.reference),
            note: Set(new.note),
            idempotency_key: Set(new.idempotency_key),
            user_id: Set(new.user_id),
            created_at: Set(Utc::now()),
        };

        // A concurrent writer with the same key surfaces as a unique
        // violation; the whole transition is re-run and finds its row.
        let movement = row
            .insert(db)
            .await
            .map_err(|e| ServiceError::db_error(e, conflict_id))?;

        LEDGER_MOVEMENTS
            .with_label_values(&[&movement.r#type.to_string()])
            .inc();

        Ok(RecordedMovement {
            movement,
            already_applied: false,
        })
    }

    /// Records a movement and, when it is new, projects its physical delta
    /// onto the on-hand counter.
    pub async fn post<C>(db: &C, new: NewMovement) -> Result<RecordedMovement, ServiceError>
    where
        C: ConnectionTrait,
    {
        let target = new.target;
        let kind = new.kind();
        let recorded = Self::record(db, new).await?;
        if !recorded.already_applied {
            StockProjector::apply_delta(db, target, kind.stock_delta()).await?;
        }
        Ok(recorded)
    }

    /// Writes the compensating VOID row for `original` and reverses its
    /// effect on stock. Item and line counters are left untouched.
    pub async fn void<C>(
        db: &C,
        original: &stock_movement::Model,
        idempotency_key: Option<String>,
        note: Option<String>,
        user_id: Uuid,
    ) -> Result<RecordedMovement, ServiceError>
    where
        C: ConnectionTrait,
    {
        if let Some(key) = idempotency_key.as_deref() {
            if let Some(existing) = Self::find_by_key(db, key).await? {
                if existing.voided_movement_id == Some(original.id) {
                    IDEMPOTENT_REPLAYS.inc();
                    return Ok(RecordedMovement {
                        movement: existing,
                        already_applied: true,
                    });
                }
            }
        }

        if original.r#type == MovementType::Void {
            return Err(ServiceError::VoidNotAllowed(
                original.id,
                "a VOID movement cannot itself be voided".to_string(),
            ));
        }
        if original.r#type.is_reservation_intent() {
            return Err(ServiceError::VoidNotAllowed(
                original.id,
                "reservation intents do not move stock".to_string(),
            ));
        }

        let already_voided = stock_movement::Entity::find()
            .filter(stock_movement::Column::VoidedMovementId.eq(original.id))
            .one(db)
            .await?;
        if already_voided.is_some() {
            return Err(ServiceError::VoidNotAllowed(
                original.id,
                "movement has already been voided".to_string(),
            ));
        }

        let target = StockTarget::from_columns(original.product_id, original.variant_id)
            .ok_or_else(|| {
                ServiceError::InternalError(format!(
                    "movement {} does not name exactly one stock target",
                    original.id
                ))
            })?;

        let mut new = NewMovement::new(
            target,
            MovementType::Void,
            original.source,
            -original.qty_delta,
            user_id,
        )
        .with_reference(original.reference.clone())
        .with_note(note)
        .with_idempotency_key(idempotency_key);
        new.voided_movement_id = Some(original.id);

        let recorded = Self::post(db, new).await?;
        info!(
            movement_id = %original.id,
            void_id = %recorded.movement.id,
            "Voided stock movement"
        );
        Ok(recorded)
    }

    pub async fn find_by_key<C>(db: &C, key: &str) -> Result<Option<stock_movement::Model>, ServiceError>
    where
        C: ConnectionTrait,
    {
        Ok(stock_movement::Entity::find()
            .filter(stock_movement::Column::IdempotencyKey.eq(key))
            .one(db)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use test_case::test_case;

    fn movement(movement_type: MovementType, delta: i32) -> NewMovement {
        NewMovement::new(
            StockTarget::Product(Uuid::new_v4()),
            movement_type,
            MovementSource::Manual,
            delta,
            Uuid::new_v4(),
        )
    }

    #[test_case(MovementType::Reserve, 0, true)]
    #[test_case(MovementType::Reserve, 2, false)]
    #[test_case(MovementType::In, 5, true)]
    #[test_case(MovementType::In, -5, false)]
    #[test_case(MovementType::ReturnIn, 0, false)]
    #[test_case(MovementType::Out, -1, true)]
    #[test_case(MovementType::Adjust, -3, true)]
    #[test_case(MovementType::Adjust, 0, false)]
    #[test_case(MovementType::Void, 0, false)]
    #[test_case(MovementType::In, MAX_MOVEMENT_QTY, true ; "in at the limit")]
    #[test_case(MovementType::In, MAX_MOVEMENT_QTY + 1, false ; "in above the limit")]
    #[test_case(MovementType::Adjust, i32::MIN, false ; "adjust at i32 min")]
    fn delta_sign_is_validated(movement_type: MovementType, delta: i32, valid: bool) {
        let result = movement(movement_type, delta).validate();
        if valid {
            assert!(result.is_ok());
        } else {
            assert_matches!(result, Err(ServiceError::InvalidQuantity(_)));
        }
    }

    #[test]
    fn intents_never_carry_stock() {
        let intent = NewMovement::reservation_intent(
            StockTarget::Variant(Uuid::new_v4()),
            MovementType::Release,
            Uuid::new_v4(),
            Uuid::new_v4(),
        );
        assert_eq!(intent.kind(), MovementKind::ReservationIntent);
        assert_eq!(intent.kind().stock_delta(), 0);
        assert_eq!(intent.source, MovementSource::Order);
        assert_eq!(movement(MovementType::In, 4).kind(), MovementKind::Physical(4));
    }
}
