use async_trait::async_trait;
use chrono::Utc;
use lazy_static::lazy_static;
use prometheus::IntCounter;
use sea_orm::{ActiveModelTrait, EntityTrait, IntoActiveModel, Set};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::ReceiptOutcome;
use crate::{
    commands::Command,
    db::{self, DbPool},
    entities::{
        inventory_receipt, inventory_receipt_item, purchase_order, purchase_order_line,
        sea_orm_active_enums::{MovementSource, MovementType, PurchaseOrderStatus},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    metrics::{record_transition, register_int_counter},
    repositories::PurchaseOrderRepository,
    services::{
        fulfillment::{derive_purchase_order_status, LineCounters},
        idempotency::{scoped_key, IdempotencyKey, Operation},
        ledger::{LedgerWriter, NewMovement, MAX_MOVEMENT_QTY},
        stock::StockTarget,
    },
};

lazy_static! {
    static ref PURCHASE_ORDER_RECEIPTS: IntCounter = register_int_counter(
        "purchase_order_receipts_total",
        "Total number of inventory receipts written"
    );
    static ref PURCHASE_ORDER_RECEIPT_FAILURES: IntCounter = register_int_counter(
        "purchase_order_receipt_failures_total",
        "Total number of rejected purchase order receipts"
    );
    static ref UNITS_RECEIVED: IntCounter = register_int_counter(
        "purchase_order_units_received_total",
        "Total number of units received against purchase orders"
    );
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiveLine {
    pub po_line_id: Uuid,
    pub qty: i32,
}

/// Books incoming stock against the lines of an approved purchase order.
///
/// Every call writes one `InventoryReceipt`, one receipt item and one `IN`
/// movement per requested line. Receiving more than was ordered is accepted;
/// the purchase order simply stays RECEIVED.
#[derive(Debug, Clone)]
pub struct ReceivePurchaseOrderCommand {
    pub purchase_order_id: Uuid,
    pub user_id: Uuid,
    pub lines: Vec<ReceiveLine>,
    pub note: Option<String>,
    pub idempotency_key: Option<IdempotencyKey>,
}

impl ReceivePurchaseOrderCommand {
    /// Validates the requested lines and merges repeats of the same PO line,
    /// keeping first-seen order.
    pub fn merged_lines(lines: &[ReceiveLine]) -> Result<Vec<ReceiveLine>, ServiceError> {
        if lines.is_empty() {
            return Err(ServiceError::ReceiveLinesRequired);
        }

        let mut merged: Vec<ReceiveLine> = Vec::with_capacity(lines.len());
        for line in lines {
            if line.qty <= 0 {
                return Err(ServiceError::InvalidQuantity(format!(
                    "qty for line {} must be positive",
                    line.po_line_id
                )));
            }
            if line.qty > MAX_MOVEMENT_QTY {
                return Err(ServiceError::InvalidQuantity(format!(
                    "qty for line {} exceeds the per-movement limit of {}",
                    line.po_line_id, MAX_MOVEMENT_QTY
                )));
            }
            match merged.iter_mut().find(|m| m.po_line_id == line.po_line_id) {
                Some(existing) => {
                    existing.qty = existing
                        .qty
                        .checked_add(line.qty)
                        .filter(|qty| *qty <= MAX_MOVEMENT_QTY)
                        .ok_or_else(|| {
                            ServiceError::InvalidQuantity(format!(
                                "qty for line {} exceeds the per-movement limit of {}",
                                line.po_line_id, MAX_MOVEMENT_QTY
                            ))
                        })?;
                }
                None => merged.push(*line),
            }
        }
        Ok(merged)
    }
}

#[async_trait]
impl Command for ReceivePurchaseOrderCommand {
    type Result = ReceiptOutcome;

    #[instrument(skip(self, db_pool, event_sender), fields(purchase_order_id = %self.purchase_order_id, idempotency_key = ?self.idempotency_key))]
    async fn execute(
        &self,
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
    ) -> Result<Self::Result, ServiceError> {
        let outcome = match self.receive_in_db(&db_pool).await {
            Ok(outcome) => outcome,
            Err(e) => {
                PURCHASE_ORDER_RECEIPT_FAILURES.inc();
                record_transition("purchase_order.receive", "failed");
                warn!(purchase_order_id = %self.purchase_order_id, error = %e, "Purchase order receipt rejected");
                return Err(e);
            }
        };

        if outcome.applied {
            let units: i64 = outcome.items.iter().map(|item| i64::from(item.qty)).sum();
            info!(
                purchase_order_id = %self.purchase_order_id,
                receipt_id = %outcome.receipt.id,
                units,
                status = %outcome.purchase_order.status,
                "Purchase order received"
            );
            event_sender
                .publish(Event::PurchaseOrderReceived {
                    purchase_order_id: self.purchase_order_id,
                    receipt_id: outcome.receipt.id,
                    units,
                })
                .await;
            PURCHASE_ORDER_RECEIPTS.inc();
            UNITS_RECEIVED.inc_by(units.max(0) as u64);
            record_transition("purchase_order.receive", "applied");
        } else {
            record_transition("purchase_order.receive", "noop");
        }

        Ok(outcome)
    }
}

impl ReceivePurchaseOrderCommand {
    async fn receive_in_db(&self, db: &DbPool) -> Result<ReceiptOutcome, ServiceError> {
        let requested = Self::merged_lines(&self.lines)?;

        let purchase_order_id = self.purchase_order_id;
        let user_id = self.user_id;
        let key = self.idempotency_key.clone();
        let note = self.note.clone();

        db::transaction(db, "purchase_order.receive", move |txn| {
            Box::pin(async move {
                let purchase_order =
                    PurchaseOrderRepository::find_owned(txn, user_id, purchase_order_id).await?;
                if purchase_order.status == PurchaseOrderStatus::Draft {
                    return Err(ServiceError::InvalidTransition {
                        action: "receive",
                        from: purchase_order.status.to_string(),
                    });
                }

                let lines = PurchaseOrderRepository::lines(txn, purchase_order_id).await?;
                let mut pending = Vec::with_capacity(requested.len());
                let mut replayed = None;
                for request in &requested {
                    let idx = lines
                        .iter()
                        .position(|line| line.id == request.po_line_id)
                        .ok_or(ServiceError::PurchaseOrderLineNotFound(request.po_line_id))?;

                    let movement_key = scoped_key(key.as_ref(), Operation::Receive, request.po_line_id);
                    let existing = match movement_key.as_deref() {
                        Some(k) => LedgerWriter::find_by_key(txn, k).await?,
                        None => None,
                    };
                    match existing {
                        Some(movement) => replayed = replayed.or(movement.receipt_item_id),
                        None => pending.push((idx, request.qty, movement_key)),
                    }
                }

                // Every line was booked by an earlier call with the same key.
                if pending.is_empty() {
                    let receipt_item_id = replayed.ok_or_else(|| {
                        ServiceError::InternalError(
                            "replayed receive movement has no receipt item".to_string(),
                        )
                    })?;
                    let receipt_item = inventory_receipt_item::Entity::find_by_id(receipt_item_id)
                        .one(txn)
                        .await?
                        .ok_or_else(|| {
                            ServiceError::NotFound(format!(
                                "Receipt item {} not found",
                                receipt_item_id
                            ))
                        })?;
                    let (receipt, items) =
                        PurchaseOrderRepository::receipt_with_items(txn, receipt_item.receipt_id)
                            .await?;
                    info!(%purchase_order_id, receipt_id = %receipt.id, "Receipt already recorded");
                    return Ok(ReceiptOutcome {
                        receipt,
                        items,
                        purchase_order,
                        lines,
                        applied: false,
                    });
                }

                let version = PurchaseOrderRepository::bump_version(
                    txn,
                    purchase_order_id,
                    purchase_order.version,
                )
                .await?;

                let now = Utc::now();
                let receipt = inventory_receipt::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    purchase_order_id: Set(purchase_order_id),
                    user_id: Set(user_id),
                    reference: Set(Some(purchase_order.po_number.clone())),
                    note: Set(note.clone()),
                    received_at: Set(now),
                    created_at: Set(now),
                }
                .insert(txn)
                .await?;

                let mut updated_lines = lines;
                let mut receipt_items = Vec::with_capacity(pending.len());
                for (idx, qty, movement_key) in pending {
                    let line = updated_lines[idx].clone();
                    let received = line.qty_received.checked_add(qty).ok_or_else(|| {
                        ServiceError::InvalidQuantity(format!(
                            "receiving {} more on line {} overflows its received count",
                            qty, line.id
                        ))
                    })?;
                    let receipt_item = inventory_receipt_item::ActiveModel {
                        id: Set(Uuid::new_v4()),
                        receipt_id: Set(receipt.id),
                        po_line_id: Set(line.id),
                        product_id: Set(line.product_id),
                        variant_id: Set(line.variant_id),
                        qty: Set(qty),
                        unit_cost_cents: Set(line.unit_cost_cents),
                        created_at: Set(now),
                    }
                    .insert(txn)
                    .await?;

                    let movement = NewMovement::new(
                        StockTarget::resolve(line.product_id, line.variant_id),
                        MovementType::In,
                        MovementSource::Receipt,
                        qty,
                        user_id,
                    )
                    .with_receipt_item(receipt_item.id)
                    .with_reference(Some(purchase_order.po_number.clone()))
                    .with_note(note.clone())
                    .with_idempotency_key(movement_key)
                    .occurred_at(now);
                    LedgerWriter::post(txn, movement).await?;

                    let mut active: purchase_order_line::ActiveModel = line.into_active_model();
                    active.qty_received = Set(received);
                    updated_lines[idx] = active.update(txn).await?;
                    receipt_items.push(receipt_item);
                }

                let counters: Vec<LineCounters> =
                    updated_lines.iter().map(LineCounters::from).collect();
                let status = derive_purchase_order_status(&counters);
                let first_full_receipt =
                    status == PurchaseOrderStatus::Received && purchase_order.received_at.is_none();

                let mut active: purchase_order::ActiveModel = purchase_order.into_active_model();
                active.status = Set(status);
                if first_full_receipt {
                    active.received_at = Set(Some(now));
                }
                active.version = Set(version);
                let purchase_order = active.update(txn).await?;

                Ok(ReceiptOutcome {
                    receipt,
                    items: receipt_items,
                    purchase_order,
                    lines: updated_lines,
                    applied: true,
                })
            })
        })
        .await
    }
}
