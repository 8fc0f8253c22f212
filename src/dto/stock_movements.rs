use crate::{
    entities::{
        sea_orm_active_enums::{MovementSource, MovementType},
        stock_movement,
    },
    services::{
        stock::StockTarget,
        stock_movements::{LedgerCheck, MovementFilter},
    },
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MovementDto {
    pub id: Uuid,
    pub product_id: Option<Uuid>,
    pub variant_id: Option<Uuid>,
    #[serde(rename = "type")]
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
    pub created_at: DateTime<Utc>,
}

impl From<stock_movement::Model> for MovementDto {
    fn from(m: stock_movement::Model) -> Self {
        Self {
            id: m.id,
            product_id: m.product_id,
            variant_id: m.variant_id,
            movement_type: m.r#type,
            source: m.source,
            qty_delta: m.qty_delta,
            occurred_at: m.occurred_at,
            order_item_id: m.order_item_id,
            receipt_item_id: m.receipt_item_id,
            voided_movement_id: m.voided_movement_id,
            reference: m.reference,
            note: m.note,
            idempotency_key: m.idempotency_key,
            created_at: m.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MovementPageDto {
    pub data: Vec<MovementDto>,
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct MovementQuery {
    pub product_id: Option<Uuid>,
    pub variant_id: Option<Uuid>,
    #[serde(rename = "type")]
    #[param(value_type = Option<String>)]
    pub movement_type: Option<MovementType>,
    #[param(value_type = Option<String>)]
    pub source: Option<MovementSource>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub cursor: Option<String>,
    pub limit: Option<u64>,
}

impl MovementQuery {
    pub fn filter(&self) -> MovementFilter {
        MovementFilter {
            product_id: self.product_id,
            variant_id: self.variant_id,
            movement_type: self.movement_type,
            source: self.source,
            from: self.from,
            to: self.to,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdjustStockRequest {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub qty_delta: i32,
    #[validate(length(max = 2000))]
    pub note: Option<String>,
    #[validate(length(max = 255))]
    pub reference: Option<String>,
    #[validate(length(max = 512))]
    pub idempotency_key: Option<String>,
    pub occurred_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VoidMovementRequest {
    #[validate(length(max = 2000))]
    pub note: Option<String>,
    #[validate(length(max = 512))]
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct VerifyQuery {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LedgerCheckDto {
    pub product_id: Option<Uuid>,
    pub variant_id: Option<Uuid>,
    pub stock: i64,
    pub ledger_sum: i64,
    pub consistent: bool,
}

impl From<LedgerCheck> for LedgerCheckDto {
    fn from(check: LedgerCheck) -> Self {
        let (product_id, variant_id) = StockTarget::columns(check.target);
        Self {
            product_id,
            variant_id,
            stock: check.stock,
            ledger_sum: check.ledger_sum,
            consistent: check.consistent,
        }
    }
}
