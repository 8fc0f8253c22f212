use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::sea_orm_active_enums::{MovementSource, MovementType};

/// Append-only ledger row. Rows are never updated or deleted; a VOID is a
/// new compensating row pointing at the one it reverses.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_movements")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub product_id: Option<Uuid>,
    pub variant_id: Option<Uuid>,
    pub r#type: MovementType,
    pub source: MovementSource,
    pub qty_delta: i32,
    pub occurred_at: DateTime<Utc>,
    pub order_item_id: Option<Uuid>,
    pub receipt_item_id: Option<Uuid>,
    pub voided_movement_id: Option<Uuid>,
    pub reference: Option<String>,
    pub note: Option<String>,
    #[sea_orm(unique)]
    pub idempotency_key: Option<String>,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
