use crate::{
    entities::{
        inventory_receipt, inventory_receipt_item,
        purchase_order::{self, Entity as PurchaseOrder},
        purchase_order_line::{self, Entity as PurchaseOrderLine},
    },
    errors::ServiceError,
};
use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder,
};
use tracing::debug;
use uuid::Uuid;

pub struct PurchaseOrderRepository;

impl PurchaseOrderRepository {
    /// Missing and foreign purchase orders are indistinguishable to the caller.
    pub async fn find_owned<C>(
        db: &C,
        user_id: Uuid,
        purchase_order_id: Uuid,
    ) -> Result<purchase_order::Model, ServiceError>
    where
        C: ConnectionTrait,
    {
        PurchaseOrder::find_by_id(purchase_order_id)
            .filter(purchase_order::Column::UserId.eq(user_id))
            .one(db)
            .await?
            .ok_or(ServiceError::PurchaseOrderNotFound(purchase_order_id))
    }

    pub async fn lines<C>(
        db: &C,
        purchase_order_id: Uuid,
    ) -> Result<Vec<purchase_order_line::Model>, ServiceError>
    where
        C: ConnectionTrait,
    {
        Ok(PurchaseOrderLine::find()
            .filter(purchase_order_line::Column::PurchaseOrderId.eq(purchase_order_id))
            .order_by_asc(purchase_order_line::Column::Position)
            .order_by_asc(purchase_order_line::Column::Id)
            .all(db)
            .await?)
    }

    pub async fn bump_version<C>(
        db: &C,
        purchase_order_id: Uuid,
        expected_version: i32,
    ) -> Result<i32, ServiceError>
    where
        C: ConnectionTrait,
    {
        let result = PurchaseOrder::update_many()
            .col_expr(
                purchase_order::Column::Version,
                Expr::col(purchase_order::Column::Version).add(1),
            )
            .col_expr(purchase_order::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(purchase_order::Column::Id.eq(purchase_order_id))
            .filter(purchase_order::Column::Version.eq(expected_version))
            .exec(db)
            .await?;

        if result.rows_affected != 1 {
            debug!(%purchase_order_id, expected_version, "Lost optimistic lock on purchase order");
            return Err(ServiceError::ConcurrentModification(purchase_order_id));
        }
        Ok(expected_version + 1)
    }

    /// A receipt together with its items.
    pub async fn receipt_with_items<C>(
        db: &C,
        receipt_id: Uuid,
    ) -> Result<(inventory_receipt::Model, Vec<inventory_receipt_item::Model>), ServiceError>
    where
        C: ConnectionTrait,
    {
        let receipt = inventory_receipt::Entity::find_by_id(receipt_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Receipt {} not found", receipt_id)))?;
        let items = inventory_receipt_item::Entity::find()
            .filter(inventory_receipt_item::Column::ReceiptId.eq(receipt_id))
            .order_by_asc(inventory_receipt_item::Column::CreatedAt)
            .order_by_asc(inventory_receipt_item::Column::Id)
            .all(db)
            .await?;
        Ok((receipt, items))
    }
}
