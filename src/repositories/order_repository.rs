use crate::{
    entities::{
        order::{self, Entity as Order},
        order_item::{self, Entity as OrderItem},
    },
    errors::ServiceError,
};
use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder,
};
use tracing::debug;
use uuid::Uuid;

pub struct OrderRepository;

impl OrderRepository {
    /// Loads an order owned by `user_id`. Orders of other accounts are
    /// reported as missing.
    pub async fn find_owned<C>(db: &C, user_id: Uuid, order_id: Uuid) -> Result<order::Model, ServiceError>
    where
        C: ConnectionTrait,
    {
        Order::find_by_id(order_id)
            .filter(order::Column::UserId.eq(user_id))
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
    }

    /// Items of an order in display order.
    pub async fn items<C>(db: &C, order_id: Uuid) -> Result<Vec<order_item::Model>, ServiceError>
    where
        C: ConnectionTrait,
    {
        Ok(OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .order_by_asc(order_item::Column::Position)
            .order_by_asc(order_item::Column::Id)
            .all(db)
            .await?)
    }

    /// Compare-and-swap on the optimistic lock. Returns the new version, or
    /// `ConcurrentModification` when another writer got there first.
    pub async fn bump_version<C>(db: &C, order_id: Uuid, expected_version: i32) -> Result<i32, ServiceError>
    where
        C: ConnectionTrait,
    {
        let result = Order::update_many()
            .col_expr(
                order::Column::Version,
                Expr::col(order::Column::Version).add(1),
            )
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::Version.eq(expected_version))
            .exec(db)
            .await?;

        if result.rows_affected != 1 {
            debug!(%order_id, expected_version, "Lost optimistic lock on order");
            return Err(ServiceError::ConcurrentModification(order_id));
        }
        Ok(expected_version + 1)
    }
}
