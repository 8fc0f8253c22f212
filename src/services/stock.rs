use crate::{
    entities::{product, product_variant, stock_movement},
    errors::ServiceError,
};
use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QuerySelect,
};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

/// The stock-bearing entity a movement applies to. Exactly one of product or
/// variant, never both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "camelCase")]
pub enum StockTarget {
    Product(Uuid),
    Variant(Uuid),
}

impl StockTarget {
    /// A variant, when named, carries the stock; otherwise the product does.
    pub fn resolve(product_id: Uuid, variant_id: Option<Uuid>) -> Self {
        match variant_id {
            Some(variant_id) => StockTarget::Variant(variant_id),
            None => StockTarget::Product(product_id),
        }
    }

    /// Rebuilds the target from stored movement columns.
    pub fn from_columns(product_id: Option<Uuid>, variant_id: Option<Uuid>) -> Option<Self> {
        match (product_id, variant_id) {
            (None, Some(variant_id)) => Some(StockTarget::Variant(variant_id)),
            (Some(product_id), None) => Some(StockTarget::Product(product_id)),
            _ => None,
        }
    }

    /// `(product_id, variant_id)` column values for a movement row.
    pub fn columns(self) -> (Option<Uuid>, Option<Uuid>) {
        match self {
            StockTarget::Product(id) => (Some(id), None),
            StockTarget::Variant(id) => (None, Some(id)),
        }
    }

    pub fn id(self) -> Uuid {
        match self {
            StockTarget::Product(id) | StockTarget::Variant(id) => id,
        }
    }
}

/// Keeps the denormalized on-hand counters in step with the ledger.
pub struct StockProjector;

impl StockProjector {
    /// `stock = stock + delta` on the target, in the caller's transaction.
    /// Zero deltas are no-ops.
    pub async fn apply_delta<C>(db: &C, target: StockTarget, delta: i32) -> Result<(), ServiceError>
    where
        C: ConnectionTrait,
    {
        if delta == 0 {
            return Ok(());
        }

        let rows_affected = match target {
            StockTarget::Product(id) => {
                product::Entity::update_many()
                    .col_expr(
                        product::Column::Stock,
                        Expr::col(product::Column::Stock).add(delta),
                    )
                    .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
                    .filter(product::Column::Id.eq(id))
                    .filter(if delta > 0 {
                        product::Column::Stock.lte(i32::MAX - delta)
                    } else {
                        product::Column::Stock.gte(i32::MIN - delta)
                    })
                    .exec(db)
                    .await?
                    .rows_affected
            }
            StockTarget::Variant(id) => {
                product_variant::Entity::update_many()
                    .col_expr(
                        product_variant::Column::Stock,
                        Expr::col(product_variant::Column::Stock).add(delta),
                    )
                    .col_expr(product_variant::Column::UpdatedAt, Expr::value(Utc::now()))
                    .filter(product_variant::Column::Id.eq(id))
                    .filter(if delta > 0 {
                        product_variant::Column::Stock.lte(i32::MAX - delta)
                    } else {
                        product_variant::Column::Stock.gte(i32::MIN - delta)
                    })
                    .exec(db)
                    .await?
                    .rows_affected
            }
        };

        if rows_affected == 0 {
            // Either the target is gone or the counter has no headroom left.
            let stock = Self::current_stock(db, target).await?;
            return Err(ServiceError::InvalidQuantity(format!(
                "applying {} to stock {} of {:?} would overflow the counter",
                delta, stock, target
            )));
        }

        debug!(?target, delta, "Applied stock delta");
        Ok(())
    }

    /// Current on-hand counter of the target.
    pub async fn current_stock<C>(db: &C, target: StockTarget) -> Result<i64, ServiceError>
    where
        C: ConnectionTrait,
    {
        let stock = match target {
            StockTarget::Product(id) => product::Entity::find_by_id(id)
                .one(db)
                .await?
                .map(|p| p.stock),
            StockTarget::Variant(id) => product_variant::Entity::find_by_id(id)
                .one(db)
                .await?
                .map(|v| v.stock),
        };

        stock
            .map(i64::from)
            .ok_or_else(|| ServiceError::NotFound(format!("Stock target {:?} not found", target)))
    }

    /// Σ qty_delta of every ledger row for the target.
    pub async fn ledger_sum<C>(db: &C, target: StockTarget) -> Result<i64, ServiceError>
    where
        C: ConnectionTrait,
    {
        let query = stock_movement::Entity::find()
            .select_only()
            .column_as(Expr::col(stock_movement::Column::QtyDelta).sum(), "total");

        let query = match target {
            StockTarget::Product(id) => query.filter(stock_movement::Column::ProductId.eq(id)),
            StockTarget::Variant(id) => query.filter(stock_movement::Column::VariantId.eq(id)),
        };

        let total = query
            .into_tuple::<Option<i64>>()
            .one(db)
            .await?
            .flatten()
            .unwrap_or(0);

        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_prefers_variant() {
        let product_id = Uuid::new_v4();
        let variant_id = Uuid::new_v4();
        assert_eq!(
            StockTarget::resolve(product_id, Some(variant_id)),
            StockTarget::Variant(variant_id)
        );
        assert_eq!(
            StockTarget::resolve(product_id, None),
            StockTarget::Product(product_id)
        );
    }

    #[test]
    fn columns_round_trip_and_reject_ambiguous_rows() {
        let id = Uuid::new_v4();
        let (product_id, variant_id) = StockTarget::Variant(id).columns();
        assert_eq!(product_id, None);
        assert_eq!(
            StockTarget::from_columns(product_id, variant_id),
            Some(StockTarget::Variant(id))
        );
        assert_eq!(StockTarget::from_columns(Some(id), Some(id)), None);
        assert_eq!(StockTarget::from_columns(None, None), None);
    }
}
