//! Read side of the ledger: the paginated movement feed and the
//! ledger-vs-counter consistency check.

use crate::{
    commands::stock::{AdjustStockCommand, VoidMovementCommand},
    db::DbPool,
    entities::{
        product, product_variant,
        sea_orm_active_enums::{MovementSource, MovementType},
        stock_movement,
    },
    errors::ServiceError,
    events::EventSender,
    middleware_helpers::RetryConfig,
    repositories::ProductRepository,
    services::{
        execute_with_retry,
        ledger::RecordedMovement,
        stock::{StockProjector, StockTarget},
    },
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use sea_orm::{
    ColumnTrait, Condition, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Position in the feed: the sort key of the last row of a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovementCursor {
    pub occurred_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub id: Uuid,
}

impl MovementCursor {
    pub fn after(movement: &stock_movement::Model) -> Self {
        Self {
            occurred_at: movement.occurred_at,
            created_at: movement.created_at,
            id: movement.id,
        }
    }

    /// Opaque URL-safe token handed to clients.
    pub fn encode(&self) -> Result<String, ServiceError> {
        let json = serde_json::to_vec(self)
            .map_err(|e| ServiceError::InternalError(format!("cursor encoding failed: {}", e)))?;
        Ok(URL_SAFE_NO_PAD.encode(json))
    }

    pub fn decode(raw: &str) -> Result<Self, ServiceError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(raw.trim())
            .map_err(|_| ServiceError::InvalidCursor)?;
        serde_json::from_slice(&bytes).map_err(|_| ServiceError::InvalidCursor)
    }
}

/// Feed filters. `from` and `to` bound `occurred_at` inclusively.
#[derive(Debug, Clone, Default)]
pub struct MovementFilter {
    pub product_id: Option<Uuid>,
    pub variant_id: Option<Uuid>,
    pub movement_type: Option<MovementType>,
    pub source: Option<MovementSource>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct MovementPage {
    pub data: Vec<stock_movement::Model>,
    pub next_cursor: Option<String>,
}

/// On-hand counter of one stock-bearing entity next to the sum of its ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerCheck {
    pub target: StockTarget,
    pub stock: i64,
    pub ledger_sum: i64,
    pub consistent: bool,
}

impl LedgerCheck {
    async fn run<C>(db: &C, target: StockTarget) -> Result<Self, ServiceError>
    where
        C: ConnectionTrait,
    {
        let stock = StockProjector::current_stock(db, target).await?;
        let ledger_sum = StockProjector::ledger_sum(db, target).await?;
        Ok(Self {
            target,
            stock,
            ledger_sum,
            consistent: stock == ledger_sum,
        })
    }
}

/// Checks every product and variant in the database.
pub async fn audit_ledger<C>(db: &C) -> Result<Vec<LedgerCheck>, ServiceError>
where
    C: ConnectionTrait,
{
    let mut targets: Vec<StockTarget> = product::Entity::find()
        .order_by_asc(product::Column::Id)
        .all(db)
        .await?
        .into_iter()
        .map(|p| StockTarget::Product(p.id))
        .collect();
    targets.extend(
        product_variant::Entity::find()
            .order_by_asc(product_variant::Column::Id)
            .all(db)
            .await?
            .into_iter()
            .map(|v| StockTarget::Variant(v.id)),
    );

    let mut checks = Vec::with_capacity(targets.len());
    for target in targets {
        let check = LedgerCheck::run(db, target).await?;
        if !check.consistent {
            warn!(?target, stock = check.stock, ledger_sum = check.ledger_sum, "Ledger divergence");
        }
        checks.push(check);
    }
    Ok(checks)
}

#[derive(Clone)]
pub struct StockMovementService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    retry: RetryConfig,
}

impl StockMovementService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>, retry: RetryConfig) -> Self {
        Self {
            db_pool,
            event_sender,
            retry,
        }
    }

    /// One page of the caller's movements, newest first.
    #[instrument(skip(self, filter, cursor))]
    pub async fn list(
        &self,
        user_id: Uuid,
        filter: MovementFilter,
        cursor: Option<&str>,
        limit: u64,
    ) -> Result<MovementPage, ServiceError> {
        let cursor = cursor
            .filter(|raw| !raw.trim().is_empty())
            .map(MovementCursor::decode)
            .transpose()?;

        let mut query = stock_movement::Entity::find()
            .filter(stock_movement::Column::UserId.eq(user_id));
        if let Some(product_id) = filter.product_id {
            query = query.filter(stock_movement::Column::ProductId.eq(product_id));
        }
        if let Some(variant_id) = filter.variant_id {
            query = query.filter(stock_movement::Column::VariantId.eq(variant_id));
        }
        if let Some(movement_type) = filter.movement_type {
            query = query.filter(stock_movement::Column::Type.eq(movement_type));
        }
        if let Some(source) = filter.source {
            query = query.filter(stock_movement::Column::Source.eq(source));
        }
        if let Some(from) = filter.from {
            query = query.filter(stock_movement::Column::OccurredAt.gte(from));
        }
        if let Some(to) = filter.to {
            query = query.filter(stock_movement::Column::OccurredAt.lte(to));
        }
        if let Some(cursor) = &cursor {
            query = query.filter(
                Condition::any()
                    .add(stock_movement::Column::OccurredAt.lt(cursor.occurred_at))
                    .add(
                        Condition::all()
                            .add(stock_movement::Column::OccurredAt.eq(cursor.occurred_at))
                            .add(stock_movement::Column::CreatedAt.lt(cursor.created_at)),
                    )
                    .add(
                        Condition::all()
                            .add(stock_movement::Column::OccurredAt.eq(cursor.occurred_at))
                            .add(stock_movement::Column::CreatedAt.eq(cursor.created_at))
                            .add(stock_movement::Column::Id.lt(cursor.id)),
                    ),
            );
        }

        let limit = limit.max(1);
        let mut data = query
            .order_by_desc(stock_movement::Column::OccurredAt)
            .order_by_desc(stock_movement::Column::CreatedAt)
            .order_by_desc(stock_movement::Column::Id)
            .limit(limit + 1)
            .all(&*self.db_pool)
            .await?;

        let next_cursor = if data.len() as u64 > limit {
            data.truncate(limit as usize);
            data.last().map(|m| MovementCursor::after(m).encode()).transpose()?
        } else {
            None
        };

        Ok(MovementPage { data, next_cursor })
    }

    #[instrument(skip(self, command), fields(product_id = %command.product_id))]
    pub async fn adjust(&self, command: AdjustStockCommand) -> Result<RecordedMovement, ServiceError> {
        execute_with_retry(&self.retry, &self.db_pool, &self.event_sender, &command).await
    }

    #[instrument(skip(self, command), fields(movement_id = %command.movement_id))]
    pub async fn void(&self, command: VoidMovementCommand) -> Result<RecordedMovement, ServiceError> {
        execute_with_retry(&self.retry, &self.db_pool, &self.event_sender, &command).await
    }

    /// Replays the ledger of one product or variant owned by the caller.
    #[instrument(skip(self))]
    pub async fn verify(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        variant_id: Option<Uuid>,
    ) -> Result<LedgerCheck, ServiceError> {
        let db = &*self.db_pool;
        let target = ProductRepository::owned_target(db, user_id, product_id, variant_id).await?;
        let check = LedgerCheck::run(db, target).await?;
        info!(?target, consistent = check.consistent, "Ledger verified");
        Ok(check)
    }

    pub async fn audit_all(&self) -> Result<Vec<LedgerCheck>, ServiceError> {
        audit_ledger(&*self.db_pool).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::TimeZone;
    use test_case::test_case;

    #[test]
    fn cursor_survives_encoding() {
        let cursor = MovementCursor {
            occurred_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            created_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 1).unwrap(),
            id: Uuid::new_v4(),
        };
        let token = cursor.encode().unwrap();
        assert!(!token.contains('='));
        assert_eq!(MovementCursor::decode(&token).unwrap(), cursor);
    }

    #[test_case("not base64!" ; "bad alphabet")]
    #[test_case("e30" ; "empty json object")]
    #[test_case("bm90IGpzb24" ; "not json")]
    fn malformed_cursors_are_rejected(raw: &str) {
        assert_matches!(MovementCursor::decode(raw), Err(ServiceError::InvalidCursor));
    }
}
