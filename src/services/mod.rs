//! Business services.
//!
//! The pure building blocks (`fulfillment`, `idempotency`, `ledger`, `stock`)
//! are shared by the commands; the `*Service` types wrap the commands with
//! concurrency retries for the HTTP layer.

use crate::{
    commands::Command,
    db::DbPool,
    errors::ServiceError,
    events::EventSender,
    middleware_helpers::{with_retry, ConcurrencyRetryPolicy, RetryConfig},
};
use std::sync::Arc;

// Ledger core
pub mod fulfillment;
pub mod idempotency;
pub mod ledger;
pub mod stock;

// Entry points
pub mod orders;
pub mod purchase_orders;
pub mod stock_movements;

/// Runs `command`, re-running the whole transition when it lost a
/// concurrency race.
pub(crate) async fn execute_with_retry<C>(
    retry: &RetryConfig,
    db_pool: &Arc<DbPool>,
    event_sender: &Arc<EventSender>,
    command: &C,
) -> Result<C::Result, ServiceError>
where
    C: Command,
{
    with_retry(retry, ConcurrencyRetryPolicy, || {
        command.execute(db_pool.clone(), event_sender.clone())
    })
    .await
}
